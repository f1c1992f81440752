//! Primitive assembly: deduplicated vertex buffers to accessors

use tracing::debug;

use crate::buffer::{Accessor, AccessorIndex, Target};
use crate::codec::{ComponentType, ElementCodec, ElementType};
use crate::packer::{MAX_VERTEX_STRIDE, align_up};
use crate::renderables::VertexBuffer;
use crate::semantic::{AttributeSlot, Semantic, ShapeIndex};

/// Largest vertex count addressable by `u16` indices (65535 is reserved as
/// the primitive restart value)
const MAX_U16_VERTICES: usize = 65535;

#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveOptions {
    pub force_32bit_indices: bool,
    /// Interleave base-shape attributes into one strided vertex view
    pub interleave: bool,
    pub assign_names: bool,
}

/// Accessors of one glTF primitive
#[derive(Debug, Clone)]
pub struct PrimitiveAccessors {
    pub shading_group: u32,
    /// Base-shape attributes
    pub attributes: Vec<(AttributeSlot, AccessorIndex)>,
    /// One entry per delta shape, in delta order
    pub targets: Vec<Vec<(Semantic, AccessorIndex)>>,
    pub indices: AccessorIndex,
}

/// Compute bounding box of flat `dimension`-wide elements
pub fn compute_bounds(components: &[f32], dimension: usize) -> (Vec<f64>, Vec<f64>) {
    let mut min = vec![f64::MAX; dimension];
    let mut max = vec![f64::MIN; dimension];

    for element in components.chunks_exact(dimension) {
        for i in 0..dimension {
            min[i] = min[i].min(element[i] as f64);
            max[i] = max[i].max(element[i] as f64);
        }
    }

    (min, max)
}

/// Encode flat components into `dst`, one element every `stride` bytes
fn encode_into(values: &[f32], codec: ElementCodec, dst: &mut [u8], offset: usize, stride: usize) {
    let size = codec.element_size();
    let mut lanes = [0.0f64; 16];
    for (i, element) in values.chunks_exact(codec.components()).enumerate() {
        for (lane, value) in lanes.iter_mut().zip(element) {
            *lane = *value as f64;
        }
        let start = offset + i * stride;
        codec.write_element(&lanes, &mut dst[start..start + size]);
    }
}

/// Collects the accessors of every primitive of an export
pub struct PrimitiveAssembler<'a> {
    accessors: &'a mut Vec<Accessor>,
    options: PrimitiveOptions,
}

impl<'a> PrimitiveAssembler<'a> {
    pub fn new(accessors: &'a mut Vec<Accessor>, options: PrimitiveOptions) -> Self {
        Self { accessors, options }
    }

    fn push(&mut self, mut accessor: Accessor, name: impl FnOnce() -> String, group: &str) -> AccessorIndex {
        if self.options.assign_names {
            accessor.name = Some(name());
        }
        accessor.group = Some(group.to_string());
        self.accessors.push(accessor);
        AccessorIndex(self.accessors.len() as u32 - 1)
    }

    /// Emit accessors for one vertex buffer.
    ///
    /// `label` prefixes accessor names; `group` is the reference group the
    /// accessors are packed under.
    pub fn assemble(
        &mut self,
        buffer: &VertexBuffer,
        delta_count: usize,
        label: &str,
        group: &str,
    ) -> PrimitiveAccessors {
        let vertex_count = buffer.vertex_count();

        let base: Vec<(&AttributeSlot, &[f32])> =
            buffer.slots().filter(|(slot, _)| !slot.shape.is_delta()).collect();
        let interleaved = if self.options.interleave {
            self.interleaved_attributes(&base, vertex_count, label, group)
        } else {
            None
        };
        let attributes = match interleaved {
            Some(attributes) => attributes,
            None => base
                .iter()
                .map(|(slot, values)| {
                    let accessor = attribute_accessor(slot, values, vertex_count);
                    let index = self.push(accessor, || format!("{}/{}", label, slot.attribute_name()), group);
                    (**slot, index)
                })
                .collect(),
        };

        let base_has_positions = base.iter().any(|(slot, _)| slot.semantic == Semantic::Position);
        let mut targets = Vec::with_capacity(delta_count);
        for delta in 0..delta_count {
            let shape = ShapeIndex::delta(delta);
            let mut target = Vec::new();
            for (slot, values) in buffer.slots().filter(|(slot, _)| slot.shape == shape) {
                let accessor = attribute_accessor(slot, values, vertex_count);
                let index = self.push(
                    accessor,
                    || format!("{}/target{}/{}", label, delta, slot.attribute_name()),
                    group,
                );
                target.push((slot.semantic, index));
            }

            // Every primitive of a mesh carries every target; a shape that
            // does not reach these vertices displaces them by zero.
            if target.is_empty() && base_has_positions {
                let zeros = vec![0.0; vertex_count * 3];
                let accessor = Accessor::from_f32(ElementType::Vec3, &zeros)
                    .with_target(Target::Vertex)
                    .with_bounds(vec![0.0; 3], vec![0.0; 3]);
                let index = self.push(accessor, || format!("{}/target{}/POSITION", label, delta), group);
                target.push((Semantic::Position, index));
            }
            targets.push(target);
        }

        let component_type = if !self.options.force_32bit_indices && vertex_count <= MAX_U16_VERTICES {
            ComponentType::U16
        } else {
            ComponentType::U32
        };
        let indices = self.push(
            Accessor::from_indices(&buffer.indices, component_type),
            || format!("{}/indices", label),
            group,
        );

        PrimitiveAccessors {
            shading_group: buffer.signature.shading_group,
            attributes,
            targets,
            indices,
        }
    }

    /// All base attributes in one source record per vertex. `None` when the
    /// record does not fit a vertex stride; nothing is emitted then.
    fn interleaved_attributes(
        &mut self,
        base: &[(&AttributeSlot, &[f32])],
        vertex_count: usize,
        label: &str,
        group: &str,
    ) -> Option<Vec<(AttributeSlot, AccessorIndex)>> {
        let codecs: Vec<ElementCodec> = base.iter().map(|(slot, _)| slot_codec(slot)).collect();

        let mut offsets = Vec::with_capacity(base.len());
        let mut record = 0;
        for codec in &codecs {
            let offset = align_up(record, codec.component_type().byte_size());
            offsets.push(offset);
            record = offset + codec.element_size();
        }
        let stride = align_up(record.max(4), 4);
        if stride > MAX_VERTEX_STRIDE {
            debug!("{}: {}-byte vertex record, packing attributes separately", label, stride);
            return None;
        }

        let mut bytes = vec![0u8; stride * vertex_count];
        for (((_, values), codec), offset) in base.iter().zip(&codecs).zip(&offsets) {
            encode_into(values, *codec, &mut bytes, *offset, stride);
        }
        let bytes: std::sync::Arc<[u8]> = bytes.into();

        let mut attributes = Vec::with_capacity(base.len());
        for (((slot, values), codec), offset) in base.iter().zip(&codecs).zip(&offsets) {
            let mut accessor = Accessor::from_bytes(
                codec.element_type(),
                codec.component_type(),
                vertex_count,
                bytes.clone(),
            )
            .with_target(Target::Vertex)
            .with_stride(stride)
            .with_offset(*offset);
            if slot.semantic == Semantic::Position {
                let (min, max) = compute_bounds(values, slot.dimension());
                accessor = accessor.with_bounds(min, max);
            }
            let index = self.push(accessor, || format!("{}/{}", label, slot.attribute_name()), group);
            attributes.push((**slot, index));
        }
        Some(attributes)
    }
}

fn slot_codec(slot: &AttributeSlot) -> ElementCodec {
    ElementCodec::new(slot.semantic.element_type(slot.shape), slot.semantic.component_type())
}

/// Tightly packed vertex accessor for one slot; POSITION carries bounds
fn attribute_accessor(slot: &AttributeSlot, values: &[f32], vertex_count: usize) -> Accessor {
    let codec = slot_codec(slot);
    let mut bytes = vec![0u8; codec.element_size() * vertex_count];
    encode_into(values, codec, &mut bytes, 0, codec.element_size());

    let mut accessor = Accessor::from_bytes(codec.element_type(), codec.component_type(), vertex_count, bytes)
        .with_target(Target::Vertex);
    if slot.semantic == Semantic::Position {
        let (min, max) = compute_bounds(values, slot.dimension());
        accessor = accessor.with_bounds(min, max);
    }
    accessor
}
