//! Vertex deduplication across base and delta shapes
//!
//! Primitive-vertices are welded by value: two vertices share an output index
//! when every present slot (across the base shape and all delta shapes) holds
//! bit-identical components. Vertices with a different set of present slots
//! get their own [`VertexBuffer`], since they cannot share an index space.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::MeshError;
use crate::semantic::{AttributeSlot, Semantic, SemanticSet, ShapeIndex};
use crate::shape::{MeshInput, ShapeStream};

/// Which semantics are exported for the base shape and for delta shapes
#[derive(Debug, Clone, Copy)]
pub struct RenderableOptions {
    pub mesh_semantics: SemanticSet,
    pub morph_semantics: SemanticSet,
}

impl Default for RenderableOptions {
    fn default() -> Self {
        Self {
            mesh_semantics: SemanticSet::all(),
            morph_semantics: SemanticSet::morph(),
        }
    }
}

/// Bitmask over the mesh's candidate slots
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SlotMask(SmallVec<[u64; 2]>);

impl SlotMask {
    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1 << (bit % 64);
    }

    pub fn test(&self, bit: usize) -> bool {
        self.0
            .get(bit / 64)
            .is_some_and(|word| word & (1 << (bit % 64)) != 0)
    }

    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Identity of an index space: shading group plus present slots
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexSignature {
    pub shading_group: u32,
    pub slots: SlotMask,
}

/// Concatenated component bit patterns of one vertex. Comparing bits keeps
/// `-0.0`/`0.0` distinct and lets identical NaNs weld.
type VertexKey = SmallVec<[u32; 32]>;

/// Deduplicated vertices of one signature
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    pub signature: VertexSignature,
    /// Present slots, in global slot order
    pub layout: Vec<AttributeSlot>,
    /// Output index per primitive-vertex, in primitive order
    pub indices: Vec<u32>,
    sharing: HashMap<VertexKey, u32>,
    /// Flat components per layout slot
    components: Vec<Vec<f32>>,
}

impl VertexBuffer {
    pub fn new(signature: VertexSignature, layout: Vec<AttributeSlot>) -> Self {
        let components = vec![Vec::new(); layout.len()];
        Self {
            signature,
            layout,
            indices: Vec::new(),
            sharing: HashMap::new(),
            components,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.sharing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Flat components of a slot. Delta slots hold deltas once built.
    pub fn components(&self, slot: &AttributeSlot) -> Option<&[f32]> {
        self.layout
            .iter()
            .position(|s| s == slot)
            .map(|i| self.components[i].as_slice())
    }

    /// Slots with their flat components
    pub fn slots(&self) -> impl Iterator<Item = (&AttributeSlot, &[f32])> {
        self.layout
            .iter()
            .zip(self.components.iter().map(Vec::as_slice))
    }

    /// Record one primitive-vertex, returning its output index
    fn insert(&mut self, key: &[u32], values: &[&[f32]]) -> u32 {
        if let Some(&index) = self.sharing.get(key) {
            self.indices.push(index);
            return index;
        }

        let index = self.sharing.len() as u32;
        self.sharing.insert(VertexKey::from_slice(key), index);
        for (target, value) in self.components.iter_mut().zip(values) {
            target.extend_from_slice(value);
        }
        self.indices.push(index);
        index
    }

    /// Turn absolute delta-shape values into offsets from the base shape
    fn subtract_base(&mut self) {
        for slot_index in 0..self.layout.len() {
            let slot = self.layout[slot_index];
            if !slot.shape.is_delta() {
                continue;
            }
            let Some(base_index) = self.layout.iter().position(|s| *s == slot.base_slot()) else {
                continue;
            };

            let base_dimension = slot.base_slot().dimension();
            let delta_dimension = slot.dimension();
            let shared = base_dimension.min(delta_dimension);

            let (base, delta) = if base_index < slot_index {
                let (head, tail) = self.components.split_at_mut(slot_index);
                (&head[base_index], &mut tail[0])
            } else {
                let (head, tail) = self.components.split_at_mut(base_index);
                (&tail[0], &mut head[slot_index])
            };

            for (base, delta) in base
                .chunks_exact(base_dimension)
                .zip(delta.chunks_exact_mut(delta_dimension))
            {
                for d in 0..shared {
                    delta[d] -= base[d];
                }
            }
        }
    }
}

/// Weld statistics for one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeldStats {
    /// Primitive-vertices that were processed
    pub primitive_vertices: usize,
    /// Primitive-vertices that reused an existing output vertex
    pub welded: usize,
    /// Primitives skipped for lacking a shading group
    pub unassigned_primitives: usize,
}

/// A slot that may be present on some vertices
struct Candidate<'a> {
    slot: AttributeSlot,
    stream: &'a ShapeStream,
    base_stream: Option<&'a ShapeStream>,
}

impl Candidate<'_> {
    /// Element index of this slot at a primitive-vertex. A delta slot is only
    /// present where its base slot is.
    fn index_at(&self, primitive_vertex: usize) -> Option<u32> {
        if let Some(base) = self.base_stream {
            base.indices[primitive_vertex]?;
        }
        self.stream.indices[primitive_vertex]
    }
}

/// Deduplicated vertex buffers of one mesh, in first-use order
#[derive(Debug, Clone)]
pub struct MeshRenderables {
    buffers: Vec<VertexBuffer>,
    stats: WeldStats,
}

impl MeshRenderables {
    pub fn new(mesh: &MeshInput, options: &RenderableOptions) -> Result<Self, MeshError> {
        mesh.validate()?;

        let candidates = collect_candidates(mesh, options)?;
        let vertices_per_primitive = mesh.vertices_per_primitive.max(1);
        let primitive_count = mesh.primitive_count()?;

        let mut buffers: Vec<VertexBuffer> = Vec::new();
        let mut lookup: HashMap<VertexSignature, usize> = HashMap::new();
        let mut stats = WeldStats::default();

        let mut signature = VertexSignature {
            shading_group: 0,
            slots: SlotMask::default(),
        };
        let mut key = VertexKey::new();
        let mut values: SmallVec<[&[f32]; 16]> = SmallVec::new();

        for primitive in 0..primitive_count {
            let Some(shading_group) = mesh.shading_group(primitive) else {
                stats.unassigned_primitives += 1;
                continue;
            };

            for primitive_vertex in
                primitive * vertices_per_primitive..(primitive + 1) * vertices_per_primitive
            {
                signature.shading_group = shading_group;
                signature.slots.clear();
                key.clear();
                values.clear();

                for (bit, candidate) in candidates.iter().enumerate() {
                    let Some(index) = candidate.index_at(primitive_vertex) else {
                        continue;
                    };
                    let element = candidate.stream.element(index, candidate.slot.dimension());
                    signature.slots.set(bit);
                    key.extend(element.iter().map(|c| c.to_bits()));
                    values.push(element);
                }

                let buffer_index = match lookup.get(&signature) {
                    Some(&index) => index,
                    None => {
                        let layout = candidates
                            .iter()
                            .enumerate()
                            .filter(|(bit, _)| signature.slots.test(*bit))
                            .map(|(_, c)| c.slot)
                            .collect();
                        buffers.push(VertexBuffer::new(signature.clone(), layout));
                        lookup.insert(signature.clone(), buffers.len() - 1);
                        buffers.len() - 1
                    }
                };

                let buffer = &mut buffers[buffer_index];
                let before = buffer.vertex_count();
                buffer.insert(&key, &values);
                if buffer.vertex_count() == before {
                    stats.welded += 1;
                }
                stats.primitive_vertices += 1;
            }
        }

        if !mesh.deltas.is_empty() {
            for buffer in &mut buffers {
                buffer.subtract_base();
            }
        }

        tracing::info!(
            "{} will have {} vertices. Welded#{}, max#{}",
            mesh.name,
            stats.primitive_vertices - stats.welded,
            stats.welded,
            stats.primitive_vertices
        );
        if stats.unassigned_primitives > 0 {
            tracing::warn!(
                "{}: skipped {} primitives without a shading group",
                mesh.name,
                stats.unassigned_primitives
            );
        }

        Ok(Self { buffers, stats })
    }

    pub fn buffers(&self) -> &[VertexBuffer] {
        &self.buffers
    }

    pub fn stats(&self) -> WeldStats {
        self.stats
    }

    pub fn vertex_count(&self) -> usize {
        self.buffers.iter().map(VertexBuffer::vertex_count).sum()
    }
}

/// Slots that may be present, in the fixed global order: shape, then
/// semantic, then set.
fn collect_candidates<'a>(
    mesh: &'a MeshInput,
    options: &RenderableOptions,
) -> Result<Vec<Candidate<'a>>, MeshError> {
    let base_table = mesh.base.stream_table()?;
    let mut candidates = Vec::new();

    for (shape_index, shape) in mesh.shapes() {
        let table = if shape_index.is_delta() {
            shape.stream_table()?
        } else {
            base_table.clone()
        };

        for ((semantic, set), stream) in table {
            if !options.mesh_semantics.contains(semantic) {
                continue;
            }

            let base_stream = if shape_index.is_delta() {
                if !options.morph_semantics.contains(semantic) || !Semantic::MORPH.contains(&semantic) {
                    continue;
                }
                match base_table.get(&(semantic, set)) {
                    Some(base) => Some(*base),
                    None => continue,
                }
            } else {
                None
            };

            candidates.push(Candidate {
                slot: AttributeSlot::new(shape_index, semantic, set),
                stream,
                base_stream,
            });
        }
    }
    Ok(candidates)
}
