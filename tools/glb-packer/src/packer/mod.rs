//! Accessor packing
//!
//! Accessors are partitioned by usage target (none, vertex, index) and then by
//! interleave stride. Each (target, stride) group is laid out into one staging
//! view, every element is copied through its
//! [`ElementCodec`](crate::codec::ElementCodec), and the
//! accessor is rebound to its packed location. Views are then merged into
//! final buffers according to a [`PackingStrategy`].
//!
//! The packer owns every staging region, view and buffer it creates for its
//! whole lifetime; accessors only refer to them by index.

mod layout;
mod merge;

use hashbrown::HashSet;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::buffer::{Accessor, Buffer, BufferIndex, BufferView, Target, ViewIndex, ViewStorage};
use crate::config::{BufferNaming, PackingStrategy};
use crate::error::{PackError, PackResult};

pub(crate) use layout::{MAX_VERTEX_STRIDE, align_up};

/// Purpose label used in view names
fn purpose(target: Option<Target>) -> &'static str {
    match target {
        Some(Target::Vertex) => "vertices",
        Some(Target::Index) => "indices",
        None => "data",
    }
}

/// Zero-filled storage, failing instead of aborting when memory runs out
pub(crate) fn allocate(len: usize) -> PackResult<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| PackError::Allocation { bytes: len })?;
    data.resize(len, 0);
    Ok(data)
}

/// Copy all elements of a source-backed accessor into `dst`
fn copy_elements(
    accessor: &Accessor,
    dst: &mut [u8],
    dst_offset: usize,
    dst_stride: usize,
) -> PackResult<()> {
    let Some(source) = accessor.source() else {
        return Ok(());
    };
    if accessor.count == 0 {
        return Ok(());
    }

    let codec = accessor.codec();
    let size = codec.element_size();
    let src_stride = accessor.element_stride();

    let needed = accessor.byte_offset + (accessor.count - 1) * src_stride + size;
    if needed > source.len() {
        return Err(PackError::SourceOutOfBounds {
            accessor: accessor.display_name().to_string(),
            needed,
            available: source.len(),
        });
    }

    let mut lanes: SmallVec<[f64; 16]> = SmallVec::from_elem(0.0, codec.components());
    for i in 0..accessor.count {
        let src = accessor.byte_offset + i * src_stride;
        let dst_start = dst_offset + i * dst_stride;
        codec.read_element(&source[src..src + size], &mut lanes);
        codec.write_element(&lanes, &mut dst[dst_start..dst_start + size]);
    }
    Ok(())
}

/// File stem safe for a buffer URI
fn uri_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Members partitioned by reference group label, in first-seen order.
/// Accessors without a label fall into `default`.
fn reference_groups(
    accessors: &[Accessor],
    members: &[usize],
    default: &str,
) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for &member in members {
        let label = accessors[member].group.as_deref().unwrap_or(default);
        match groups.iter_mut().find(|(existing, _)| existing == label) {
            Some((_, group)) => group.push(member),
            None => groups.push((label.to_string(), vec![member])),
        }
    }
    groups
}

/// Owns packed storage, views and buffers for one export
#[derive(Debug, Default)]
pub struct AccessorPacker {
    staging: Vec<Vec<u8>>,
    views: Vec<BufferView>,
    buffers: Vec<Buffer>,
    assign_names: bool,
    naming: BufferNaming,
}

impl AccessorPacker {
    pub fn new() -> Self {
        Self {
            assign_names: true,
            ..Default::default()
        }
    }

    /// Name views and buffers (default on)
    pub fn with_names(mut self, assign_names: bool) -> Self {
        self.assign_names = assign_names;
        self
    }

    pub fn with_naming(mut self, naming: BufferNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn views(&self) -> &[BufferView] {
        &self.views
    }

    pub fn view(&self, index: ViewIndex) -> Option<&BufferView> {
        self.views.get(index.0)
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn buffer(&self, index: BufferIndex) -> Option<&Buffer> {
        self.buffers.get(index.0)
    }

    /// Release the final buffers
    pub fn into_buffers(self) -> Vec<Buffer> {
        self.buffers
    }

    /// Bytes covered by a view, wherever they currently live
    pub fn view_data(&self, index: ViewIndex) -> Option<&[u8]> {
        let view = self.views.get(index.0)?;
        let storage = match view.storage {
            ViewStorage::Staging(i) => self.staging.get(i)?.as_slice(),
            ViewStorage::Buffer(b) => self.buffers.get(b.0)?.data(),
        };
        storage.get(view.byte_offset..view.byte_offset + view.byte_length)
    }

    /// Decode a packed accessor back into flat components
    pub fn read_accessor(&self, accessor: &Accessor) -> Option<Vec<f64>> {
        let data = self.view_data(accessor.buffer_view?)?;
        let codec = accessor.codec();
        let size = codec.element_size();
        let stride = accessor.element_stride();

        let mut values = vec![0.0; accessor.count * codec.components()];
        for (i, element) in values.chunks_exact_mut(codec.components()).enumerate() {
            let start = accessor.byte_offset + i * stride;
            codec.read_element(data.get(start..start + size)?, element);
        }
        Some(values)
    }

    /// Pack one (target, stride) group into a new staging view.
    ///
    /// `members` index into `accessors` and keep their order in the view.
    /// Returns `None` when the group holds no bytes.
    pub fn pack_group(
        &mut self,
        accessors: &mut [Accessor],
        members: &[usize],
        target: Option<Target>,
        stride: usize,
        name: &str,
    ) -> PackResult<Option<ViewIndex>> {
        let layout = {
            let refs: Vec<&Accessor> = members.iter().map(|m| &accessors[*m]).collect();
            if target == Some(Target::Vertex) && stride > 0 {
                layout::interleaved(&refs, stride)?
            } else {
                layout::sequential(&refs)
            }
        };

        if layout.byte_length == 0 {
            for &member in members {
                accessors[member].detach();
            }
            return Ok(None);
        }

        let mut data = allocate(layout.byte_length)?;
        for (&member, &offset) in members.iter().zip(&layout.offsets) {
            let accessor = &accessors[member];
            copy_elements(accessor, &mut data, offset, layout.element_stride(accessor))?;
        }

        let index = ViewIndex(self.views.len());
        let view_name = format!("{}/{}-{}", name, purpose(target), stride);
        debug!(
            "{}: {} accessors, {} bytes, stride {:?}",
            view_name,
            members.len(),
            layout.byte_length,
            layout.byte_stride
        );

        let storage = ViewStorage::Staging(self.staging.len());
        self.staging.push(data);
        self.views.push(BufferView {
            name: self.assign_names.then_some(view_name),
            storage,
            byte_offset: 0,
            byte_length: layout.byte_length,
            byte_stride: layout.byte_stride,
            target,
            group_stride: stride,
        });

        for (&member, &offset) in members.iter().zip(&layout.offsets) {
            accessors[member].rebind(index, offset, layout.byte_stride);
        }
        Ok(Some(index))
    }

    /// Group `members` by (target, stride) and pack each group.
    ///
    /// Groups are visited with no target first, then vertex, then index, each
    /// by ascending stride. Accessors without source bytes are left untouched.
    pub fn pack_views(
        &mut self,
        accessors: &mut [Accessor],
        members: &[usize],
        name: &str,
    ) -> PackResult<Vec<ViewIndex>> {
        let mut groups: BTreeMap<(Option<Target>, usize), Vec<usize>> = BTreeMap::new();
        for &member in members {
            let accessor = &accessors[member];
            if accessor.source().is_none() {
                continue;
            }
            groups
                .entry((accessor.target, accessor.grouping_stride()))
                .or_default()
                .push(member);
        }

        let mut views = Vec::with_capacity(groups.len());
        for ((target, stride), group) in groups {
            views.extend(self.pack_group(accessors, &group, target, stride, name)?);
        }
        Ok(views)
    }

    /// Pack every accessor and merge the views into a single buffer.
    /// Returns `None` when nothing produced any bytes.
    pub fn pack_accessors(
        &mut self,
        accessors: &mut [Accessor],
        name: &str,
    ) -> PackResult<Option<BufferIndex>> {
        let members: Vec<usize> = (0..accessors.len()).collect();
        let views = self.pack_views(accessors, &members, name)?;
        self.merge_views(&views, name)
    }

    /// Pack every accessor with the given strategy and assign buffer URIs
    pub fn pack(
        &mut self,
        accessors: &mut [Accessor],
        strategy: PackingStrategy,
        name: &str,
    ) -> PackResult<Vec<BufferIndex>> {
        let members: Vec<usize> = (0..accessors.len())
            .filter(|i| accessors[*i].source().is_some())
            .collect();
        let mut created: Vec<(BufferIndex, String)> = Vec::new();

        match strategy {
            PackingStrategy::Single => {
                let buffer = self.pack_accessors(accessors, name)?;
                created.extend(buffer.map(|b| (b, name.to_string())));
            }
            PackingStrategy::PerGroup => {
                let views = self.pack_views(accessors, &members, name)?;
                for (i, view) in views.into_iter().enumerate() {
                    let label = self.views[view.0]
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("{}_{}", name, i));
                    let buffer = self.merge_views(&[view], &label)?;
                    created.extend(buffer.map(|b| (b, label)));
                }
            }
            PackingStrategy::PerAccessor => {
                for (i, &member) in members.iter().enumerate() {
                    let label = accessors[member]
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("{}_{}", name, i));
                    let views = self.pack_views(accessors, &[member], &label)?;
                    let buffer = self.merge_views(&views, &label)?;
                    created.extend(buffer.map(|b| (b, label)));
                }
            }
            PackingStrategy::PerReferenceGroup => {
                for (label, group) in reference_groups(accessors, &members, name) {
                    let views = self.pack_views(accessors, &group, &label)?;
                    let buffer = self.merge_views(&views, &label)?;
                    created.extend(buffer.map(|b| (b, label)));
                }
            }
        }

        self.assign_uris(&created);
        Ok(created.into_iter().map(|(buffer, _)| buffer).collect())
    }

    fn assign_uris(&mut self, created: &[(BufferIndex, String)]) {
        let mut used = HashSet::new();
        for (i, (index, label)) in created.iter().enumerate() {
            let buffer = &mut self.buffers[index.0];
            let uri = match self.naming {
                BufferNaming::ContentHash => format!("{:016x}.bin", xxh3_64(&buffer.data)),
                BufferNaming::Readable => {
                    let stem = uri_stem(label);
                    let uri = format!("{}.bin", stem);
                    if used.contains(&uri) {
                        format!("{}_{}.bin", stem, i)
                    } else {
                        uri
                    }
                }
            };
            used.insert(uri.clone());
            buffer.uri = Some(uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ComponentType, ElementType};
    use std::sync::Arc;

    fn layout_scenario() -> Vec<Accessor> {
        vec![
            Accessor::from_f32(ElementType::Vec3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])
                .with_name("a"),
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U16, 2, vec![7, 0, 9, 1])
                .with_name("b"),
            Accessor::from_f32(ElementType::Vec4, &[0.5, -0.0, f32::MAX, 1.0e-40]).with_name("c"),
        ]
    }

    #[test]
    fn test_layout_offsets() {
        let mut accessors = layout_scenario();
        let mut packer = AccessorPacker::new();
        let buffer = packer.pack_accessors(&mut accessors, "scene").unwrap().unwrap();

        let offsets: Vec<usize> = accessors.iter().map(|a| a.byte_offset).collect();
        assert_eq!(offsets, vec![0, 36, 40]);
        assert_eq!(packer.views().len(), 1);
        assert_eq!(packer.views()[0].byte_length, 56);
        assert_eq!(packer.views()[0].name.as_deref(), Some("scene/data-0"));
        assert_eq!(packer.buffer(buffer).unwrap().byte_length(), 56);
    }

    #[test]
    fn test_packed_values_round_trip() {
        let mut accessors = layout_scenario();
        let expected: Vec<Vec<f64>> = vec![
            (1..=9).map(|v| v as f64).collect(),
            vec![7.0, 265.0],
            vec![0.5, -0.0, f32::MAX as f64, 1.0e-40f32 as f64],
        ];

        let mut packer = AccessorPacker::new();
        packer.pack_accessors(&mut accessors, "scene").unwrap();

        for (accessor, expected) in accessors.iter().zip(&expected) {
            assert!(accessor.source().is_none());
            let values = packer.read_accessor(accessor).unwrap();
            let bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
            let expected_bits: Vec<u64> = expected.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits, expected_bits, "accessor {}", accessor.display_name());
        }
    }

    #[test]
    fn test_alignment_of_mixed_component_sizes() {
        let mut accessors = vec![
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U8, 3, vec![1, 2, 3]),
            Accessor::from_bytes(ElementType::Scalar, ComponentType::I16, 1, vec![0xff, 0xff]),
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U8, 1, vec![4]),
            Accessor::from_f32(ElementType::Scalar, &[2.5]),
        ];
        let mut packer = AccessorPacker::new();
        packer.pack_accessors(&mut accessors, "scene").unwrap();

        for accessor in &accessors {
            assert_eq!(accessor.byte_offset % accessor.component_size(), 0);
        }
        assert_eq!(packer.read_accessor(&accessors[1]).unwrap(), vec![-1.0]);
    }

    #[test]
    fn test_interleaved_vertex_group() {
        let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let uvs = [0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0];

        // position + uv records, 20 bytes each
        let mut interleaved: Vec<f32> = Vec::new();
        for (position, uv) in positions.chunks(3).zip(uvs.chunks(2)) {
            interleaved.extend_from_slice(position);
            interleaved.extend_from_slice(uv);
        }
        let bytes: Arc<[u8]> = bytemuck::cast_slice::<f32, u8>(&interleaved).into();

        let mut accessors = vec![
            Accessor::from_bytes(ElementType::Vec3, ComponentType::F32, 3, bytes.clone())
                .with_target(Target::Vertex)
                .with_stride(20),
            Accessor::from_bytes(ElementType::Vec2, ComponentType::F32, 3, bytes)
                .with_target(Target::Vertex)
                .with_stride(20)
                .with_offset(12),
        ];

        let mut packer = AccessorPacker::new();
        let views = packer.pack_views(&mut accessors, &[0, 1], "scene").unwrap();
        assert_eq!(views.len(), 1);

        let view = packer.view(views[0]).unwrap();
        assert_eq!(view.byte_stride, Some(20));
        assert_eq!(view.byte_length, 60);
        assert_eq!(view.name.as_deref(), Some("scene/vertices-20"));
        assert_eq!(accessors[0].byte_offset, 0);
        assert_eq!(accessors[1].byte_offset, 12);
        assert_eq!(
            packer.read_accessor(&accessors[0]).unwrap(),
            positions.iter().map(|v| *v as f64).collect::<Vec<_>>()
        );
        assert_eq!(
            packer.read_accessor(&accessors[1]).unwrap(),
            uvs.iter().map(|v| *v as f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_index_view_never_carries_stride() {
        // u16 indices spread over a 4-byte source stride
        let source = vec![0, 0, 0xaa, 0xaa, 1, 0, 0xaa, 0xaa, 2, 0, 0xaa, 0xaa];
        let mut accessors = vec![
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U16, 3, source)
                .with_target(Target::Index)
                .with_stride(4),
        ];
        let mut packer = AccessorPacker::new();
        packer.pack_accessors(&mut accessors, "scene").unwrap();

        let view = &packer.views()[0];
        assert_eq!(view.byte_stride, None);
        assert_eq!(view.byte_length, 6);
        assert_eq!(view.target, Some(Target::Index));
        assert_eq!(accessors[0].byte_stride, None);
        assert_eq!(packer.read_accessor(&accessors[0]).unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_source_out_of_bounds() {
        let mut accessors =
            vec![Accessor::from_bytes(ElementType::Vec3, ComponentType::F32, 2, vec![0u8; 20])];
        let mut packer = AccessorPacker::new();
        assert!(matches!(
            packer.pack_accessors(&mut accessors, "scene"),
            Err(PackError::SourceOutOfBounds {
                needed: 24,
                available: 20,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_input_produces_no_buffer() {
        let mut accessors = vec![Accessor::unbound(ElementType::Scalar, ComponentType::F32, 4)];
        let mut packer = AccessorPacker::new();
        assert_eq!(packer.pack_accessors(&mut accessors, "scene").unwrap(), None);
        assert!(packer.buffers().is_empty());
        assert!(accessors[0].buffer_view.is_none());
    }

    fn mixed_targets() -> Vec<Accessor> {
        vec![
            Accessor::from_f32(ElementType::Vec3, &[0.0; 9])
                .with_target(Target::Vertex)
                .with_group("body"),
            Accessor::from_indices(&[0, 1, 2], ComponentType::U16).with_group("body"),
            Accessor::from_f32(ElementType::Scalar, &[0.0, 1.0]).with_group("clip"),
        ]
    }

    #[test]
    fn test_per_group_strategy() {
        let mut accessors = mixed_targets();
        let mut packer = AccessorPacker::new();
        let buffers = packer
            .pack(&mut accessors, PackingStrategy::PerGroup, "scene")
            .unwrap();

        assert_eq!(buffers.len(), 3);
        let uris: Vec<_> = buffers
            .iter()
            .map(|b| packer.buffer(*b).unwrap().uri.clone().unwrap())
            .collect();
        assert_eq!(
            uris,
            vec!["scene_data-0.bin", "scene_vertices-0.bin", "scene_indices-0.bin"]
        );
    }

    #[test]
    fn test_per_accessor_strategy() {
        let mut accessors = mixed_targets();
        let mut packer = AccessorPacker::new();
        let buffers = packer
            .pack(&mut accessors, PackingStrategy::PerAccessor, "scene")
            .unwrap();

        assert_eq!(buffers.len(), 3);
        for (accessor, buffer) in accessors.iter().zip(&buffers) {
            let view = packer.view(accessor.buffer_view.unwrap()).unwrap();
            assert_eq!(view.buffer(), Some(*buffer));
        }
    }

    #[test]
    fn test_per_reference_group_strategy() {
        let mut accessors = mixed_targets();
        let mut packer = AccessorPacker::new();
        let buffers = packer
            .pack(&mut accessors, PackingStrategy::PerReferenceGroup, "scene")
            .unwrap();

        assert_eq!(buffers.len(), 2);
        let body = packer.buffer(buffers[0]).unwrap();
        assert_eq!(body.name.as_deref(), Some("body"));
        assert_eq!(body.uri.as_deref(), Some("body.bin"));
        // 36 bytes of positions, then 6 bytes of indices
        assert_eq!(body.byte_length(), 42);
        assert_eq!(packer.buffer(buffers[1]).unwrap().byte_length(), 8);
    }

    #[test]
    fn test_content_hash_naming() {
        let mut accessors = mixed_targets();
        let mut packer = AccessorPacker::new().with_naming(BufferNaming::ContentHash);
        let buffers = packer
            .pack(&mut accessors, PackingStrategy::Single, "scene")
            .unwrap();

        let buffer = packer.buffer(buffers[0]).unwrap();
        let expected = format!("{:016x}.bin", xxh3_64(buffer.data()));
        assert_eq!(buffer.uri.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_names_can_be_disabled() {
        let mut accessors = mixed_targets();
        let mut packer = AccessorPacker::new().with_names(false);
        packer
            .pack(&mut accessors, PackingStrategy::Single, "scene")
            .unwrap();

        assert!(packer.views().iter().all(|v| v.name.is_none()));
        assert!(packer.buffers()[0].name.is_none());
        assert_eq!(packer.buffers()[0].uri.as_deref(), Some("scene.bin"));
    }
}
