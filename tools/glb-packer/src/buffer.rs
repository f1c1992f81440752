//! Accessors, buffer views and buffers
//!
//! Accessors and views never own bytes. Unpacked accessors share their source
//! bytes through an `Arc`; packed accessors point at a view by index, and the
//! view points at storage owned by the [`AccessorPacker`](crate::AccessorPacker).

use gltf_json as json;
use std::sync::Arc;

use crate::codec::{ComponentType, ElementCodec, ElementType};

/// Accessor index, as referenced from mesh primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessorIndex(pub u32);

impl AccessorIndex {
    pub fn as_json_index(&self) -> json::Index<json::Accessor> {
        json::Index::new(self.0)
    }
}

/// Index of a view owned by the packer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewIndex(pub usize);

/// Index of a final buffer owned by the packer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferIndex(pub usize);

/// Intended GPU binding of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// Vertex attributes (`ARRAY_BUFFER`)
    Vertex,
    /// Primitive indices (`ELEMENT_ARRAY_BUFFER`)
    Index,
}

impl Target {
    pub fn to_json(self) -> json::buffer::Target {
        match self {
            Target::Vertex => json::buffer::Target::ArrayBuffer,
            Target::Index => json::buffer::Target::ElementArrayBuffer,
        }
    }
}

/// Typed, counted view over a byte region
#[derive(Debug, Clone)]
pub struct Accessor {
    pub name: Option<String>,
    pub element_type: ElementType,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub count: usize,
    pub target: Option<Target>,
    /// Interleave stride; `None` means elements are tightly packed.
    pub byte_stride: Option<usize>,
    /// Offset of the first element, relative to the source or the view.
    pub byte_offset: usize,
    pub buffer_view: Option<ViewIndex>,
    pub min: Option<Vec<f64>>,
    pub max: Option<Vec<f64>>,
    /// Reference group label for the per-reference-group packing strategy.
    pub group: Option<String>,
    source: Option<Arc<[u8]>>,
}

impl Accessor {
    /// Accessor over externally owned bytes
    pub fn from_bytes(
        element_type: ElementType,
        component_type: ComponentType,
        count: usize,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: None,
            element_type,
            component_type,
            normalized: false,
            count,
            target: None,
            byte_stride: None,
            byte_offset: 0,
            buffer_view: None,
            min: None,
            max: None,
            group: None,
            source: Some(bytes.into()),
        }
    }

    /// Tightly packed f32 accessor, `components` values per element
    pub fn from_f32(element_type: ElementType, components: &[f32]) -> Self {
        let count = components.len() / element_type.components();
        Self::from_bytes(
            element_type,
            ComponentType::F32,
            count,
            bytemuck::cast_slice::<f32, u8>(components),
        )
    }

    /// Scalar index accessor, `u16` or `u32` storage
    pub fn from_indices(indices: &[u32], component_type: ComponentType) -> Self {
        let mut bytes = Vec::with_capacity(indices.len() * component_type.byte_size());
        for &index in indices {
            match component_type {
                ComponentType::U16 => bytes.extend_from_slice(&(index as u16).to_le_bytes()),
                _ => bytes.extend_from_slice(&index.to_le_bytes()),
            }
        }
        let mut accessor = Self::from_bytes(ElementType::Scalar, component_type, indices.len(), bytes);
        accessor.target = Some(Target::Index);
        accessor
    }

    /// Accessor with no backing data (glTF permits accessors without a view)
    pub fn unbound(element_type: ElementType, component_type: ComponentType, count: usize) -> Self {
        let mut accessor = Self::from_bytes(element_type, component_type, count, Vec::new());
        accessor.source = None;
        accessor
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_stride(mut self, byte_stride: usize) -> Self {
        self.byte_stride = Some(byte_stride);
        self
    }

    pub fn with_offset(mut self, byte_offset: usize) -> Self {
        self.byte_offset = byte_offset;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_bounds(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn codec(&self) -> ElementCodec {
        ElementCodec::new(self.element_type, self.component_type)
    }

    pub fn component_size(&self) -> usize {
        self.component_type.byte_size()
    }

    pub fn element_size(&self) -> usize {
        self.codec().element_size()
    }

    /// Tightly packed size of all elements
    pub fn byte_length(&self) -> usize {
        self.element_size() * self.count
    }

    /// Stride the accessor is grouped under when packing
    pub fn grouping_stride(&self) -> usize {
        self.byte_stride.unwrap_or(0)
    }

    /// Distance between consecutive elements in the current storage
    pub fn element_stride(&self) -> usize {
        self.byte_stride
            .filter(|stride| *stride > 0)
            .unwrap_or_else(|| self.element_size())
    }

    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some() || self.buffer_view.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Point the accessor at its packed location and release the source bytes
    pub(crate) fn rebind(&mut self, view: ViewIndex, byte_offset: usize, byte_stride: Option<usize>) {
        self.buffer_view = Some(view);
        self.byte_offset = byte_offset;
        self.byte_stride = byte_stride;
        self.source = None;
    }

    /// Drop the source bytes without a packed location (empty accessors)
    pub(crate) fn detach(&mut self) {
        self.buffer_view = None;
        self.source = None;
    }
}

/// Where a view's bytes currently live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStorage {
    /// Per-group backing storage, before merging
    Staging(usize),
    /// A final buffer
    Buffer(BufferIndex),
}

/// Contiguous byte region inside a buffer
#[derive(Debug, Clone)]
pub struct BufferView {
    pub name: Option<String>,
    pub storage: ViewStorage,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    pub target: Option<Target>,
    /// Stride of the (target, stride) group the view was packed from. Index
    /// and untargeted views keep it even though they carry no `byte_stride`.
    pub group_stride: usize,
}

impl BufferView {
    pub fn buffer(&self) -> Option<BufferIndex> {
        match self.storage {
            ViewStorage::Buffer(index) => Some(index),
            ViewStorage::Staging(_) => None,
        }
    }

    /// Stride used to order views when merging
    pub fn stride(&self) -> usize {
        self.group_stride
    }
}

/// Final binary payload
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub(crate) data: Vec<u8>,
}

impl Buffer {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_from_f32() {
        let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0];
        let accessor = Accessor::from_f32(ElementType::Vec3, &positions);

        assert_eq!(accessor.count, 3);
        // 3 positions * 12 bytes
        assert_eq!(accessor.byte_length(), 36);
        assert_eq!(accessor.source().map(<[u8]>::len), Some(36));
        assert_eq!(accessor.element_stride(), 12);
    }

    #[test]
    fn test_accessor_from_indices_u16() {
        let accessor = Accessor::from_indices(&[0, 1, 2], ComponentType::U16);

        assert_eq!(accessor.target, Some(Target::Index));
        // 3 indices * 2 bytes
        assert_eq!(accessor.byte_length(), 6);
        assert_eq!(accessor.source(), Some(&[0, 0, 1, 0, 2, 0][..]));
    }

    #[test]
    fn test_interleaved_source_stride() {
        let accessor = Accessor::from_bytes(ElementType::Vec3, ComponentType::F32, 2, vec![0u8; 48])
            .with_stride(24)
            .with_offset(12);

        assert_eq!(accessor.grouping_stride(), 24);
        assert_eq!(accessor.element_stride(), 24);
        assert_eq!(accessor.byte_length(), 24);
    }

    #[test]
    fn test_unbound_accessor() {
        let accessor = Accessor::unbound(ElementType::Scalar, ComponentType::F32, 4);
        assert!(!accessor.is_bound());
        assert_eq!(accessor.grouping_stride(), 0);
    }
}
