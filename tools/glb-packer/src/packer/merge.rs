//! Merging staging views into final buffers

use std::cmp::Reverse;
use tracing::debug;

use super::{AccessorPacker, align_up, allocate};
use crate::buffer::{Buffer, BufferIndex, ViewIndex, ViewStorage};
use crate::error::{PackError, PackResult};

/// Start alignment of every view inside a merged buffer
const VIEW_ALIGNMENT: usize = 4;

impl AccessorPacker {
    /// Concatenate views into one new buffer.
    ///
    /// Views are ordered by descending stride, keeping creation order within
    /// a stride. Each view is moved to its offset in the new buffer. Returns
    /// `None` and creates nothing when the views hold no bytes.
    pub fn merge_views(
        &mut self,
        views: &[ViewIndex],
        name: &str,
    ) -> PackResult<Option<BufferIndex>> {
        let mut order = Vec::with_capacity(views.len());
        for &index in views {
            let view = self
                .views
                .get(index.0)
                .ok_or(PackError::DanglingView(index.0))?;
            if view.byte_length > 0 {
                order.push(index);
            }
        }
        order.sort_by_key(|index| Reverse(self.views[index.0].stride()));

        let mut offsets = Vec::with_capacity(order.len());
        let mut cursor = 0;
        for index in &order {
            let offset = align_up(cursor, VIEW_ALIGNMENT);
            offsets.push(offset);
            cursor = offset + self.views[index.0].byte_length;
        }
        if cursor == 0 {
            return Ok(None);
        }

        let mut data = allocate(cursor)?;
        for (index, &offset) in order.iter().zip(&offsets) {
            let bytes = self
                .view_data(*index)
                .ok_or(PackError::DanglingView(index.0))?;
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        let buffer = BufferIndex(self.buffers.len());
        for (index, offset) in order.iter().zip(offsets) {
            let view = &mut self.views[index.0];
            view.storage = ViewStorage::Buffer(buffer);
            view.byte_offset = offset;
        }

        debug!("{}: merged {} views into {} bytes", name, order.len(), cursor);
        self.buffers.push(Buffer {
            name: self.assign_names.then(|| name.to_string()),
            uri: None,
            data,
        });
        Ok(Some(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Accessor, Target};
    use crate::codec::{ComponentType, ElementType};

    #[test]
    fn test_views_ordered_by_descending_stride() {
        let mut accessors = vec![
            Accessor::from_f32(ElementType::Vec3, &[0.0; 6]).with_target(Target::Vertex),
            Accessor::from_f32(ElementType::Vec3, &[1.0; 6])
                .with_target(Target::Vertex)
                .with_stride(12),
            Accessor::from_f32(ElementType::Vec4, &[2.0; 4])
                .with_target(Target::Vertex)
                .with_stride(16),
        ];
        let mut packer = AccessorPacker::new();
        let buffer = packer.pack_accessors(&mut accessors, "scene").unwrap().unwrap();

        let offsets: Vec<(usize, usize)> = packer
            .views()
            .iter()
            .map(|v| (v.stride(), v.byte_offset))
            .collect();
        // created in ascending stride order, laid out descending
        assert_eq!(offsets, vec![(0, 40), (12, 16), (16, 0)]);
        assert!(packer.views().iter().all(|v| v.buffer() == Some(buffer)));
        assert_eq!(packer.buffer(buffer).unwrap().byte_length(), 64);
    }

    #[test]
    fn test_view_starts_padded_to_four_bytes() {
        let mut accessors = vec![
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U8, 3, vec![1, 2, 3]),
            Accessor::from_f32(ElementType::Vec3, &[4.0, 5.0, 6.0]).with_target(Target::Vertex),
        ];
        let mut packer = AccessorPacker::new();
        let buffer = packer.pack_accessors(&mut accessors, "scene").unwrap().unwrap();

        assert_eq!(packer.views()[0].byte_offset, 0);
        assert_eq!(packer.views()[1].byte_offset, 4);
        let data = packer.buffer(buffer).unwrap().data();
        assert_eq!(&data[..4], &[1, 2, 3, 0]);
        assert_eq!(packer.read_accessor(&accessors[1]).unwrap(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_index_group_ordered_by_source_stride() {
        // u16 indices spaced 4 bytes apart in their source
        let strided = vec![0, 0, 9, 9, 1, 0, 9, 9, 2, 0, 9, 9];
        let mut accessors = vec![
            Accessor::from_f32(ElementType::Vec3, &[1.0, 2.0, 3.0]).with_target(Target::Vertex),
            Accessor::from_bytes(ElementType::Scalar, ComponentType::U16, 3, strided)
                .with_target(Target::Index)
                .with_stride(4),
        ];
        let mut packer = AccessorPacker::new();
        packer.pack_accessors(&mut accessors, "scene").unwrap().unwrap();

        let index_view = &packer.views()[1];
        assert_eq!(index_view.byte_stride, None);
        assert_eq!(index_view.stride(), 4);
        assert_eq!(index_view.byte_offset, 0);
        assert_eq!(packer.views()[0].byte_offset, 8);
        assert_eq!(packer.read_accessor(&accessors[1]).unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_unknown_view_is_rejected() {
        let mut packer = AccessorPacker::new();
        assert!(matches!(
            packer.merge_views(&[ViewIndex(3)], "scene"),
            Err(PackError::DanglingView(3))
        ));
    }
}
