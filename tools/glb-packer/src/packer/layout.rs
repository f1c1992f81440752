//! Byte layout of one (target, stride) group

use crate::buffer::Accessor;
use crate::error::{PackError, PackResult};

/// glTF limits vertex attribute strides to this range
pub(crate) const MAX_VERTEX_STRIDE: usize = 252;

pub(crate) fn align_up(offset: usize, alignment: usize) -> usize {
    match offset % alignment {
        0 => offset,
        rem => offset + alignment - rem,
    }
}

/// Placement of every member of a group inside its view
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupLayout {
    /// Byte offset of each member, in member order
    pub offsets: Vec<usize>,
    pub byte_length: usize,
    /// Distance between consecutive elements of every member; `None` means
    /// each member is tightly packed
    pub byte_stride: Option<usize>,
}

impl GroupLayout {
    /// Element distance in the packed view for a member
    pub fn element_stride(&self, accessor: &Accessor) -> usize {
        self.byte_stride.unwrap_or_else(|| accessor.element_size())
    }
}

/// Members back to back, each start rounded up to its component size
pub(crate) fn sequential(members: &[&Accessor]) -> GroupLayout {
    let mut offsets = Vec::with_capacity(members.len());
    let mut cursor = 0;
    for accessor in members {
        let offset = align_up(cursor, accessor.component_size());
        offsets.push(offset);
        cursor = offset + accessor.byte_length();
    }

    GroupLayout {
        offsets,
        byte_length: cursor,
        byte_stride: None,
    }
}

/// Members interleaved at `stride`.
///
/// Consecutive members with the same element count share a record while their
/// elements fit in one stride; each record occupies `count * stride` bytes and
/// starts aligned to the widest component it holds.
pub(crate) fn interleaved(members: &[&Accessor], stride: usize) -> PackResult<GroupLayout> {
    let mut offsets = vec![0; members.len()];
    let mut cursor = 0;
    let mut first = 0;

    while first < members.len() {
        let count = members[first].count;
        check_stride(members[first], stride)?;

        let mut record = vec![(first, 0)];
        let mut record_end = members[first].element_size();
        let mut alignment = members[first].component_size();

        let mut next = first + 1;
        while next < members.len() && members[next].count == count {
            let accessor = members[next];
            check_stride(accessor, stride)?;
            let offset = align_up(record_end, accessor.component_size());
            if offset + accessor.element_size() > stride {
                break;
            }
            record.push((next, offset));
            record_end = offset + accessor.element_size();
            alignment = alignment.max(accessor.component_size());
            next += 1;
        }

        let start = align_up(cursor, alignment);
        for (member, offset) in record {
            offsets[member] = start + offset;
        }
        cursor = start + count * stride;
        first = next;
    }

    Ok(GroupLayout {
        offsets,
        byte_length: cursor,
        byte_stride: Some(stride),
    })
}

fn check_stride(accessor: &Accessor, stride: usize) -> PackResult<()> {
    let reason = if accessor.element_size() > stride {
        "element is wider than the stride"
    } else if stride % 4 != 0 {
        "vertex strides must be a multiple of 4"
    } else if stride > MAX_VERTEX_STRIDE {
        "vertex strides are limited to 252 bytes"
    } else {
        return Ok(());
    };

    Err(PackError::InvalidStride {
        accessor: accessor.display_name().to_string(),
        stride,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ComponentType, ElementType};

    fn accessor(element_type: ElementType, component_type: ComponentType, count: usize) -> Accessor {
        let size = element_type.components() * component_type.byte_size() * count;
        Accessor::from_bytes(element_type, component_type, count, vec![0u8; size])
    }

    #[test]
    fn test_sequential_minimal_padding() {
        let a = accessor(ElementType::Vec3, ComponentType::F32, 3);
        let b = accessor(ElementType::Scalar, ComponentType::U16, 2);
        let c = accessor(ElementType::Vec4, ComponentType::F32, 1);

        let layout = sequential(&[&a, &b, &c]);
        assert_eq!(layout.offsets, vec![0, 36, 40]);
        assert_eq!(layout.byte_length, 56);
        assert_eq!(layout.byte_stride, None);
    }

    #[test]
    fn test_sequential_pads_to_component_size_only() {
        let a = accessor(ElementType::Scalar, ComponentType::U8, 3);
        let b = accessor(ElementType::Scalar, ComponentType::U16, 1);
        let c = accessor(ElementType::Scalar, ComponentType::U8, 1);
        let d = accessor(ElementType::Scalar, ComponentType::F32, 1);

        let layout = sequential(&[&a, &b, &c, &d]);
        // u8 x3 = 3, u16 at 4, u8 at 6, f32 at 8
        assert_eq!(layout.offsets, vec![0, 4, 6, 8]);
        assert_eq!(layout.byte_length, 12);
    }

    #[test]
    fn test_interleaved_shares_records() {
        let position = accessor(ElementType::Vec3, ComponentType::F32, 4);
        let uv = accessor(ElementType::Vec2, ComponentType::F32, 4);

        let layout = interleaved(&[&position, &uv], 20).unwrap();
        assert_eq!(layout.offsets, vec![0, 12]);
        assert_eq!(layout.byte_length, 80);
        assert_eq!(layout.byte_stride, Some(20));
    }

    #[test]
    fn test_interleaved_starts_new_record_when_full_or_count_differs() {
        let position = accessor(ElementType::Vec3, ComponentType::F32, 2);
        let normal = accessor(ElementType::Vec3, ComponentType::F32, 2);
        let other = accessor(ElementType::Vec3, ComponentType::F32, 1);

        let layout = interleaved(&[&position, &normal, &other], 12).unwrap();
        assert_eq!(layout.offsets, vec![0, 24, 48]);
        assert_eq!(layout.byte_length, 60);
    }

    #[test]
    fn test_interleaved_rejects_narrow_stride() {
        let position = accessor(ElementType::Vec3, ComponentType::F32, 2);
        assert!(matches!(
            interleaved(&[&position], 8),
            Err(PackError::InvalidStride { stride: 8, .. })
        ));
        assert!(interleaved(&[&position], 14).is_err());
    }
}
