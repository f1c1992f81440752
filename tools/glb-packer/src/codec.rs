//! Element codecs: read and write accessor elements as raw float components
//!
//! Every accessor element is moved through the same generic path regardless of
//! how its components are stored. A [`ComponentCodec`] handles one storage type
//! and is selected by [`ComponentType`] tag; an [`ElementCodec`] pairs it with
//! the element arity.
//!
//! Components travel as `f64`, which represents every 8/16/32-bit integer and
//! every `f32` exactly, so decoding what was encoded is bit-identical.

use gltf_json as json;
use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};

/// Component storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ComponentType {
    /// Size of one component in bytes, which is also its alignment
    pub fn byte_size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::I32 | ComponentType::U32 | ComponentType::F32 => 4,
        }
    }

    pub fn to_json(self) -> PackResult<json::accessor::ComponentType> {
        use json::accessor::ComponentType as Json;
        Ok(match self {
            ComponentType::I8 => Json::I8,
            ComponentType::U8 => Json::U8,
            ComponentType::I16 => Json::I16,
            ComponentType::U16 => Json::U16,
            ComponentType::U32 => Json::U32,
            ComponentType::F32 => Json::F32,
            ComponentType::I32 => return Err(PackError::UnsupportedComponentType(self)),
        })
    }
}

/// Element arity (glTF accessor `type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    pub fn components(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 | ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }

    pub fn to_json(self) -> json::accessor::Type {
        use json::accessor::Type;
        match self {
            ElementType::Scalar => Type::Scalar,
            ElementType::Vec2 => Type::Vec2,
            ElementType::Vec3 => Type::Vec3,
            ElementType::Vec4 => Type::Vec4,
            ElementType::Mat2 => Type::Mat2,
            ElementType::Mat3 => Type::Mat3,
            ElementType::Mat4 => Type::Mat4,
        }
    }
}

/// Reads and writes a single little-endian component
pub trait ComponentCodec: Sync {
    fn component_type(&self) -> ComponentType;

    fn read(&self, bytes: &[u8]) -> f64;

    /// Values outside the storage range saturate.
    fn write(&self, value: f64, bytes: &mut [u8]);
}

macro_rules! component_codec {
    ($codec:ident, $ty:ty, $tag:ident) => {
        struct $codec;

        impl ComponentCodec for $codec {
            fn component_type(&self) -> ComponentType {
                ComponentType::$tag
            }

            fn read(&self, bytes: &[u8]) -> f64 {
                let mut raw = [0u8; size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw) as f64
            }

            fn write(&self, value: f64, bytes: &mut [u8]) {
                bytes[..size_of::<$ty>()].copy_from_slice(&(value as $ty).to_le_bytes());
            }
        }
    };
}

component_codec!(I8Codec, i8, I8);
component_codec!(U8Codec, u8, U8);
component_codec!(I16Codec, i16, I16);
component_codec!(U16Codec, u16, U16);
component_codec!(I32Codec, i32, I32);
component_codec!(U32Codec, u32, U32);
component_codec!(F32Codec, f32, F32);

/// Select the component codec for a storage tag
pub fn component_codec(component_type: ComponentType) -> &'static dyn ComponentCodec {
    match component_type {
        ComponentType::I8 => &I8Codec,
        ComponentType::U8 => &U8Codec,
        ComponentType::I16 => &I16Codec,
        ComponentType::U16 => &U16Codec,
        ComponentType::I32 => &I32Codec,
        ComponentType::U32 => &U32Codec,
        ComponentType::F32 => &F32Codec,
    }
}

/// Reads and writes whole elements of one accessor
#[derive(Clone, Copy)]
pub struct ElementCodec {
    element_type: ElementType,
    component: &'static dyn ComponentCodec,
}

impl ElementCodec {
    pub fn new(element_type: ElementType, component_type: ComponentType) -> Self {
        Self {
            element_type,
            component: component_codec(component_type),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn component_type(&self) -> ComponentType {
        self.component.component_type()
    }

    pub fn components(&self) -> usize {
        self.element_type.components()
    }

    pub fn element_size(&self) -> usize {
        self.components() * self.component_type().byte_size()
    }

    /// Decode one element from `bytes` into `out[..components]`
    pub fn read_element(&self, bytes: &[u8], out: &mut [f64]) {
        let size = self.component_type().byte_size();
        for (i, value) in out[..self.components()].iter_mut().enumerate() {
            *value = self.component.read(&bytes[i * size..]);
        }
    }

    /// Encode `components` as one element into `bytes`
    pub fn write_element(&self, components: &[f64], bytes: &mut [u8]) {
        let size = self.component_type().byte_size();
        for (i, value) in components[..self.components()].iter().enumerate() {
            self.component.write(*value, &mut bytes[i * size..]);
        }
    }
}

impl std::fmt::Debug for ElementCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementCodec")
            .field("element_type", &self.element_type)
            .field("component_type", &self.component_type())
            .finish()
    }
}
