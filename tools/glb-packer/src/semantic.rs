//! Vertex attribute semantics and attribute slots

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{ComponentType, ElementType};

/// Vertex attribute semantic, in the fixed order used to build vertex keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Semantic {
    Position,
    Normal,
    Color,
    Texcoord,
    Tangent,
    Weights,
    Joints,
}

impl Semantic {
    pub const COUNT: usize = 7;

    pub const ALL: [Semantic; Self::COUNT] = [
        Semantic::Position,
        Semantic::Normal,
        Semantic::Color,
        Semantic::Texcoord,
        Semantic::Tangent,
        Semantic::Weights,
        Semantic::Joints,
    ];

    /// Semantics that glTF morph targets can displace
    pub const MORPH: [Semantic; 3] = [Semantic::Position, Semantic::Normal, Semantic::Tangent];

    pub fn name(self) -> &'static str {
        match self {
            Semantic::Position => "POSITION",
            Semantic::Normal => "NORMAL",
            Semantic::Color => "COLOR",
            Semantic::Texcoord => "TEXCOORD",
            Semantic::Tangent => "TANGENT",
            Semantic::Weights => "WEIGHTS",
            Semantic::Joints => "JOINTS",
        }
    }

    /// Number of components per element.
    ///
    /// Tangents carry a handedness sign in `w` on the base shape only; delta
    /// shapes store the 3D vector.
    pub fn dimension(self, shape: ShapeIndex) -> usize {
        match self {
            Semantic::Position | Semantic::Normal => 3,
            Semantic::Texcoord => 2,
            Semantic::Color | Semantic::Weights | Semantic::Joints => 4,
            Semantic::Tangent if shape.is_delta() => 3,
            Semantic::Tangent => 4,
        }
    }

    pub fn component_type(self) -> ComponentType {
        match self {
            Semantic::Joints => ComponentType::U16,
            _ => ComponentType::F32,
        }
    }

    pub fn element_type(self, shape: ShapeIndex) -> ElementType {
        match self.dimension(shape) {
            2 => ElementType::Vec2,
            3 => ElementType::Vec3,
            _ => ElementType::Vec4,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape a stream belongs to: 0 is the base mesh, 1.. are delta (morph) shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeIndex(pub u32);

impl ShapeIndex {
    pub const BASE: ShapeIndex = ShapeIndex(0);

    pub fn delta(index: usize) -> Self {
        ShapeIndex(index as u32 + 1)
    }

    pub fn is_delta(self) -> bool {
        self.0 > 0
    }

    /// Slot of this shape for a semantic/set pair
    pub fn slot(self, semantic: Semantic, set: u32) -> AttributeSlot {
        AttributeSlot::new(self, semantic, set)
    }

    /// Position of the delta shape in the mesh's delta list
    pub fn delta_index(self) -> Option<usize> {
        self.0.checked_sub(1).map(|i| i as usize)
    }
}

/// One attribute stream of a mesh: (shape, semantic, set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeSlot {
    pub shape: ShapeIndex,
    pub semantic: Semantic,
    pub set: u32,
}

impl AttributeSlot {
    pub fn new(shape: ShapeIndex, semantic: Semantic, set: u32) -> Self {
        Self {
            shape,
            semantic,
            set,
        }
    }

    pub fn dimension(&self) -> usize {
        self.semantic.dimension(self.shape)
    }

    /// The base-shape slot a delta slot is measured against
    pub fn base_slot(&self) -> AttributeSlot {
        AttributeSlot::new(ShapeIndex::BASE, self.semantic, self.set)
    }

    /// glTF attribute name, e.g. `TEXCOORD_1` or `POSITION`
    pub fn attribute_name(&self) -> String {
        match self.semantic {
            Semantic::Position | Semantic::Normal | Semantic::Tangent => {
                self.semantic.name().to_string()
            }
            _ => format!("{}_{}", self.semantic.name(), self.set),
        }
    }
}

impl fmt::Display for AttributeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape{}/{}_{}", self.shape.0, self.semantic, self.set)
    }
}

/// Set of semantics, serialized as a list of names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Semantic>", into = "Vec<Semantic>")]
pub struct SemanticSet(u8);

impl SemanticSet {
    pub const fn empty() -> Self {
        SemanticSet(0)
    }

    pub fn all() -> Self {
        Semantic::ALL.into_iter().collect()
    }

    pub fn morph() -> Self {
        Semantic::MORPH.into_iter().collect()
    }

    pub fn contains(&self, semantic: Semantic) -> bool {
        self.0 & semantic.bit() != 0
    }

    pub fn insert(&mut self, semantic: Semantic) {
        self.0 |= semantic.bit();
    }

    pub fn remove(&mut self, semantic: Semantic) {
        self.0 &= !semantic.bit();
    }
}

impl FromIterator<Semantic> for SemanticSet {
    fn from_iter<I: IntoIterator<Item = Semantic>>(iter: I) -> Self {
        let mut set = SemanticSet::empty();
        for semantic in iter {
            set.insert(semantic);
        }
        set
    }
}

impl From<Vec<Semantic>> for SemanticSet {
    fn from(semantics: Vec<Semantic>) -> Self {
        semantics.into_iter().collect()
    }
}

impl From<SemanticSet> for Vec<Semantic> {
    fn from(set: SemanticSet) -> Self {
        Semantic::ALL
            .into_iter()
            .filter(|s| set.contains(*s))
            .collect()
    }
}
