//! Mesh input: a base shape plus delta (morph target) shapes
//!
//! Every stream is multiply indexed: each primitive-vertex carries its own
//! index into each stream, and `None` marks the stream as absent for that
//! vertex (e.g. faces without UVs).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MeshError;
use crate::semantic::{Semantic, ShapeIndex};

/// One attribute stream of a shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeStream {
    pub semantic: Semantic,
    #[serde(default)]
    pub set: u32,
    /// Flat element components, `dimension` values per element
    pub components: Vec<f32>,
    /// One entry per primitive-vertex
    pub indices: Vec<Option<u32>>,
}

impl ShapeStream {
    pub fn new(
        semantic: Semantic,
        set: u32,
        components: Vec<f32>,
        indices: impl IntoIterator<Item = Option<u32>>,
    ) -> Self {
        Self {
            semantic,
            set,
            components,
            indices: indices.into_iter().collect(),
        }
    }

    /// Stream where every primitive-vertex has an index
    pub fn dense(semantic: Semantic, set: u32, components: Vec<f32>, indices: &[u32]) -> Self {
        Self::new(semantic, set, components, indices.iter().map(|i| Some(*i)))
    }

    /// Components of element `index`
    pub(crate) fn element(&self, index: u32, dimension: usize) -> &[f32] {
        let start = index as usize * dimension;
        &self.components[start..start + dimension]
    }
}

/// Named set of streams sharing one topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshShape {
    pub name: String,
    /// Initial morph weight (delta shapes only)
    #[serde(default)]
    pub weight: f32,
    pub streams: Vec<ShapeStream>,
}

impl MeshShape {
    pub fn new(name: impl Into<String>, streams: Vec<ShapeStream>) -> Self {
        Self {
            name: name.into(),
            weight: 0.0,
            streams,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Number of primitive-vertices, taken from `POSITION_0`
    pub fn primitive_vertex_count(&self) -> Result<usize, MeshError> {
        self.streams
            .iter()
            .find(|s| s.semantic == Semantic::Position && s.set == 0)
            .map(|s| s.indices.len())
            .ok_or_else(|| MeshError::MissingPositions {
                shape: self.name.clone(),
            })
    }

    /// Streams keyed by (semantic, set), in key order
    pub(crate) fn stream_table(&self) -> Result<BTreeMap<(Semantic, u32), &ShapeStream>, MeshError> {
        let mut table = BTreeMap::new();
        for stream in &self.streams {
            if table.insert((stream.semantic, stream.set), stream).is_some() {
                return Err(self.malformed(stream, "duplicate stream".to_string()));
            }
        }
        Ok(table)
    }

    fn validate(&self, shape: ShapeIndex, primitive_vertex_count: usize) -> Result<(), MeshError> {
        for stream in &self.streams {
            let dimension = stream.semantic.dimension(shape);
            if stream.components.len() % dimension != 0 {
                return Err(self.malformed(
                    stream,
                    format!(
                        "{} components is not a multiple of dimension {}",
                        stream.components.len(),
                        dimension
                    ),
                ));
            }
            if stream.indices.len() != primitive_vertex_count {
                return Err(self.malformed(
                    stream,
                    format!(
                        "{} indices, expected {}",
                        stream.indices.len(),
                        primitive_vertex_count
                    ),
                ));
            }

            let count = stream.components.len() / dimension;
            if let Some(index) = stream.indices.iter().flatten().find(|i| **i as usize >= count) {
                return Err(MeshError::IndexOutOfRange {
                    shape: self.name.clone(),
                    semantic: stream.semantic,
                    set: stream.set,
                    index: *index,
                    count,
                });
            }
        }
        Ok(())
    }

    fn malformed(&self, stream: &ShapeStream, reason: String) -> MeshError {
        MeshError::MalformedStream {
            shape: self.name.clone(),
            semantic: stream.semantic,
            set: stream.set,
            reason,
        }
    }
}

fn default_vertices_per_primitive() -> usize {
    3
}

/// A mesh ready for deduplication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshInput {
    pub name: String,
    pub base: MeshShape,
    #[serde(default)]
    pub deltas: Vec<MeshShape>,
    /// Shading group per primitive; negative means unassigned. Empty assigns
    /// every primitive to group 0.
    #[serde(default)]
    pub shading: Vec<i32>,
    #[serde(default = "default_vertices_per_primitive")]
    pub vertices_per_primitive: usize,
}

impl MeshInput {
    pub fn new(name: impl Into<String>, base: MeshShape) -> Self {
        Self {
            name: name.into(),
            base,
            deltas: Vec::new(),
            shading: Vec::new(),
            vertices_per_primitive: default_vertices_per_primitive(),
        }
    }

    pub fn with_delta(mut self, delta: MeshShape) -> Self {
        self.deltas.push(delta);
        self
    }

    pub fn with_shading(mut self, shading: Vec<i32>) -> Self {
        self.shading = shading;
        self
    }

    /// Shapes in slot order: base first, then deltas
    pub fn shapes(&self) -> impl Iterator<Item = (ShapeIndex, &MeshShape)> {
        std::iter::once((ShapeIndex::BASE, &self.base)).chain(
            self.deltas
                .iter()
                .enumerate()
                .map(|(i, shape)| (ShapeIndex::delta(i), shape)),
        )
    }

    pub fn primitive_count(&self) -> Result<usize, MeshError> {
        Ok(self.base.primitive_vertex_count()? / self.vertices_per_primitive.max(1))
    }

    /// Shading group of a primitive, `None` when unassigned
    pub fn shading_group(&self, primitive: usize) -> Option<u32> {
        if self.shading.is_empty() {
            return Some(0);
        }
        u32::try_from(self.shading[primitive]).ok()
    }

    /// Check stream shapes, index ranges and topology across shapes
    pub fn validate(&self) -> Result<(), MeshError> {
        let count = self.base.primitive_vertex_count()?;
        let vertices_per_primitive = self.vertices_per_primitive.max(1);

        if count % vertices_per_primitive != 0 {
            return Err(MeshError::MalformedStream {
                shape: self.base.name.clone(),
                semantic: Semantic::Position,
                set: 0,
                reason: format!(
                    "{} primitive-vertices is not a multiple of {} vertices per primitive",
                    count, vertices_per_primitive
                ),
            });
        }

        let primitive_count = count / vertices_per_primitive;
        if !self.shading.is_empty() && self.shading.len() != primitive_count {
            return Err(MeshError::ShadingTableLength {
                expected: primitive_count,
                actual: self.shading.len(),
            });
        }

        // A delta may omit any semantic, POSITION included, but every stream
        // it has must cover the base's primitive-vertices.
        for delta in &self.deltas {
            if delta.streams.iter().any(|stream| stream.indices.len() != count) {
                return Err(self.topology_mismatch(delta));
            }
        }

        for (index, shape) in self.shapes() {
            shape.validate(index, count)?;
        }
        Ok(())
    }

    fn topology_mismatch(&self, delta: &MeshShape) -> MeshError {
        MeshError::TopologyMismatch {
            base: self.base.name.clone(),
            delta: delta.name.clone(),
        }
    }
}
