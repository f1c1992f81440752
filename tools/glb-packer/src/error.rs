//! Error types for the export pipeline
//!
//! Errors are split by blast radius: a [`MeshError`] only invalidates the mesh
//! being converted, a [`PackError`] aborts the whole export.

use crate::semantic::Semantic;

/// Mesh-local failure. The exporter skips the mesh and continues.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Delta shape '{delta}' has different topology from base shape '{base}'")]
    TopologyMismatch { base: String, delta: String },

    #[error("Shape '{shape}' has no POSITION stream")]
    MissingPositions { shape: String },

    #[error("Shape '{shape}' {semantic}_{set}: {reason}")]
    MalformedStream {
        shape: String,
        semantic: Semantic,
        set: u32,
        reason: String,
    },

    #[error("Shape '{shape}' {semantic}_{set}: index {index} out of range (element count {count})")]
    IndexOutOfRange {
        shape: String,
        semantic: Semantic,
        set: u32,
        index: u32,
        count: usize,
    },

    #[error("Shading table has {actual} entries, expected one per primitive ({expected})")]
    ShadingTableLength { expected: usize, actual: usize },
}

/// Unrecoverable failure inside the byte layout, merge or container stages.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("Failed to allocate {bytes} bytes of buffer storage")]
    Allocation { bytes: usize },

    #[error("Accessor '{accessor}' cannot be packed at byte stride {stride}: {reason}")]
    InvalidStride {
        accessor: String,
        stride: usize,
        reason: &'static str,
    },

    #[error("Accessor '{accessor}' reads past the end of its source data ({needed} > {available} bytes)")]
    SourceOutOfBounds {
        accessor: String,
        needed: usize,
        available: usize,
    },

    #[error("Buffer view {0} does not reference live storage")]
    DanglingView(usize),

    #[error("Buffer view {0} was never merged into a buffer")]
    UnmergedView(usize),

    #[error("A GLB container holds at most one binary buffer, got {0} non-empty buffers")]
    MultipleBinaryBuffers(usize),

    #[error("GLB container of {0} bytes exceeds the 32-bit length field")]
    ContainerTooLarge(usize),

    #[error("Component type {0:?} cannot be written to a glTF 2.0 document")]
    UnsupportedComponentType(crate::codec::ComponentType),

    #[error("Invalid GLB container: {0}")]
    InvalidContainer(&'static str),

    #[error("Failed to serialize glTF JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
