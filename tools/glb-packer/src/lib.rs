//! Geometry deduplication and glTF buffer packing
//!
//! The pipeline runs strictly downstream:
//! - MeshRenderables: weld multiply-indexed vertex streams (base shape plus
//!   delta shapes) into one deduplicated vertex buffer per signature
//! - PrimitiveAssembler: turn vertex buffers into accessors
//! - AccessorPacker: lay out accessors per (target, stride) group and merge
//!   the views into final buffers
//! - GltfBuilder / container: emit the JSON document and the GLB container
//!
//! Exporter drives all of it for a list of meshes.
//!
//! # Example
//!
//! ```no_run
//! use glb_packer::*;
//!
//! let base = MeshShape::new(
//!     "base",
//!     vec![ShapeStream::dense(
//!         Semantic::Position,
//!         0,
//!         vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0],
//!         &[0, 1, 2],
//!     )],
//! );
//!
//! let mut exporter = Exporter::new(ExportConfig::default());
//! exporter.add_mesh(&MeshInput::new("Triangle", base))?;
//! let glb_bytes = exporter.finish()?.to_glb()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod container;
pub mod document;
pub mod error;
pub mod export;
pub mod packer;
pub mod primitive;
pub mod renderables;
pub mod semantic;
pub mod shape;

pub use buffer::{Accessor, AccessorIndex, Buffer, BufferIndex, BufferView, Target, ViewIndex};
pub use codec::{ComponentCodec, ComponentType, ElementCodec, ElementType, component_codec};
pub use config::{BufferNaming, ExportConfig, OutputFormat, PackingStrategy};
pub use container::{GlbChunks, assemble_glb, parse_glb, write_glb};
pub use document::GltfBuilder;
pub use error::{MeshError, PackError, PackResult};
pub use export::{ExportedAsset, Exporter, GltfFiles, MeshSummary};
pub use packer::AccessorPacker;
pub use primitive::{PrimitiveAccessors, PrimitiveAssembler, PrimitiveOptions, compute_bounds};
pub use renderables::{MeshRenderables, RenderableOptions, VertexBuffer, WeldStats};
pub use semantic::{AttributeSlot, Semantic, SemanticSet, ShapeIndex};
pub use shape::{MeshInput, MeshShape, ShapeStream};

// Re-export commonly used gltf-json types
pub use gltf_json as json;
