//! Export session: meshes in, glTF document and buffers out

use gltf_json as json;
use std::io::Write;
use tracing::{info, warn};

use crate::buffer::{Accessor, Buffer};
use crate::config::ExportConfig;
use crate::container::{assemble_glb, binary_payload, write_glb};
use crate::document::GltfBuilder;
use crate::error::{MeshError, PackResult};
use crate::packer::AccessorPacker;
use crate::primitive::{PrimitiveAccessors, PrimitiveAssembler, PrimitiveOptions};
use crate::renderables::{MeshRenderables, WeldStats};
use crate::shape::MeshInput;

const GENERATOR: &str = concat!("glb-packer ", env!("CARGO_PKG_VERSION"));

/// Result of converting one mesh
#[derive(Debug, Clone)]
pub struct MeshSummary {
    pub name: String,
    pub primitives: usize,
    pub vertices: usize,
    pub stats: WeldStats,
}

struct ExportedMesh {
    name: String,
    primitives: Vec<PrimitiveAccessors>,
    weights: Vec<f32>,
}

/// Accumulates meshes for one output asset
pub struct Exporter {
    config: ExportConfig,
    accessors: Vec<Accessor>,
    meshes: Vec<ExportedMesh>,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            accessors: Vec::new(),
            meshes: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn accessor_count(&self) -> usize {
        self.accessors.len()
    }

    /// Convert one mesh. On error nothing is recorded for the mesh and the
    /// export can continue with the next one.
    pub fn add_mesh(&mut self, mesh: &MeshInput) -> Result<MeshSummary, MeshError> {
        let renderables = MeshRenderables::new(mesh, &self.config.renderable_options())?;

        let options = PrimitiveOptions {
            force_32bit_indices: self.config.force_32bit_indices,
            interleave: self.config.interleave,
            assign_names: self.config.assign_names,
        };
        let mut assembler = PrimitiveAssembler::new(&mut self.accessors, options);

        let buffers: Vec<_> = renderables.buffers().iter().filter(|b| !b.is_empty()).collect();
        let mut primitives = Vec::with_capacity(buffers.len());
        for (i, buffer) in buffers.iter().enumerate() {
            let label = if buffers.len() == 1 {
                mesh.name.clone()
            } else {
                format!("{}#{}", mesh.name, i)
            };
            primitives.push(assembler.assemble(buffer, mesh.deltas.len(), &label, &mesh.name));
        }

        let summary = MeshSummary {
            name: mesh.name.clone(),
            primitives: primitives.len(),
            vertices: renderables.vertex_count(),
            stats: renderables.stats(),
        };

        if primitives.is_empty() {
            warn!("{}: no primitives left to export", mesh.name);
        } else {
            self.meshes.push(ExportedMesh {
                name: mesh.name.clone(),
                primitives,
                weights: mesh.deltas.iter().map(|d| d.weight).collect(),
            });
        }
        Ok(summary)
    }

    /// Pack every accessor and build the document
    pub fn finish(mut self) -> PackResult<ExportedAsset> {
        let mut packer = AccessorPacker::new()
            .with_names(self.config.assign_names)
            .with_naming(self.config.naming);
        packer.pack(&mut self.accessors, self.config.strategy, &self.config.name)?;

        let mut builder = GltfBuilder::new();
        let roots: Vec<u32> = self
            .meshes
            .iter()
            .map(|mesh| {
                let index = builder.add_mesh(&mesh.name, &mesh.primitives, &mesh.weights);
                builder.add_mesh_node(&mesh.name, index)
            })
            .collect();
        builder.add_scene(&self.config.name, &roots);

        let root = builder.build(&self.accessors, &packer, false, GENERATOR)?;
        let buffers = packer.into_buffers();
        info!(
            "{}: {} meshes, {} accessors, {} buffers ({} bytes)",
            self.config.name,
            root.meshes.len(),
            root.accessors.len(),
            buffers.len(),
            buffers.iter().map(Buffer::byte_length).sum::<usize>()
        );

        Ok(ExportedAsset { root, buffers })
    }
}

/// A `.gltf` document with its external buffer files
#[derive(Debug, Clone)]
pub struct GltfFiles<'a> {
    pub json: String,
    /// (uri, contents) per buffer
    pub buffers: Vec<(String, &'a [u8])>,
}

/// Finished asset
#[derive(Debug, Clone)]
pub struct ExportedAsset {
    root: json::Root,
    buffers: Vec<Buffer>,
}

impl ExportedAsset {
    pub fn root(&self) -> &json::Root {
        &self.root
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Document with buffer 0 referring to the BIN chunk
    fn embedded_root(&self) -> json::Root {
        let mut root = self.root.clone();
        for buffer in &mut root.buffers {
            buffer.uri = None;
        }
        root
    }

    pub fn to_glb(&self) -> PackResult<Vec<u8>> {
        assemble_glb(&self.embedded_root(), &self.buffers)
    }

    /// Stream the container into `sink`
    pub fn write_glb<W: Write>(&self, sink: &mut W) -> PackResult<usize> {
        let payload = binary_payload(&self.buffers)?;
        let json_string = json::serialize::to_string(&self.embedded_root())?;
        write_glb(json_string.as_bytes(), payload.map(Buffer::data), sink)
    }

    pub fn to_gltf(&self) -> PackResult<GltfFiles<'_>> {
        let json = json::serialize::to_string_pretty(&self.root)?;
        let buffers = self
            .buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| {
                let uri = buffer.uri.clone().unwrap_or_else(|| format!("buffer_{}.bin", i));
                (uri, buffer.data())
            })
            .collect();
        Ok(GltfFiles { json, buffers })
    }
}
