//! GLTF document construction

use gltf_json as json;
use gltf_json::validation::Checked::Valid;
use std::collections::BTreeMap;

use crate::buffer::{Accessor, Buffer, BufferView};
use crate::error::{PackError, PackResult};
use crate::packer::AccessorPacker;
use crate::primitive::PrimitiveAccessors;
use crate::semantic::{AttributeSlot, Semantic};

fn attribute_semantic(slot: &AttributeSlot) -> json::mesh::Semantic {
    use json::mesh::Semantic as Json;
    match slot.semantic {
        Semantic::Position => Json::Positions,
        Semantic::Normal => Json::Normals,
        Semantic::Tangent => Json::Tangents,
        Semantic::Color => Json::Colors(slot.set),
        Semantic::Texcoord => Json::TexCoords(slot.set),
        Semantic::Joints => Json::Joints(slot.set),
        Semantic::Weights => Json::Weights(slot.set),
    }
}

fn bounds_json(values: &Option<Vec<f64>>) -> Option<json::Value> {
    values
        .as_ref()
        .map(|v| json::Value::Array(v.iter().copied().map(json::Value::from).collect()))
}

fn accessor_json(accessor: &Accessor) -> PackResult<json::Accessor> {
    Ok(json::Accessor {
        buffer_view: accessor
            .buffer_view
            .map(|view| json::Index::new(view.0 as u32)),
        byte_offset: accessor
            .buffer_view
            .map(|_| (accessor.byte_offset as u64).into()),
        count: accessor.count.into(),
        component_type: Valid(json::accessor::GenericComponentType(
            accessor.component_type.to_json()?,
        )),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(accessor.element_type.to_json()),
        min: bounds_json(&accessor.min),
        max: bounds_json(&accessor.max),
        name: accessor.name.clone(),
        normalized: accessor.normalized,
        sparse: None,
    })
}

fn view_json(index: usize, view: &BufferView) -> PackResult<json::buffer::View> {
    let buffer = view.buffer().ok_or(PackError::UnmergedView(index))?;
    Ok(json::buffer::View {
        buffer: json::Index::new(buffer.0 as u32),
        byte_length: view.byte_length.into(),
        byte_offset: Some((view.byte_offset as u64).into()),
        byte_stride: view.byte_stride.map(json::buffer::Stride),
        extensions: Default::default(),
        extras: Default::default(),
        name: view.name.clone(),
        target: view.target.map(|t| Valid(t.to_json())),
    })
}

fn buffer_json(buffer: &Buffer, embedded: bool) -> json::Buffer {
    json::Buffer {
        byte_length: buffer.byte_length().into(),
        extensions: Default::default(),
        extras: Default::default(),
        name: buffer.name.clone(),
        uri: if embedded { None } else { buffer.uri.clone() },
    }
}

/// Nodes, meshes and scenes of one document; accessors, views and buffers
/// come from the packer at [`build`](Self::build) time
#[derive(Default)]
pub struct GltfBuilder {
    nodes: Vec<json::Node>,
    meshes: Vec<json::Mesh>,
    scenes: Vec<json::Scene>,
}

fn primitive_json(primitive: &PrimitiveAccessors) -> json::mesh::Primitive {
    let attributes: BTreeMap<_, _> = primitive
        .attributes
        .iter()
        .map(|(slot, index)| (Valid(attribute_semantic(slot)), index.as_json_index()))
        .collect();

    let targets: Vec<json::mesh::MorphTarget> = primitive
        .targets
        .iter()
        .map(|target| {
            let find = |semantic: Semantic| {
                target
                    .iter()
                    .find(|(s, _)| *s == semantic)
                    .map(|(_, index)| index.as_json_index())
            };
            json::mesh::MorphTarget {
                positions: find(Semantic::Position),
                normals: find(Semantic::Normal),
                tangents: find(Semantic::Tangent),
            }
        })
        .collect();

    json::mesh::Primitive {
        attributes,
        extensions: Default::default(),
        extras: Default::default(),
        indices: Some(primitive.indices.as_json_index()),
        material: None,
        mode: Valid(json::mesh::Mode::Triangles),
        targets: (!targets.is_empty()).then_some(targets),
    }
}

impl GltfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh with one triangle primitive per vertex buffer
    pub fn add_mesh(
        &mut self,
        name: &str,
        primitives: &[PrimitiveAccessors],
        weights: &[f32],
    ) -> json::Index<json::Mesh> {
        self.meshes.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(name.to_string()),
            primitives: primitives.iter().map(primitive_json).collect(),
            weights: (!weights.is_empty()).then(|| weights.to_vec()),
        });
        json::Index::new(self.meshes.len() as u32 - 1)
    }

    /// Add a node instancing `mesh`, returning the node index
    pub fn add_mesh_node(&mut self, name: &str, mesh: json::Index<json::Mesh>) -> u32 {
        self.nodes.push(json::Node {
            camera: None,
            children: None,
            extensions: Default::default(),
            extras: Default::default(),
            matrix: None,
            mesh: Some(mesh),
            name: Some(name.to_string()),
            rotation: None,
            scale: None,
            skin: None,
            translation: None,
            weights: None,
        });
        self.nodes.len() as u32 - 1
    }

    pub fn add_scene(&mut self, name: &str, root_nodes: &[u32]) {
        self.scenes.push(json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(name.to_string()),
            nodes: root_nodes.iter().map(|n| json::Index::new(*n)).collect(),
        });
    }

    /// Assemble the document. The first scene becomes the default scene.
    ///
    /// With `embedded`, buffer URIs are left out so buffer 0 refers to the
    /// container's BIN chunk.
    pub fn build(
        self,
        accessors: &[Accessor],
        packer: &AccessorPacker,
        embedded: bool,
        generator: &str,
    ) -> PackResult<json::Root> {
        let accessors = accessors
            .iter()
            .map(accessor_json)
            .collect::<PackResult<Vec<_>>>()?;
        let buffer_views = packer
            .views()
            .iter()
            .enumerate()
            .map(|(i, view)| view_json(i, view))
            .collect::<PackResult<Vec<_>>>()?;
        let buffers = packer
            .buffers()
            .iter()
            .map(|buffer| buffer_json(buffer, embedded))
            .collect();

        Ok(json::Root {
            accessors,
            asset: json::Asset {
                copyright: None,
                extensions: Default::default(),
                extras: Default::default(),
                generator: Some(generator.to_string()),
                min_version: None,
                version: "2.0".to_string(),
            },
            buffers,
            buffer_views,
            meshes: self.meshes,
            nodes: self.nodes,
            scene: (!self.scenes.is_empty()).then(|| json::Index::new(0)),
            scenes: self.scenes,
            ..Default::default()
        })
    }
}
