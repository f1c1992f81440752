//! Integration tests for the export pipeline.
//!
//! Tests the complete flow:
//! 1. Build meshes with multiply-indexed streams and delta shapes
//! 2. Export through glb-packer
//! 3. Re-import with the gltf crate and validate the data

use gltf::json::validation::Checked;
use std::path::Path;
use tempfile::tempdir;

use glb_packer::{
    BufferNaming, ComponentType, ExportConfig, Exporter, MeshError, MeshInput, MeshShape,
    PackingStrategy, Semantic, ShapeStream, parse_glb,
};

const BASE_POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

const SMILE_POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.5],
    [0.0, 1.0, 0.5],
];

/// Quad whose corners are addressed through per-stream index tuples, with a
/// "smile" delta shape lifting the top edge.
fn face_quad(name: &str) -> MeshInput {
    let corners = [0, 1, 2, 0, 2, 3];
    let base = MeshShape::new(
        "face",
        vec![
            ShapeStream::dense(
                Semantic::Position,
                0,
                BASE_POSITIONS.concat(),
                &corners,
            ),
            ShapeStream::dense(Semantic::Normal, 0, vec![0.0, 0.0, 1.0], &[0; 6]),
            ShapeStream::dense(
                Semantic::Texcoord,
                0,
                vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
                &corners,
            ),
            ShapeStream::dense(Semantic::Tangent, 0, vec![1.0, 0.0, 0.0, -1.0], &[0; 6]),
        ],
    );
    let smile = MeshShape::new(
        "smile",
        vec![
            ShapeStream::dense(
                Semantic::Position,
                0,
                SMILE_POSITIONS.concat(),
                &corners,
            ),
            ShapeStream::dense(Semantic::Tangent, 0, vec![0.0, 1.0, 0.0], &[0; 6]),
        ],
    )
    .with_weight(0.25);

    MeshInput::new(name, base).with_delta(smile)
}

fn component_type(accessor: &gltf::json::Accessor) -> gltf::json::accessor::ComponentType {
    match accessor.component_type {
        Checked::Valid(gltf::json::accessor::GenericComponentType(component_type)) => component_type,
        Checked::Invalid => panic!("Invalid component type"),
    }
}

fn import(path: &Path) -> (gltf::Document, Vec<gltf::buffer::Data>) {
    let (document, buffers, _) = gltf::import(path).expect("Failed to import exported asset");
    (document, buffers)
}

/// Test GLB export and re-import with the gltf crate
#[test]
fn test_glb_round_trip() {
    let mut exporter = Exporter::new(ExportConfig::default());
    let summary = exporter.add_mesh(&face_quad("Face")).expect("Mesh conversion failed");
    assert_eq!(summary.vertices, 4);
    assert_eq!(summary.stats.welded, 2);

    let glb = exporter.finish().unwrap().to_glb().unwrap();
    let chunks = parse_glb(&glb).expect("Invalid container");
    assert_eq!(chunks.total_length, glb.len());
    assert_eq!(chunks.json.len() % 4, 0);
    assert_eq!(chunks.bin.map(|b| b.len() % 4), Some(0));

    let dir = tempdir().expect("Failed to create temp dir");
    let glb_path = dir.path().join("face.glb");
    std::fs::write(&glb_path, &glb).expect("Failed to write GLB");

    let (document, buffers) = import(&glb_path);
    assert_eq!(document.meshes().count(), 1);
    assert_eq!(document.buffers().count(), 1);
    assert_eq!(document.scenes().count(), 1);

    let mesh = document.meshes().next().unwrap();
    assert_eq!(mesh.name(), Some("Face"));
    assert_eq!(mesh.weights(), Some(&[0.25f32][..]));

    let primitive = mesh.primitives().next().unwrap();
    for semantic in [
        gltf::Semantic::Positions,
        gltf::Semantic::Normals,
        gltf::Semantic::TexCoords(0),
        gltf::Semantic::Tangents,
    ] {
        assert!(primitive.get(&semantic).is_some(), "Missing {:?}", semantic);
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
    let indices: Vec<u32> = reader.read_indices().unwrap().into_u32().collect();
    assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);

    let positions: Vec<[f32; 3]> = reader.read_positions().unwrap().collect();
    assert_eq!(positions, BASE_POSITIONS.to_vec());

    // base + delta reconstructs the delta shape
    let (deltas, _, tangent_deltas) = reader
        .read_morph_targets()
        .next()
        .expect("Missing morph target");
    let deltas: Vec<[f32; 3]> = deltas.expect("Missing POSITION delta").collect();
    for ((base, delta), target) in positions.iter().zip(&deltas).zip(&SMILE_POSITIONS) {
        for i in 0..3 {
            assert_eq!(base[i] + delta[i], target[i]);
        }
    }

    // tangent deltas cover the vector part only
    let tangent_deltas: Vec<[f32; 3]> = tangent_deltas.expect("Missing TANGENT delta").collect();
    assert_eq!(tangent_deltas[0], [-1.0, 1.0, 0.0]);
}

/// Test that every packed accessor is aligned to its component size
#[test]
fn test_accessor_alignment() {
    let config = ExportConfig {
        interleave: true,
        ..Default::default()
    };
    let mut exporter = Exporter::new(config);
    exporter.add_mesh(&face_quad("Face")).unwrap();
    let asset = exporter.finish().unwrap();

    for accessor in &asset.root().accessors {
        let component_size = component_type(accessor).size() as u64;
        let offset = accessor.byte_offset.map_or(0, |o| o.0);
        assert_eq!(offset % component_size, 0, "{:?} misaligned", accessor.name);
    }

    let vertex_view = asset
        .root()
        .buffer_views
        .iter()
        .find(|view| view.byte_stride.is_some())
        .expect("Missing interleaved view");
    // position 12 + normal 12 + texcoord 8 + tangent 16
    assert_eq!(vertex_view.byte_stride.map(|s| s.0), Some(48));

    let dir = tempdir().expect("Failed to create temp dir");
    let glb_path = dir.path().join("interleaved.glb");
    std::fs::write(&glb_path, asset.to_glb().unwrap()).unwrap();

    let (document, buffers) = import(&glb_path);
    let primitive = document.meshes().next().unwrap().primitives().next().unwrap();
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
    let uvs: Vec<[f32; 2]> = reader.read_tex_coords(0).unwrap().into_f32().collect();
    assert_eq!(uvs, vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
}

/// Test glTF + external buffers with one buffer per mesh
#[test]
fn test_gltf_per_reference_group() {
    let config = ExportConfig {
        name: "faces".to_string(),
        strategy: PackingStrategy::PerReferenceGroup,
        naming: BufferNaming::ContentHash,
        ..Default::default()
    };
    let mut exporter = Exporter::new(config);
    exporter.add_mesh(&face_quad("Left")).unwrap();
    exporter.add_mesh(&face_quad("Right")).unwrap();
    let asset = exporter.finish().unwrap();
    assert_eq!(asset.buffers().len(), 2);

    let files = asset.to_gltf().unwrap();
    let dir = tempdir().expect("Failed to create temp dir");
    for (uri, data) in &files.buffers {
        assert_eq!(uri.len(), 16 + 4);
        std::fs::write(dir.path().join(uri), data).unwrap();
    }
    let gltf_path = dir.path().join("faces.gltf");
    std::fs::write(&gltf_path, &files.json).unwrap();

    let (document, buffers) = import(&gltf_path);
    assert_eq!(document.meshes().count(), 2);
    assert_eq!(buffers.len(), 2);

    // identical meshes produce identical buffers
    assert_eq!(files.buffers[0].0, files.buffers[1].0);
    for mesh in document.meshes() {
        let primitive = mesh.primitives().next().unwrap();
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        assert_eq!(reader.read_positions().unwrap().count(), 4);
    }
}

/// Test that a topology mismatch only drops the offending mesh
#[test]
fn test_topology_mismatch_skips_mesh() {
    let mut broken = face_quad("Broken");
    broken.deltas[0].streams[0].indices.truncate(3);
    broken.deltas[0].streams[1].indices.truncate(3);

    let mut exporter = Exporter::new(ExportConfig::default());
    let error = exporter.add_mesh(&broken).unwrap_err();
    assert!(matches!(error, MeshError::TopologyMismatch { .. }));
    let message = error.to_string();
    assert!(message.contains("face") && message.contains("smile"), "{}", message);

    exporter.add_mesh(&face_quad("Face")).unwrap();
    let asset = exporter.finish().unwrap();
    assert_eq!(asset.root().meshes.len(), 1);
    assert_eq!(asset.root().meshes[0].name.as_deref(), Some("Face"));
}

/// Test that large meshes switch to 32-bit indices
#[test]
fn test_index_width() {
    // a strip of 70000 distinct vertices
    let count = 70_002usize;
    let positions: Vec<f32> = (0..count).flat_map(|i| [i as f32, (i % 2) as f32, 0.0]).collect();
    let corners: Vec<u32> = (0..count as u32 - 2).flat_map(|i| [i, i + 1, i + 2]).collect();
    let base = MeshShape::new(
        "strip",
        vec![ShapeStream::dense(Semantic::Position, 0, positions, &corners)],
    );

    let mut exporter = Exporter::new(ExportConfig::default());
    exporter.add_mesh(&MeshInput::new("Strip", base)).unwrap();
    let asset = exporter.finish().unwrap();

    let mesh = &asset.root().meshes[0];
    let indices = mesh.primitives[0].indices.unwrap();
    let accessor = &asset.root().accessors[indices.value()];
    assert_eq!(
        component_type(accessor),
        gltf::json::accessor::ComponentType::U32
    );
    assert_eq!(ComponentType::U32.byte_size(), 4);
}
