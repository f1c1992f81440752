//! glb-export - pack mesh scenes into glTF assets
//!
//! Reads a JSON scene of multiply-indexed meshes, deduplicates vertices and
//! writes a `.glb` container or a `.gltf` document with external buffers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use glb_packer::{
    BufferNaming, ExportConfig, Exporter, MeshInput, MeshRenderables, OutputFormat,
    PackingStrategy, parse_glb,
};

#[derive(Parser)]
#[command(name = "glb-export")]
#[command(about = "Pack mesh scenes into glTF assets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene file
    Export {
        /// Input scene (JSON)
        scene: PathBuf,

        /// Output file (default: scene path with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to export.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (overrides config)
        #[arg(short, long)]
        format: Option<Format>,

        /// Buffer packing strategy (overrides config)
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Buffer URI naming (overrides config)
        #[arg(short, long)]
        naming: Option<Naming>,

        /// Always write 32-bit indices
        #[arg(long)]
        force_32bit_indices: bool,

        /// Interleave base-shape attributes
        #[arg(long)]
        interleave: bool,
    },

    /// Deduplicate a scene without writing anything
    Check {
        /// Input scene (JSON)
        scene: PathBuf,

        /// Path to export.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the framing of a .glb file
    Inspect {
        /// Input .glb file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Glb,
    Gltf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Single,
    PerGroup,
    PerAccessor,
    PerReferenceGroup,
}

#[derive(Clone, Copy, ValueEnum)]
enum Naming {
    Readable,
    ContentHash,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Glb => OutputFormat::Glb,
            Format::Gltf => OutputFormat::Gltf,
        }
    }
}

impl From<Strategy> for PackingStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Single => PackingStrategy::Single,
            Strategy::PerGroup => PackingStrategy::PerGroup,
            Strategy::PerAccessor => PackingStrategy::PerAccessor,
            Strategy::PerReferenceGroup => PackingStrategy::PerReferenceGroup,
        }
    }
}

impl From<Naming> for BufferNaming {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Readable => BufferNaming::Readable,
            Naming::ContentHash => BufferNaming::ContentHash,
        }
    }
}

/// Scene file contents
#[derive(Deserialize)]
struct SceneInput {
    meshes: Vec<MeshInput>,
}

fn load_scene(path: &Path) -> Result<SceneInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse scene: {:?}", path))
}

fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    let Some(path) = path else {
        return Ok(ExportConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    ExportConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config: {:?}", path))
}

fn export(scene_path: &Path, output: Option<PathBuf>, config: ExportConfig) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let format = config.format;
    let output = output.unwrap_or_else(|| scene_path.with_extension(format.extension()));
    tracing::info!("Exporting {:?} -> {:?}", scene_path, output);

    let mut exporter = Exporter::new(config);
    for mesh in &scene.meshes {
        match exporter.add_mesh(mesh) {
            Ok(summary) => tracing::info!(
                "  {}: {} primitives, {} vertices ({} welded)",
                summary.name,
                summary.primitives,
                summary.vertices,
                summary.stats.welded
            ),
            Err(e) => tracing::warn!("  Skipping mesh '{}': {}", mesh.name, e),
        }
    }
    if exporter.mesh_count() == 0 {
        anyhow::bail!("No meshes left to export in {:?}", scene_path);
    }

    let asset = exporter.finish()?;

    match format {
        OutputFormat::Glb => {
            let file = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {:?}", output))?;
            let mut writer = BufWriter::new(file);
            let written = asset.write_glb(&mut writer)?;
            writer.flush()?;
            tracing::info!("Wrote {} bytes", written);
        }
        OutputFormat::Gltf => {
            let files = asset.to_gltf()?;
            let dir = output.parent().unwrap_or_else(|| Path::new("."));
            for (uri, data) in &files.buffers {
                let path = dir.join(uri);
                std::fs::write(&path, data)
                    .with_context(|| format!("Failed to write buffer: {:?}", path))?;
            }
            std::fs::write(&output, &files.json)
                .with_context(|| format!("Failed to write document: {:?}", output))?;
            tracing::info!("Wrote document and {} buffers", files.buffers.len());
        }
    }
    Ok(())
}

fn check(scene_path: &Path, config: &ExportConfig) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let options = config.renderable_options();

    let mut failed = 0;
    for mesh in &scene.meshes {
        match MeshRenderables::new(mesh, &options) {
            Ok(renderables) => {
                let stats = renderables.stats();
                tracing::info!(
                    "  {}: {} buffers, {} vertices from {} primitive-vertices, {} unassigned primitives",
                    mesh.name,
                    renderables.buffers().len(),
                    renderables.vertex_count(),
                    stats.primitive_vertices,
                    stats.unassigned_primitives
                );
            }
            Err(e) => {
                tracing::error!("  {}: {}", mesh.name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} meshes failed", failed, scene.meshes.len());
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let chunks = parse_glb(&bytes).with_context(|| format!("Invalid container: {:?}", path))?;

    println!("{}", path.display());
    println!("  version:      {}", chunks.version);
    println!("  total length: {}", chunks.total_length);
    println!("  JSON chunk:   {} bytes", chunks.json.len());
    match chunks.bin {
        Some(bin) => println!("  BIN chunk:    {} bytes", bin.len()),
        None => println!("  BIN chunk:    none"),
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            scene,
            output,
            config,
            format,
            strategy,
            naming,
            force_32bit_indices,
            interleave,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(format) = format {
                config.format = format.into();
            }
            if let Some(strategy) = strategy {
                config.strategy = strategy.into();
            }
            if let Some(naming) = naming {
                config.naming = naming.into();
            }
            config.force_32bit_indices |= force_32bit_indices;
            config.interleave |= interleave;

            export(&scene, output, config)?;
            tracing::info!("Done!");
        }

        Commands::Check { scene, config } => {
            tracing::info!("Checking {:?}", scene);
            let config = load_config(config.as_deref())?;
            check(&scene, &config)?;
            tracing::info!("Scene is valid!");
        }

        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}
