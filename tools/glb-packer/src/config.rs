//! Export configuration (`export.toml`)

use serde::{Deserialize, Serialize};

use crate::renderables::RenderableOptions;
use crate::semantic::SemanticSet;

/// How packed views are distributed over buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingStrategy {
    /// Every view merged into one buffer
    #[default]
    Single,
    /// One buffer per (target, stride) group
    PerGroup,
    /// One buffer per accessor
    PerAccessor,
    /// One buffer per accessor reference group label
    PerReferenceGroup,
}

/// Buffer URI policy for external `.bin` files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferNaming {
    /// `<name>.bin`
    #[default]
    Readable,
    /// `<xxh3-64 of the contents>.bin`
    ContentHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single binary container
    #[default]
    Glb,
    /// JSON document plus external buffers
    Gltf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Glb => "glb",
            OutputFormat::Gltf => "gltf",
        }
    }
}

fn default_name() -> String {
    "scene".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mesh_semantics() -> SemanticSet {
    SemanticSet::all()
}

fn default_morph_semantics() -> SemanticSet {
    SemanticSet::morph()
}

/// Export settings; every field is optional in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Asset name, also used for buffer and view names
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub strategy: PackingStrategy,
    #[serde(default)]
    pub naming: BufferNaming,
    /// Name views and accessors
    #[serde(default = "default_true")]
    pub assign_names: bool,
    #[serde(default)]
    pub force_32bit_indices: bool,
    /// Interleave base-shape attributes into one strided vertex view
    #[serde(default)]
    pub interleave: bool,
    /// Semantics exported for the base shape
    #[serde(default = "default_mesh_semantics")]
    pub mesh_semantics: SemanticSet,
    /// Semantics exported for delta shapes
    #[serde(default = "default_morph_semantics")]
    pub morph_semantics: SemanticSet,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            strategy: PackingStrategy::default(),
            naming: BufferNaming::default(),
            assign_names: true,
            force_32bit_indices: false,
            interleave: false,
            mesh_semantics: default_mesh_semantics(),
            morph_semantics: default_morph_semantics(),
            format: OutputFormat::default(),
        }
    }
}

impl ExportConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn renderable_options(&self) -> RenderableOptions {
        RenderableOptions {
            mesh_semantics: self.mesh_semantics,
            morph_semantics: self.morph_semantics,
        }
    }
}
