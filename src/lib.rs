//! SWC transform plugin that swaps the classes bound in Angular-style
//! `@Component` / `@Directive` `providers` metadata for custom layer
//! implementations, importing each replacement where it is used.

use swc_core::{
    ecma::ast::Program,
    plugin::{
        metadata::TransformPluginMetadataContextKind, plugin_transform,
        proxies::TransformPluginProgramMetadata,
    },
};

mod config;
mod transform;

pub use config::{
    ConfigError, CustomLayerConfig, ReplacementDefinition, ReplacementSpec, ReplacementTable,
    ReplacementTarget,
};
pub use transform::{rewrite_program, CustomLayerTransform, RewriteOutcome, Substitution};

// -----------------------------------------------------------------------------
// Filename & config helpers
// -----------------------------------------------------------------------------

/// Normalize bundler style filenames for diagnostics.
fn normalize_filename(filename: &str) -> String {
    let s = filename.replace('\\', "/");
    if let Some(rest) = s.strip_prefix("file:///") {
        return rest.to_string();
    }
    if let Some(rest) = s.strip_prefix("file://") {
        return rest.to_string();
    }
    s
}

fn load_config(raw: Option<String>) -> CustomLayerConfig {
    let Some(raw) = raw else {
        return CustomLayerConfig::default();
    };
    CustomLayerConfig::from_json(&raw).unwrap_or_else(|err| {
        tracing::warn!(target: "custom_layer", %err, "ignoring custom layer configuration");
        CustomLayerConfig::default()
    })
}

// -----------------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------------

#[plugin_transform]
pub fn process_transform(program: Program, metadata: TransformPluginProgramMetadata) -> Program {
    let config = load_config(metadata.get_transform_plugin_config());
    let file_name = metadata
        .get_context(&TransformPluginMetadataContextKind::Filename)
        .map(|f| normalize_filename(&f))
        .unwrap_or_else(|| "unknown".to_string());

    rewrite_program(program, &config, &file_name).program
}
