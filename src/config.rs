use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid custom layer configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("`{field}` must be a plain identifier, got {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("replacement for `{replace}` has an empty import path")]
    EmptyModulePath { replace: String },
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is a valid regex")
    })
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if identifier_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

// -----------------------------------------------------------------------------
// Replacement table
// -----------------------------------------------------------------------------

/// One substitution rule: bindings implemented by `original` get
/// `replacement_class`, imported from `module_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementSpec {
    pub original: String,
    pub replacement_class: String,
    pub module_path: String,
}

/// Read-only lookup from an original class name to its replacement.
///
/// When two specs share an `original`, the first one is kept.
#[derive(Debug, Clone, Default)]
pub struct ReplacementTable {
    by_original: HashMap<String, ReplacementSpec>,
}

impl ReplacementTable {
    pub fn new(specs: impl IntoIterator<Item = ReplacementSpec>) -> Self {
        let mut by_original: HashMap<String, ReplacementSpec> = HashMap::new();
        for spec in specs {
            if let Some(kept) = by_original.get(&spec.original) {
                tracing::warn!(
                    target: "custom_layer",
                    original = %spec.original,
                    kept = %kept.replacement_class,
                    ignored = %spec.replacement_class,
                    "duplicate custom layer replacement, keeping the first definition"
                );
                continue;
            }
            by_original.insert(spec.original.clone(), spec);
        }
        Self { by_original }
    }

    pub fn get(&self, original: &str) -> Option<&ReplacementSpec> {
        self.by_original.get(original)
    }

    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }
}

// -----------------------------------------------------------------------------
// Plugin configuration
// -----------------------------------------------------------------------------

/// `{ "replace": "Service1", "with": { "className": "Service2", "import": "./service2" } }`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacementDefinition {
    pub replace: String,
    pub with: ReplacementTarget,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplacementTarget {
    pub class_name: String,
    pub import: String,
}

impl TryFrom<ReplacementDefinition> for ReplacementSpec {
    type Error = ConfigError;

    fn try_from(def: ReplacementDefinition) -> Result<Self, Self::Error> {
        check_identifier("replace", &def.replace)?;
        check_identifier("with.className", &def.with.class_name)?;
        if def.with.import.trim().is_empty() {
            return Err(ConfigError::EmptyModulePath {
                replace: def.replace,
            });
        }
        Ok(ReplacementSpec {
            original: def.replace,
            replacement_class: def.with.class_name,
            module_path: def.with.import,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    replacements: Vec<ReplacementDefinition>,
    #[serde(default = "default_decorators")]
    decorators: Vec<String>,
    #[serde(default = "default_bind_key")]
    bind_key: String,
    #[serde(default = "default_implement_key")]
    implement_key: String,
    #[serde(default)]
    dedupe_imports: bool,
}

fn default_decorators() -> Vec<String> {
    vec!["Component".to_string(), "Directive".to_string()]
}

fn default_bind_key() -> String {
    "provide".to_string()
}

fn default_implement_key() -> String {
    "useClass".to_string()
}

/// Validated plugin options, shared read-only by every file the host rewrites.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct CustomLayerConfig {
    pub table: ReplacementTable,
    /// Decorator names whose metadata carries `providers`.
    pub decorators: Vec<String>,
    /// Key naming the bound token in an object provider.
    pub bind_key: String,
    /// Key naming the implementing class in an object provider.
    pub implement_key: String,
    /// Emit each distinct import once per file instead of once per substitution.
    pub dedupe_imports: bool,
}

impl TryFrom<RawConfig> for CustomLayerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        for decorator in &raw.decorators {
            check_identifier("decorators", decorator)?;
        }
        check_identifier("bindKey", &raw.bind_key)?;
        check_identifier("implementKey", &raw.implement_key)?;

        let specs = raw
            .replacements
            .into_iter()
            .map(ReplacementSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            table: ReplacementTable::new(specs),
            decorators: raw.decorators,
            bind_key: raw.bind_key,
            implement_key: raw.implement_key,
            dedupe_imports: raw.dedupe_imports,
        })
    }
}

impl Default for CustomLayerConfig {
    fn default() -> Self {
        Self::with_table(ReplacementTable::default())
    }
}

impl CustomLayerConfig {
    /// Default decorator names and provider keys around the given table.
    pub fn with_table(table: ReplacementTable) -> Self {
        Self {
            table,
            decorators: default_decorators(),
            bind_key: default_bind_key(),
            implement_key: default_implement_key(),
            dedupe_imports: false,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_recognized_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d == name)
    }
}
