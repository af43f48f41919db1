use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// How builders treat a column that overlaps another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// A prefix group whose prefix starts another registered column (or is
    /// started by one) fails the build.
    #[default]
    Reject,
    /// Nested prefixes are allowed; every lookup picks the longest match and
    /// an exact qualifier beats any prefix group. On parse a cell therefore
    /// goes to its fixed qualifier before the floor prefix is consulted. A
    /// mutation whose group suffix lands on a qualifier owned by another
    /// column fails with `EngineError::AmbiguousCell`.
    LongestPrefix,
}

/// What the result parser does with a cell no field is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCellPolicy {
    #[default]
    Ignore,
    Reject,
}

/// What the result parser does with a cell its codec cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// The whole parse fails, naming the offending qualifier.
    #[default]
    Fail,
    /// The offending cell is dropped; the rest of the row is parsed.
    SkipCell,
}

/// Policies handed to every schema builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaOptions {
    pub overlap: OverlapPolicy,
    pub unknown_cells: UnknownCellPolicy,
    pub decode_errors: DecodeErrorPolicy,
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub overlap: OverlapPolicy,

    #[serde(default)]
    pub unknown_cells: UnknownCellPolicy,

    #[serde(default)]
    pub decode_errors: DecodeErrorPolicy,

    /// Store section, passed verbatim to the store factory.
    #[serde(default)]
    pub store: Option<serde_json::Value>,

    /// Table definitions.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub family: String,
    /// Leading row-key bytes that form the scan prefix.
    #[serde(default)]
    pub scan_key_size: Option<usize>,
}

/// Parses configuration text of one format.
pub trait ConfigParser: Send + Sync {
    /// File extensions handled by this parser, without the dot.
    fn extensions(&self) -> &[&str];

    fn parse(&self, content: &str) -> Result<EngineConfig, EngineError>;
}

/// The built-in TOML parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn parse(&self, content: &str) -> Result<EngineConfig, EngineError> {
        EngineConfig::parse(content)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        Self::load_with(path, &[&TomlParser])
    }

    /// Load configuration with the parser registered for the file's
    /// extension. Unknown extensions fall back to TOML.
    pub fn load_with(path: &str, parsers: &[&dyn ConfigParser]) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let parser = parsers
            .iter()
            .find(|p| p.extensions().contains(&extension))
            .copied()
            .unwrap_or(&TomlParser);
        tracing::debug!(path, extension, "parsing configuration");
        parser.parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            overlap: self.overlap,
            unknown_cells: self.unknown_cells,
            decode_errors: self.decode_errors,
        }
    }

    pub fn table(&self, name: &str) -> Result<&TableConfig, EngineError> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }
}
