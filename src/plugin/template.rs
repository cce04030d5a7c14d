//! Namespacing of plugin identifiers
//!
//! Statement and table-name templates mark the plugin namespace with the named
//! placeholder `{plugin}`. Rendering replaces every occurrence with the same
//! [`Namespace`] token, so a foreign key that repeats the table name resolves to
//! the same namespaced table.

use std::fmt;
use std::path::{Path, PathBuf};

pub const PLACEHOLDER: &str = "{plugin}";

/// Lower-cased plugin name; the token every shared identifier is derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(plugin_name: &str) -> Self {
        Self(plugin_name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<namespace>_<suffix>`, the persisted table naming scheme
    pub fn table(&self, suffix: &str) -> String {
        format!("{}_{}", self.0, suffix)
    }

    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.0)
    }

    pub fn view_prefix(&self) -> String {
        format!("/{}", self.0)
    }

    /// `<root>/<namespace>/<entry>`
    pub fn data_dir(&self, root: &Path, entry: &str) -> PathBuf {
        root.join(&self.0).join(entry)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Namespace,
}

/// A statement (or identifier) with zero or more `{plugin}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    segments: Vec<Segment>,
}

impl StatementTemplate {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();

        for (idx, piece) in template.split(PLACEHOLDER).enumerate() {
            if idx > 0 {
                segments.push(Segment::Namespace);
            }
            if !piece.is_empty() {
                segments.push(Segment::Text(piece.to_string()));
            }
        }

        Self { segments }
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Namespace))
            .count()
    }

    pub fn render(&self, namespace: &Namespace) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Namespace => out.push_str(namespace.as_str()),
            }
        }
        out
    }
}

impl From<&str> for StatementTemplate {
    fn from(template: &str) -> Self {
        Self::parse(template)
    }
}

impl From<String> for StatementTemplate {
    fn from(template: String) -> Self {
        Self::parse(&template)
    }
}
