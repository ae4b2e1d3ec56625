use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tuning knobs for the tag index.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TagIndexConfig {
    /// Bytes read from the head of each document during a full rebuild.
    /// Frontmatter lives at the very start, so the rest is never needed.
    pub prefix_bytes: usize,
    /// Fuzzy score cutoff on a 0..1 scale, lower is stricter
    pub search_threshold: f64,
    /// Default maximum age for `is_stale`
    pub stale_after_ms: i64,
    /// Key of the persisted blob in the key-value store
    pub storage_key: String,
    /// File extensions (without the dot) treated as documents
    pub document_extensions: Vec<String>,
    /// Entries whose name starts with this marker are hidden and skipped
    pub hidden_prefix: String,
    /// Directory name suffixes that are never scanned (attachment folders)
    pub skip_suffixes: Vec<String>,
}

impl Default for TagIndexConfig {
    fn default() -> Self {
        Self {
            prefix_bytes: 4096,
            search_threshold: 0.4,
            stale_after_ms: 86_400_000,
            storage_key: "tag-index".to_string(),
            document_extensions: vec!["md".to_string()],
            hidden_prefix: ".".to_string(),
            skip_suffixes: vec!["_att".to_string()],
        }
    }
}

impl TagIndexConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        let config: TagIndexConfig = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.search_threshold) {
            return Err(format!(
                "search_threshold must be within 0.0..=1.0, got {}",
                self.search_threshold
            ));
        }
        if self.prefix_bytes == 0 {
            return Err("prefix_bytes must be greater than 0".to_string());
        }
        if self.storage_key.trim().is_empty() {
            return Err("storage_key must not be empty".to_string());
        }
        Ok(())
    }

    /// Whether an entry name is hidden (reserved marker prefix)
    pub fn is_hidden(&self, name: &str) -> bool {
        !self.hidden_prefix.is_empty() && name.starts_with(&self.hidden_prefix)
    }

    pub fn is_skipped_dir(&self, name: &str) -> bool {
        self.is_hidden(name) || self.skip_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    pub fn is_document(&self, name: &str) -> bool {
        if self.is_hidden(name) {
            return false;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .document_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}
