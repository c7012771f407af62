// ABOUTME: Source-to-destination identity mapping carried between migration phases
// ABOUTME: Monotonic within a run and serialized as a plain JSON object for the caller to hold

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Maps source identity ids to destination identity ids
///
/// Once a source id is mapped it keeps its destination id; a second, different
/// destination id for the same source id is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityMapping {
    entries: BTreeMap<String, String>,
}

impl IdentityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source_id -> destination_id`
    ///
    /// Returns `false` (and leaves the mapping untouched) when the source id is
    /// already mapped to a different destination id. Re-recording the same pair
    /// is a no-op that returns `true`.
    pub fn record(&mut self, source_id: &str, destination_id: &str) -> bool {
        match self.entries.get(source_id) {
            Some(existing) if existing != destination_id => {
                tracing::warn!(
                    "Refusing to remap identity {} from {} to {}",
                    source_id,
                    existing,
                    destination_id
                );
                false
            }
            Some(_) => true,
            None => {
                self.entries
                    .insert(source_id.to_string(), destination_id.to_string());
                true
            }
        }
    }

    /// Destination id for a source id
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(source, destination)| (source.as_str(), destination.as_str()))
    }
}

impl IdentityMapping {
    /// Read a mapping saved by [`IdentityMapping::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mapping: Self = serde_json::from_str(&text)?;
        tracing::debug!("Loaded {} identity mappings from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    /// Write the mapping as a pretty-printed JSON object
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Saved {} identity mappings to {}", self.len(), path.display());
        Ok(())
    }
}

impl FromIterator<(String, String)> for IdentityMapping {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut mapping = IdentityMapping::new();
        for (source, destination) in iter {
            mapping.record(&source, &destination);
        }
        mapping
    }
}
