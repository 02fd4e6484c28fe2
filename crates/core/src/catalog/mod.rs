//! Source catalog: the static set of sources a search can fan out to.
//!
//! Definitions come from a TOML file of `[[source]]` tables. Per-install
//! settings can enable/disable a source, move it to a mirror, relabel it
//! and attach login credentials, without touching its extraction rules.

mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SourceSettings;
use crate::searcher::ContentKind;

/// A source together with its per-install state.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: Arc<SourceDefinition>,
    pub enabled: bool,
    pub credentials: Option<Credentials>,
}

impl CatalogEntry {
    pub fn summary(&self) -> SourceSummary {
        let def = &self.definition;
        SourceSummary {
            id: def.id.clone(),
            name: def.name.clone(),
            language: def.language.clone(),
            private: def.private,
            enabled: self.enabled,
            format: if def.is_api() { "api" } else { "table" },
            kinds: def.kinds.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    source: Vec<SourceDefinition>,
}

/// Read-only mapping from source id to definition.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl SourceCatalog {
    /// Build a catalog, applying per-install settings keyed by source id.
    pub fn new(
        definitions: Vec<SourceDefinition>,
        settings: &BTreeMap<String, SourceSettings>,
    ) -> Result<Self, CatalogError> {
        let mut entries = BTreeMap::new();

        for mut definition in definitions {
            if entries.contains_key(&definition.id) {
                return Err(CatalogError::Duplicate(definition.id));
            }

            let overrides = settings.get(&definition.id);
            let mut enabled = definition.enabled_by_default();
            let mut credentials = None;

            if let Some(overrides) = overrides {
                if let Some(alias) = overrides.alias.as_deref().filter(|a| !a.is_empty()) {
                    definition = definition.with_alias(alias)?;
                }
                if let Some(label) = overrides.label.as_deref().filter(|l| !l.is_empty()) {
                    definition = definition.with_label(label);
                }
                if let Some(flag) = overrides.enabled {
                    enabled = flag;
                }
                if let (Some(username), Some(password)) = (&overrides.username, &overrides.password)
                {
                    credentials = Some(Credentials {
                        username: username.clone(),
                        password: password.clone(),
                    });
                }
            }

            debug!(source = %definition.id, enabled, "Loaded source");
            entries.insert(
                definition.id.clone(),
                CatalogEntry {
                    definition: Arc::new(definition),
                    enabled,
                    credentials,
                },
            );
        }

        for id in settings.keys() {
            if !entries.contains_key(id) {
                warn!(source = %id, "Settings given for unknown source");
            }
        }

        Ok(Self { entries })
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml_str(
        text: &str,
        settings: &BTreeMap<String, SourceSettings>,
    ) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.source, settings)
    }

    /// Load a catalog file.
    pub fn from_file(
        path: &Path,
        settings: &BTreeMap<String, SourceSettings>,
    ) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&text, settings)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Enabled sources supporting `kind`, ordered by id.
    pub fn enabled_for(&self, kind: ContentKind) -> Vec<CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.enabled && e.definition.supports(kind))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
