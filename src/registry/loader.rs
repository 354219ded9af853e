//! Registry loading
//!
//! Registries live as JSON documents in a directory:
//! ```text
//! registries/
//! ├── framework-registry.json
//! ├── model-registry.json
//! ├── instance-accelerator-mapping.json
//! ├── env-var-flags.json
//! └── community-reports.json
//! ```
//! A document that cannot be read or is not a JSON object fails as a whole and
//! the configuration manager decides how to degrade. Inside a readable document
//! each entry is converted on its own: a malformed entry is logged and skipped
//! so the rest of the registry stays usable.

use super::ordered::OrderedMap;
use super::types::{
    CommunityReports, FrameworkRegistry, InstanceAcceleratorMapping, KnownFlagRegistry,
    ModelRegistry, Registries,
};
use crate::error::{ResolverError, ResolverResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const FRAMEWORK_REGISTRY_FILE: &str = "framework-registry.json";
pub const MODEL_REGISTRY_FILE: &str = "model-registry.json";
pub const INSTANCE_MAPPING_FILE: &str = "instance-accelerator-mapping.json";
pub const ENV_VAR_FLAGS_FILE: &str = "env-var-flags.json";
pub const COMMUNITY_REPORTS_FILE: &str = "community-reports.json";

/// Source of registry data
pub trait RegistryLoader: Send + Sync {
    fn load_framework_registry(&self) -> ResolverResult<FrameworkRegistry>;
    fn load_model_registry(&self) -> ResolverResult<ModelRegistry>;
    fn load_instance_mapping(&self) -> ResolverResult<InstanceAcceleratorMapping>;
    fn load_known_flags(&self) -> ResolverResult<KnownFlagRegistry>;
    fn load_community_reports(&self) -> ResolverResult<CommunityReports>;
}

/// Reads registry documents from a directory
#[derive(Debug, Clone)]
pub struct FileRegistryLoader {
    dir: PathBuf,
}

impl FileRegistryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> ResolverResult<T> {
        let path = self.dir.join(file);
        let content = std::fs::read_to_string(&path).map_err(|source| {
            ResolverError::RegistryRead {
                path: path.clone(),
                source,
            }
        })?;
        let parsed = serde_json::from_str(&content)
            .map_err(|source| ResolverError::RegistryParse { path, source })?;

        tracing::debug!(file = %file, dir = ?self.dir, "Registry document loaded");
        Ok(parsed)
    }
}

/// Convert each entry of a registry document, skipping the malformed ones
fn lenient_entries<T, C>(
    file: &str,
    parent: &str,
    entries: impl IntoIterator<Item = (String, Value)>,
) -> C
where
    T: DeserializeOwned,
    C: FromIterator<(String, T)>,
{
    entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(entry) => Some((key, entry)),
            Err(error) => {
                let entry = if parent.is_empty() {
                    key
                } else {
                    format!("{parent}/{key}")
                };
                tracing::warn!(
                    file = %file,
                    entry = %entry,
                    error = %error,
                    "Skipping malformed registry entry"
                );
                None
            }
        })
        .collect()
}

/// Two-level documents: an outer key holding a map of entries
fn lenient_nested<T: DeserializeOwned>(
    file: &str,
    document: BTreeMap<String, Value>,
) -> BTreeMap<String, BTreeMap<String, T>> {
    let groups: BTreeMap<String, BTreeMap<String, Value>> = lenient_entries(file, "", document);
    groups
        .into_iter()
        .map(|(name, entries)| {
            let converted = lenient_entries(file, &name, entries);
            (name, converted)
        })
        .collect()
}

impl RegistryLoader for FileRegistryLoader {
    fn load_framework_registry(&self) -> ResolverResult<FrameworkRegistry> {
        let document = self.read(FRAMEWORK_REGISTRY_FILE)?;
        Ok(lenient_nested(FRAMEWORK_REGISTRY_FILE, document))
    }

    fn load_model_registry(&self) -> ResolverResult<ModelRegistry> {
        let document: OrderedMap<Value> = self.read(MODEL_REGISTRY_FILE)?;
        Ok(lenient_entries(MODEL_REGISTRY_FILE, "", document))
    }

    fn load_instance_mapping(&self) -> ResolverResult<InstanceAcceleratorMapping> {
        let document: BTreeMap<String, Value> = self.read(INSTANCE_MAPPING_FILE)?;
        Ok(lenient_entries(INSTANCE_MAPPING_FILE, "", document))
    }

    fn load_known_flags(&self) -> ResolverResult<KnownFlagRegistry> {
        let document = self.read(ENV_VAR_FLAGS_FILE)?;
        Ok(lenient_nested(ENV_VAR_FLAGS_FILE, document))
    }

    fn load_community_reports(&self) -> ResolverResult<CommunityReports> {
        let document: BTreeMap<String, Vec<Value>> = self.read(COMMUNITY_REPORTS_FILE)?;
        Ok(document
            .into_iter()
            .map(|(framework, reports)| {
                let indexed = reports
                    .into_iter()
                    .enumerate()
                    .map(|(index, report)| (index.to_string(), report));
                let parsed: Vec<(String, _)> =
                    lenient_entries(COMMUNITY_REPORTS_FILE, &framework, indexed);
                (framework, parsed.into_iter().map(|(_, report)| report).collect())
            })
            .collect())
    }
}

/// Serves registries that were built in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryLoader {
    registries: Registries,
}

impl InMemoryRegistryLoader {
    pub fn new(registries: Registries) -> Self {
        Self { registries }
    }
}

impl RegistryLoader for InMemoryRegistryLoader {
    fn load_framework_registry(&self) -> ResolverResult<FrameworkRegistry> {
        Ok(self.registries.frameworks.clone())
    }

    fn load_model_registry(&self) -> ResolverResult<ModelRegistry> {
        Ok(self.registries.models.clone())
    }

    fn load_instance_mapping(&self) -> ResolverResult<InstanceAcceleratorMapping> {
        Ok(self.registries.instances.clone())
    }

    fn load_known_flags(&self) -> ResolverResult<KnownFlagRegistry> {
        Ok(self.registries.env_var_rules.known_flags.clone())
    }

    fn load_community_reports(&self) -> ResolverResult<CommunityReports> {
        Ok(self.registries.env_var_rules.community_reports.clone())
    }
}
