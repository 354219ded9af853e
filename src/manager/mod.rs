//! Configuration manager
//!
//! Owns the loaded registries and orchestrates a resolution request:
//! matching, best-effort hub lookup, priority merge and on-demand validation.

pub mod export;
pub mod merge;

pub use export::{ExportMetadata, ExportOptions, ExportResult, RegistryType, export_configuration};
pub use merge::{ConfigSource, MergeSources, MergedConfiguration, merge_configurations};

use crate::config::ResolverConfig;
use crate::error::{ResolverError, ResolverResult};
use crate::hub::HubClient;
use crate::matcher::ConfigurationMatcher;
use crate::registry::{
    EnvVarRules, FileRegistryLoader, FrameworkConfig, Profile, Registries, RegistryLoader,
};
use crate::validation::{
    EnvValidationOptions, EnvVarTarget, EnvVarValidationReport, ValidationEngine,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the caller picked for one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSelections {
    pub framework: Option<String>,
    pub framework_version: Option<String>,
    pub framework_profile: Option<String>,
    pub model_id: Option<String>,
    pub model_profile: Option<String>,
    pub instance_type: Option<String>,
}

impl UserSelections {
    /// Reject structurally invalid selections
    pub fn validate(&self) -> ResolverResult<()> {
        let fields = [
            ("framework", &self.framework),
            ("frameworkVersion", &self.framework_version),
            ("frameworkProfile", &self.framework_profile),
            ("modelId", &self.model_id),
            ("modelProfile", &self.model_profile),
            ("instanceType", &self.instance_type),
        ];
        for (name, value) in fields {
            if let Some(value) = value
                && value.trim().is_empty()
            {
                return Err(ResolverError::InvalidSelection(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        if self.framework.is_none() {
            if self.framework_version.is_some() {
                return Err(ResolverError::InvalidSelection(
                    "frameworkVersion requires a framework".to_string(),
                ));
            }
            if self.framework_profile.is_some() {
                return Err(ResolverError::InvalidSelection(
                    "frameworkProfile requires a framework".to_string(),
                ));
            }
        }
        if self.model_profile.is_some() && self.model_id.is_none() {
            return Err(ResolverError::InvalidSelection(
                "modelProfile requires a modelId".to_string(),
            ));
        }

        Ok(())
    }
}

enum RegistryState {
    Unloaded,
    Loaded(Arc<Registries>),
}

/// Resolves selections against the registries and the hub
pub struct ConfigurationManager {
    loader: Box<dyn RegistryLoader>,
    hub: HubClient,
    engine: ValidationEngine,
    env_validation: EnvValidationOptions,
    state: RegistryState,
}

impl ConfigurationManager {
    /// Create a manager with nothing loaded yet
    pub fn new(loader: impl RegistryLoader + 'static, hub: HubClient) -> Self {
        Self {
            loader: Box::new(loader),
            hub,
            engine: ValidationEngine::new(),
            env_validation: EnvValidationOptions::default(),
            state: RegistryState::Unloaded,
        }
    }

    /// Create a manager and load its registries
    pub fn initialize(loader: impl RegistryLoader + 'static, hub: HubClient) -> Self {
        let mut manager = Self::new(loader, hub);
        manager.load_registries();
        manager
    }

    /// Build a loaded manager from resolver configuration
    pub fn from_config(config: &ResolverConfig) -> ResolverResult<Self> {
        let hub = HubClient::new(&config.hub)?;
        let mut manager = Self::new(FileRegistryLoader::new(&config.registry_dir), hub)
            .with_env_validation(config.env_validation);
        manager.load_registries();
        Ok(manager)
    }

    pub fn with_validation_engine(mut self, engine: ValidationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Strategies used when `validate_environment_variables` gets no options
    pub fn with_env_validation(mut self, options: EnvValidationOptions) -> Self {
        self.env_validation = options;
        self
    }

    /// Load every registry, replacing any earlier snapshot
    ///
    /// A source that fails to load becomes an empty mapping; this never fails.
    pub fn load_registries(&mut self) -> Arc<Registries> {
        let loader = self.loader.as_ref();
        let registries = Registries {
            frameworks: or_empty("framework registry", loader.load_framework_registry()),
            models: or_empty("model registry", loader.load_model_registry()),
            instances: or_empty("instance mapping", loader.load_instance_mapping()),
            env_var_rules: EnvVarRules {
                known_flags: or_empty("known flags", loader.load_known_flags()),
                community_reports: or_empty(
                    "community reports",
                    loader.load_community_reports(),
                ),
            },
        };

        tracing::info!(
            frameworks = registries.frameworks.len(),
            models = registries.models.len(),
            instances = registries.instances.len(),
            "Registries loaded"
        );

        let registries = Arc::new(registries);
        self.state = RegistryState::Loaded(Arc::clone(&registries));
        registries
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, RegistryState::Loaded(_))
    }

    /// Current registry snapshot
    pub fn registries(&self) -> ResolverResult<Arc<Registries>> {
        match &self.state {
            RegistryState::Loaded(registries) => Ok(Arc::clone(registries)),
            RegistryState::Unloaded => Err(ResolverError::RegistriesNotLoaded),
        }
    }

    pub fn hub(&self) -> &HubClient {
        &self.hub
    }

    pub fn validation_engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Resolve the effective configuration for a set of selections
    pub async fn match_configuration(
        &self,
        selections: UserSelections,
    ) -> ResolverResult<MergedConfiguration> {
        selections.validate()?;
        let registries = self.registries()?;
        let matcher = ConfigurationMatcher::new(&registries.frameworks, &registries.models);
        let mut warnings = Vec::new();

        let framework = match (&selections.framework, &selections.framework_version) {
            (Some(name), Some(version)) => matcher.match_framework(name, version),
            (Some(name), None) => matcher.latest_framework_version(name),
            _ => None,
        };
        if let Some(name) = &selections.framework
            && framework.is_none()
        {
            tracing::warn!(framework = %name, "No registry configuration for framework");
            warnings.push(format!("No registry configuration found for framework '{name}'"));
        }

        let framework_profile = select_profile(
            "framework",
            selections.framework_profile.as_deref(),
            framework.as_ref().map(|m| m.config).map(|config| &config.profiles),
            &mut warnings,
        );

        let (hub, model) = match &selections.model_id {
            Some(model_id) => {
                let info = self.hub.fetch_model_info(model_id).await;
                if let Some(summary) = info.summary() {
                    tracing::debug!(
                        model_id = %model_id,
                        model_type = ?summary.model_type,
                        max_position_embeddings = ?summary.max_position_embeddings,
                        "Hub model summary"
                    );
                }
                let model = matcher.match_model(model_id);
                if model.is_none() {
                    tracing::debug!(model_id = %model_id, "No model registry entry");
                }
                (Some(info).filter(|info| !info.is_empty()), model)
            }
            None => (None, None),
        };

        let model_profile = select_profile(
            "model",
            selections.model_profile.as_deref(),
            model.as_ref().map(|m| m.config).map(|config| &config.profiles),
            &mut warnings,
        );

        let sources = MergeSources {
            framework,
            framework_profile,
            hub,
            model,
            model_profile,
        };
        let mut merged = merge_configurations(selections, &sources);
        merged.warnings.extend(warnings);

        tracing::info!(
            framework = ?merged.selections.framework,
            model_id = ?merged.selections.model_id,
            sources = ?merged.config_sources,
            validation_level = %merged.validation_level,
            "Configuration resolved"
        );

        Ok(merged)
    }

    /// Check an instance type against a framework configuration
    ///
    /// Unknown instance types pass with a warning. Incompatible results carry
    /// ranked alternatives.
    pub fn validate_instance_type(
        &self,
        instance_type: &str,
        framework: &FrameworkConfig,
    ) -> ResolverResult<ValidationResult> {
        let registries = self.registries()?;

        let Some(instance) = registries.instances.get(instance_type) else {
            tracing::debug!(instance_type = %instance_type, "Instance type not in mapping");
            return Ok(ValidationResult::compatible().with_warning(format!(
                "Unknown instance type '{instance_type}'; accelerator compatibility not verified"
            )));
        };

        let result = self.engine.validate_accelerator_compatibility(framework, instance);
        tracing::debug!(
            instance_type = %instance_type,
            compatible = result.compatible,
            "Instance validated"
        );

        if result.compatible {
            return Ok(result);
        }
        let recommendations = self
            .engine
            .get_recommended_instance_types(framework, &registries.instances);
        Ok(result.with_recommendations(recommendations))
    }

    /// Run env var strategies over a resolved configuration
    pub fn validate_environment_variables(
        &self,
        config: &MergedConfiguration,
        options: Option<EnvValidationOptions>,
    ) -> ResolverResult<EnvVarValidationReport> {
        let registries = self.registries()?;
        let target = EnvVarTarget {
            framework: config.selections.framework.as_deref().unwrap_or_default(),
            version: config
                .selections
                .framework_version
                .as_deref()
                .or(config.matched_version.as_deref()),
        };

        let report = self.engine.validate_environment_variables(
            &config.env_vars,
            target,
            options.unwrap_or(self.env_validation),
            &registries.env_var_rules,
        );
        tracing::debug!(
            framework = %target.framework,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Environment variables validated"
        );
        Ok(report)
    }

    /// Package a resolved configuration as a registry contribution
    pub fn export_configuration(
        &self,
        config: &MergedConfiguration,
        options: &ExportOptions,
    ) -> ResolverResult<ExportResult> {
        export_configuration(config, options)
    }
}

fn or_empty<T: Default>(what: &str, result: ResolverResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                registry = %what,
                error = %e,
                "Registry unavailable, using empty mapping"
            );
            T::default()
        }
    }
}

/// Look up a named profile, noting when it cannot be applied
fn select_profile<'a>(
    scope: &str,
    name: Option<&str>,
    profiles: Option<&'a BTreeMap<String, Profile>>,
    warnings: &mut Vec<String>,
) -> Option<&'a Profile> {
    let name = name?;
    let Some(profiles) = profiles else {
        warnings.push(format!(
            "{scope} profile '{name}' ignored: no {scope} configuration matched"
        ));
        return None;
    };

    let profile = profiles.get(name);
    if profile.is_none() {
        tracing::warn!(scope = %scope, profile = %name, "Profile not found");
        warnings.push(format!("{scope} profile '{name}' not found"));
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubSettings;
    use crate::matcher::MatchType;
    use crate::registry::{
        AcceleratorRequirement, AcceleratorType, InMemoryRegistryLoader, InstanceAccelerator,
        ModelConfig, ValidationLevel,
    };
    use std::path::PathBuf;

    fn offline_hub() -> HubClient {
        HubClient::new(&HubSettings::offline()).unwrap()
    }

    fn cuda(version: &str) -> Option<AcceleratorRequirement> {
        Some(AcceleratorRequirement {
            kind: AcceleratorType::Cuda,
            version: Some(version.to_string()),
            version_range: None,
        })
    }

    fn registries() -> Registries {
        let mut registries = Registries::default();

        let profile = Profile {
            env_vars: BTreeMap::from([("MAX_MODEL_LEN".to_string(), "32768".to_string())]),
            ..Default::default()
        };
        registries.frameworks.insert(
            "vllm".to_string(),
            BTreeMap::from([
                (
                    "0.4.0".to_string(),
                    FrameworkConfig {
                        base_image: Some("vllm:0.4.0".to_string()),
                        accelerator: cuda("12.1"),
                        validation_level: Some(ValidationLevel::Tested),
                        ..Default::default()
                    },
                ),
                (
                    "0.6.0".to_string(),
                    FrameworkConfig {
                        base_image: Some("vllm:0.6.0".to_string()),
                        accelerator: cuda("12.4"),
                        profiles: BTreeMap::from([("long-context".to_string(), profile)]),
                        ..Default::default()
                    },
                ),
            ]),
        );
        registries.models.insert(
            "meta-llama/*",
            ModelConfig {
                family: Some("llama".to_string()),
                validation_level: Some(ValidationLevel::CommunityValidated),
                ..Default::default()
            },
        );
        registries.instances.insert(
            "ml.g5.xlarge".to_string(),
            InstanceAccelerator {
                kind: AcceleratorType::Cuda,
                versions: vec!["12.1".to_string()],
                description: None,
            },
        );
        registries.instances.insert(
            "ml.inf2.xlarge".to_string(),
            InstanceAccelerator {
                kind: AcceleratorType::Neuron,
                versions: vec!["2.19".to_string()],
                description: None,
            },
        );
        registries
    }

    fn manager() -> ConfigurationManager {
        ConfigurationManager::initialize(InMemoryRegistryLoader::new(registries()), offline_hub())
    }

    fn vllm(version: Option<&str>) -> UserSelections {
        UserSelections {
            framework: Some("vllm".to_string()),
            framework_version: version.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unloaded_manager_rejects_operations() {
        let manager =
            ConfigurationManager::new(InMemoryRegistryLoader::new(registries()), offline_hub());
        assert!(!manager.is_loaded());
        assert!(matches!(
            manager.match_configuration(vllm(Some("0.4.0"))).await,
            Err(ResolverError::RegistriesNotLoaded)
        ));
        assert!(matches!(
            manager.validate_instance_type("ml.g5.xlarge", &FrameworkConfig::default()),
            Err(ResolverError::RegistriesNotLoaded)
        ));
    }

    #[test]
    fn test_missing_registry_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            ConfigurationManager::new(FileRegistryLoader::new(dir.path()), offline_hub());
        let registries = manager.load_registries();
        assert!(manager.is_loaded());
        assert!(registries.frameworks.is_empty());
        assert!(registries.models.is_empty());
        assert!(registries.instances.is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = ResolverConfig {
            registry_dir: PathBuf::from("/nonexistent/registries"),
            hub: HubSettings::offline(),
            ..Default::default()
        };
        let manager = ConfigurationManager::from_config(&config).unwrap();
        assert!(manager.is_loaded());
        assert!(manager.hub().is_offline());
    }

    #[tokio::test]
    async fn test_exact_framework_resolution() {
        let merged = manager().match_configuration(vllm(Some("0.4.0"))).await.unwrap();
        assert_eq!(merged.base_image.as_deref(), Some("vllm:0.4.0"));
        assert_eq!(merged.match_type, Some(MatchType::Exact));
        assert_eq!(merged.config_sources, vec![ConfigSource::FrameworkRegistry]);
    }

    #[tokio::test]
    async fn test_framework_without_version_uses_latest() {
        let merged = manager().match_configuration(vllm(None)).await.unwrap();
        assert_eq!(merged.matched_version.as_deref(), Some("0.6.0"));
        assert_eq!(merged.match_type, Some(MatchType::Fuzzy));
    }

    #[tokio::test]
    async fn test_profile_applied_and_missing_profile_warns() {
        let manager = manager();
        let mut selections = vllm(Some("0.6.0"));
        selections.framework_profile = Some("long-context".to_string());
        let merged = manager.match_configuration(selections).await.unwrap();
        assert_eq!(merged.env_vars["MAX_MODEL_LEN"], "32768");
        assert!(merged.has_source(ConfigSource::FrameworkProfile));

        let mut selections = vllm(Some("0.6.0"));
        selections.framework_profile = Some("missing".to_string());
        let merged = manager.match_configuration(selections).await.unwrap();
        assert!(!merged.has_source(ConfigSource::FrameworkProfile));
        assert!(merged.warnings.iter().any(|w| w.contains("missing")));
    }

    #[tokio::test]
    async fn test_model_pattern_overrides_validation_level() {
        let mut selections = vllm(Some("0.4.0"));
        selections.model_id = Some("meta-llama/Llama-3-8B".to_string());
        let merged = manager().match_configuration(selections).await.unwrap();

        assert_eq!(merged.validation_level, ValidationLevel::CommunityValidated);
        assert_eq!(merged.match_type, Some(MatchType::Pattern));
        assert_eq!(merged.model_family.as_deref(), Some("llama"));
        assert_eq!(
            merged.config_sources,
            vec![ConfigSource::FrameworkRegistry, ConfigSource::ModelRegistry]
        );
    }

    #[tokio::test]
    async fn test_unknown_framework_yields_default() {
        let selections = UserSelections {
            framework: Some("triton".to_string()),
            ..Default::default()
        };
        let merged = manager().match_configuration(selections).await.unwrap();
        assert_eq!(merged.config_sources, vec![ConfigSource::Default]);
        assert!(merged.warnings.iter().any(|w| w.contains("triton")));
    }

    #[tokio::test]
    async fn test_invalid_selections() {
        let manager = manager();
        let cases = [
            UserSelections {
                framework: Some("  ".to_string()),
                ..Default::default()
            },
            UserSelections {
                framework_profile: Some("long-context".to_string()),
                ..Default::default()
            },
            UserSelections {
                model_profile: Some("fast".to_string()),
                ..Default::default()
            },
        ];
        for selections in cases {
            assert!(matches!(
                manager.match_configuration(selections).await,
                Err(ResolverError::InvalidSelection(_))
            ));
        }
    }

    #[test]
    fn test_validate_instance_type() {
        let manager = manager();
        let framework = FrameworkConfig {
            accelerator: cuda("12.1"),
            ..Default::default()
        };

        let result = manager.validate_instance_type("ml.g5.xlarge", &framework).unwrap();
        assert!(result.compatible);

        let result = manager.validate_instance_type("ml.inf2.xlarge", &framework).unwrap();
        assert!(!result.compatible);
        assert_eq!(result.recommendations, vec!["ml.g5.xlarge"]);

        let result = manager.validate_instance_type("ml.x99.huge", &framework).unwrap();
        assert!(result.compatible);
        assert!(result.warning.unwrap().contains("ml.x99.huge"));
    }

    #[tokio::test]
    async fn test_validate_environment_variables_uses_defaults() {
        let manager = manager().with_env_validation(EnvValidationOptions {
            use_known_flags: false,
            use_community_reports: false,
            use_docker_introspection: true,
        });
        let merged = manager.match_configuration(vllm(Some("0.4.0"))).await.unwrap();

        let report = manager.validate_environment_variables(&merged, None).unwrap();
        assert_eq!(report.strategies_used, vec!["docker-introspection"]);
        assert_eq!(report.warnings.len(), 1);

        let report = manager
            .validate_environment_variables(&merged, Some(EnvValidationOptions::default()))
            .unwrap();
        assert!(report.is_valid());
        assert_eq!(report.strategies_used.len(), 2);
    }
}
