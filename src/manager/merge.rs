//! Priority merge of configuration sources
//!
//! Sources apply lowest priority first, each stage taking the record built so
//! far and returning the next one:
//!
//! ```text
//! Framework_Registry -> Framework_Profile -> HuggingFace_Hub_API -> Model_Registry -> Model_Profile
//! ```
//!
//! Scalars are overwritten by any source that sets them, `envVars` are merged key
//! by key, and `recommendedInstanceTypes` is replaced outright by any source with
//! a non-empty list.

use super::UserSelections;
use crate::hub::HubModelInfo;
use crate::matcher::{MatchResult, MatchType};
use crate::registry::{
    AcceleratorRequirement, EnvVars, FrameworkConfig, ModelConfig, Profile, ValidationLevel,
};
use crate::version::satisfies;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a piece of the merged configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    #[serde(rename = "Default")]
    Default,
    #[serde(rename = "Framework_Registry")]
    FrameworkRegistry,
    #[serde(rename = "Framework_Profile")]
    FrameworkProfile,
    #[serde(rename = "HuggingFace_Hub_API")]
    HuggingFaceHubApi,
    #[serde(rename = "Model_Registry")]
    ModelRegistry,
    #[serde(rename = "Model_Profile")]
    ModelProfile,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "Default",
            Self::FrameworkRegistry => "Framework_Registry",
            Self::FrameworkProfile => "Framework_Profile",
            Self::HuggingFaceHubApi => "HuggingFace_Hub_API",
            Self::ModelRegistry => "Model_Registry",
            Self::ModelProfile => "Model_Profile",
        };
        f.write_str(name)
    }
}

/// Inputs to the merge; every source is optional
#[derive(Debug, Clone, Default)]
pub struct MergeSources<'a> {
    pub framework: Option<MatchResult<'a, FrameworkConfig>>,
    pub framework_profile: Option<&'a Profile>,
    pub hub: Option<HubModelInfo>,
    pub model: Option<MatchResult<'a, ModelConfig>>,
    pub model_profile: Option<&'a Profile>,
}

/// Fully resolved configuration handed to template rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedConfiguration {
    #[serde(flatten)]
    pub selections: UserSelections,
    pub base_image: Option<String>,
    pub accelerator: Option<AcceleratorRequirement>,
    pub env_vars: EnvVars,
    pub chat_template: Option<String>,
    pub recommended_instance_types: Vec<String>,
    pub inference_ami_version: Option<String>,
    pub model_family: Option<String>,
    pub requires_template: bool,
    pub config_sources: Vec<ConfigSource>,
    pub validation_level: ValidationLevel,
    pub match_type: Option<MatchType>,
    pub matched_version: Option<String>,
    pub requested_version: Option<String>,
    pub matched_model_pattern: Option<String>,
    pub warnings: Vec<String>,
}

impl MergedConfiguration {
    fn new(selections: UserSelections) -> Self {
        Self {
            selections,
            base_image: None,
            accelerator: None,
            env_vars: EnvVars::new(),
            chat_template: None,
            recommended_instance_types: Vec::new(),
            inference_ami_version: None,
            model_family: None,
            requires_template: false,
            config_sources: Vec::new(),
            validation_level: ValidationLevel::Unknown,
            match_type: None,
            matched_version: None,
            requested_version: None,
            matched_model_pattern: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_source(&self, source: ConfigSource) -> bool {
        self.config_sources.contains(&source)
    }

    /// View of the resolved image requirements as a framework entry
    ///
    /// Profiles may override the accelerator, so compatibility checks should run
    /// against this rather than the raw registry entry.
    pub fn as_framework_config(&self) -> FrameworkConfig {
        FrameworkConfig {
            base_image: self.base_image.clone(),
            accelerator: self.accelerator.clone(),
            env_vars: self.env_vars.clone(),
            inference_ami_version: self.inference_ami_version.clone(),
            recommended_instance_types: self.recommended_instance_types.clone(),
            validation_level: Some(self.validation_level),
            ..Default::default()
        }
    }
}

type Stage = fn(MergedConfiguration, &MergeSources<'_>) -> MergedConfiguration;

const STAGES: [Stage; 5] = [
    apply_framework_registry,
    apply_framework_profile,
    apply_hub,
    apply_model_registry,
    apply_model_profile,
];

/// Merge all present sources in priority order
pub fn merge_configurations(
    selections: UserSelections,
    sources: &MergeSources<'_>,
) -> MergedConfiguration {
    let mut merged = STAGES
        .iter()
        .fold(MergedConfiguration::new(selections), |config, stage| {
            stage(config, sources)
        });

    if merged.config_sources.is_empty() {
        merged.config_sources.push(ConfigSource::Default);
    }
    if merged.requires_template && merged.chat_template.is_none() {
        merged
            .warnings
            .push("Model requires a chat template but none was resolved".to_string());
    }

    merged
}

fn apply_framework_registry(
    mut config: MergedConfiguration,
    sources: &MergeSources<'_>,
) -> MergedConfiguration {
    let Some(matched) = &sources.framework else {
        return config;
    };
    let entry = matched.config;

    overwrite(&mut config.base_image, &entry.base_image);
    overwrite(&mut config.accelerator, &entry.accelerator);
    overwrite(&mut config.inference_ami_version, &entry.inference_ami_version);
    merge_env_vars(&mut config.env_vars, &entry.env_vars);
    replace_instance_types(
        &mut config.recommended_instance_types,
        &entry.recommended_instance_types,
    );

    config.validation_level = entry.validation_level.unwrap_or_default();
    config.match_type = Some(matched.match_type);
    config.matched_version = Some(matched.matched_key.to_string());
    config.requested_version =
        Some(matched.requested_key.clone()).filter(|requested| !requested.is_empty());

    if matched.match_type == MatchType::Fuzzy {
        config.warnings.push(match &config.requested_version {
            Some(requested) => format!(
                "No exact registry entry for version {requested}; using nearest version {}",
                matched.matched_key
            ),
            None => format!(
                "No version selected; using latest registry version {}",
                matched.matched_key
            ),
        });
    }

    config.config_sources.push(ConfigSource::FrameworkRegistry);
    config
}

fn apply_framework_profile(
    mut config: MergedConfiguration,
    sources: &MergeSources<'_>,
) -> MergedConfiguration {
    let Some(profile) = sources.framework_profile else {
        return config;
    };
    apply_profile(&mut config, profile);
    config.config_sources.push(ConfigSource::FrameworkProfile);
    config
}

/// The hub only contributes a chat template
fn apply_hub(mut config: MergedConfiguration, sources: &MergeSources<'_>) -> MergedConfiguration {
    let Some(template) = sources.hub.as_ref().and_then(HubModelInfo::chat_template) else {
        return config;
    };
    config.chat_template = Some(template);
    config.config_sources.push(ConfigSource::HuggingFaceHubApi);
    config
}

fn apply_model_registry(
    mut config: MergedConfiguration,
    sources: &MergeSources<'_>,
) -> MergedConfiguration {
    let Some(matched) = &sources.model else {
        return config;
    };
    let entry = matched.config;

    overwrite(&mut config.model_family, &entry.family);
    overwrite(&mut config.chat_template, &entry.chat_template);
    config.requires_template = entry.requires_template;
    merge_env_vars(&mut config.env_vars, &entry.env_vars);
    replace_instance_types(
        &mut config.recommended_instance_types,
        &entry.recommended_instance_types,
    );

    if let Some(level) = entry.validation_level {
        config.validation_level = level;
        config.match_type = Some(matched.match_type);
    }
    if matched.match_type == MatchType::Pattern {
        config.matched_model_pattern = Some(matched.matched_key.to_string());
    }

    if let Some(warning) = framework_compatibility_warning(&config, entry) {
        config.warnings.push(warning);
    }

    config.config_sources.push(ConfigSource::ModelRegistry);
    config
}

fn apply_model_profile(
    mut config: MergedConfiguration,
    sources: &MergeSources<'_>,
) -> MergedConfiguration {
    let Some(profile) = sources.model_profile else {
        return config;
    };
    apply_profile(&mut config, profile);
    config.config_sources.push(ConfigSource::ModelProfile);
    config
}

fn apply_profile(config: &mut MergedConfiguration, profile: &Profile) {
    overwrite(&mut config.base_image, &profile.base_image);
    overwrite(&mut config.accelerator, &profile.accelerator);
    overwrite(&mut config.inference_ami_version, &profile.inference_ami_version);
    overwrite(&mut config.chat_template, &profile.chat_template);
    merge_env_vars(&mut config.env_vars, &profile.env_vars);
    replace_instance_types(
        &mut config.recommended_instance_types,
        &profile.recommended_instance_types,
    );
}

fn overwrite<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}

fn merge_env_vars(target: &mut EnvVars, source: &EnvVars) {
    target.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn replace_instance_types(target: &mut Vec<String>, source: &[String]) {
    if !source.is_empty() {
        *target = source.to_vec();
    }
}

/// Warn when the model declares a constraint the selected framework version misses
fn framework_compatibility_warning(
    config: &MergedConfiguration,
    entry: &ModelConfig,
) -> Option<String> {
    let framework = config.selections.framework.as_deref()?;
    let constraint = entry.framework_compatibility.get(framework)?;
    let version = config
        .selections
        .framework_version
        .as_deref()
        .or(config.matched_version.as_deref())?;

    match satisfies(version, constraint) {
        Some(false) => Some(format!(
            "Model declares {framework} compatibility '{constraint}', which version {version} does not satisfy"
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AcceleratorType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> EnvVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn framework_entry() -> FrameworkConfig {
        FrameworkConfig {
            base_image: Some("vllm/vllm-openai:v0.4.0".to_string()),
            accelerator: Some(AcceleratorRequirement {
                kind: AcceleratorType::Cuda,
                version: Some("12.1".to_string()),
                version_range: None,
            }),
            env_vars: env(&[("MAX_MODEL_LEN", "4096"), ("TENSOR_PARALLEL_SIZE", "1")]),
            recommended_instance_types: vec!["ml.g5.xlarge".to_string()],
            validation_level: Some(ValidationLevel::Tested),
            ..Default::default()
        }
    }

    fn framework_match(
        entry: &FrameworkConfig,
        match_type: MatchType,
    ) -> MatchResult<'_, FrameworkConfig> {
        MatchResult {
            config: entry,
            match_type,
            matched_key: "0.4.0",
            requested_key: "0.4.0".to_string(),
        }
    }

    fn selections() -> UserSelections {
        UserSelections {
            framework: Some("vllm".to_string()),
            framework_version: Some("0.4.0".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_sources_yields_default() {
        let merged = merge_configurations(UserSelections::default(), &MergeSources::default());
        assert_eq!(merged.config_sources, vec![ConfigSource::Default]);
        assert!(merged.base_image.is_none());
        assert!(merged.accelerator.is_none());
        assert!(merged.env_vars.is_empty());
        assert!(merged.chat_template.is_none());
        assert!(merged.recommended_instance_types.is_empty());
        assert_eq!(merged.validation_level, ValidationLevel::Unknown);
        assert!(merged.match_type.is_none());
    }

    #[test]
    fn test_framework_registry_only() {
        let entry = framework_entry();
        let sources = MergeSources {
            framework: Some(framework_match(&entry, MatchType::Exact)),
            ..Default::default()
        };
        let merged = merge_configurations(selections(), &sources);

        assert_eq!(merged.config_sources, vec![ConfigSource::FrameworkRegistry]);
        assert_eq!(merged.base_image.as_deref(), Some("vllm/vllm-openai:v0.4.0"));
        assert_eq!(merged.validation_level, ValidationLevel::Tested);
        assert_eq!(merged.match_type, Some(MatchType::Exact));
        assert!(merged.warnings.is_empty());
    }

    #[test]
    fn test_model_profile_env_vars_win() {
        let entry = framework_entry();
        let profile = Profile {
            env_vars: env(&[("MAX_MODEL_LEN", "8192"), ("ENABLE_PREFIX_CACHING", "true")]),
            ..Default::default()
        };
        let sources = MergeSources {
            framework: Some(framework_match(&entry, MatchType::Exact)),
            model_profile: Some(&profile),
            ..Default::default()
        };
        let merged = merge_configurations(selections(), &sources);

        assert_eq!(
            merged.config_sources,
            vec![ConfigSource::FrameworkRegistry, ConfigSource::ModelProfile]
        );
        assert_eq!(merged.env_vars["MAX_MODEL_LEN"], "8192");
        assert_eq!(merged.env_vars["TENSOR_PARALLEL_SIZE"], "1");
        assert_eq!(merged.env_vars["ENABLE_PREFIX_CACHING"], "true");
    }

    #[test]
    fn test_full_priority_order() {
        let entry = framework_entry();
        let framework_profile = Profile {
            base_image: Some("vllm/vllm-openai:v0.4.0-long-context".to_string()),
            recommended_instance_types: vec!["ml.g5.2xlarge".to_string()],
            ..Default::default()
        };
        let model = ModelConfig {
            family: Some("llama".to_string()),
            chat_template: Some("registry-template".to_string()),
            requires_template: true,
            validation_level: Some(ValidationLevel::CommunityValidated),
            recommended_instance_types: vec!["ml.g5.12xlarge".to_string()],
            ..Default::default()
        };
        let model_profile = Profile {
            recommended_instance_types: vec!["ml.g6.12xlarge".to_string()],
            ..Default::default()
        };
        let hub = HubModelInfo {
            model_id: "meta-llama/Llama-3-8B".to_string(),
            tokenizer_config: Some(json!({ "chat_template": "hub-template" })),
            ..Default::default()
        };

        let sources = MergeSources {
            framework: Some(framework_match(&entry, MatchType::Exact)),
            framework_profile: Some(&framework_profile),
            hub: Some(hub),
            model: Some(MatchResult {
                config: &model,
                match_type: MatchType::Pattern,
                matched_key: "meta-llama/*",
                requested_key: "meta-llama/Llama-3-8B".to_string(),
            }),
            model_profile: Some(&model_profile),
        };
        let merged = merge_configurations(selections(), &sources);

        assert_eq!(
            merged.config_sources,
            vec![
                ConfigSource::FrameworkRegistry,
                ConfigSource::FrameworkProfile,
                ConfigSource::HuggingFaceHubApi,
                ConfigSource::ModelRegistry,
                ConfigSource::ModelProfile,
            ]
        );
        assert_eq!(
            merged.base_image.as_deref(),
            Some("vllm/vllm-openai:v0.4.0-long-context")
        );
        // Registry template outranks the hub
        assert_eq!(merged.chat_template.as_deref(), Some("registry-template"));
        // Replaced wholesale by the highest-priority source, never unioned
        assert_eq!(merged.recommended_instance_types, vec!["ml.g6.12xlarge"]);
        assert_eq!(merged.validation_level, ValidationLevel::CommunityValidated);
        assert_eq!(merged.match_type, Some(MatchType::Pattern));
        assert_eq!(merged.matched_model_pattern.as_deref(), Some("meta-llama/*"));
        assert_eq!(merged.model_family.as_deref(), Some("llama"));
    }

    #[test]
    fn test_hub_without_template_does_not_contribute() {
        let sources = MergeSources {
            hub: Some(HubModelInfo {
                model_id: "org/model".to_string(),
                metadata: Some(json!({ "pipeline_tag": "text-generation" })),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge_configurations(UserSelections::default(), &sources);
        assert_eq!(merged.config_sources, vec![ConfigSource::Default]);
    }

    #[test]
    fn test_model_without_level_keeps_framework_level() {
        let entry = framework_entry();
        let model = ModelConfig::default();
        let sources = MergeSources {
            framework: Some(framework_match(&entry, MatchType::Exact)),
            model: Some(MatchResult {
                config: &model,
                match_type: MatchType::Exact,
                matched_key: "org/model",
                requested_key: "org/model".to_string(),
            }),
            ..Default::default()
        };
        let merged = merge_configurations(selections(), &sources);
        assert_eq!(merged.validation_level, ValidationLevel::Tested);
        // Empty list does not wipe the framework's recommendation
        assert_eq!(merged.recommended_instance_types, vec!["ml.g5.xlarge"]);
    }

    #[test]
    fn test_fuzzy_match_records_warning() {
        let entry = framework_entry();
        let sources = MergeSources {
            framework: Some(MatchResult {
                config: &entry,
                match_type: MatchType::Fuzzy,
                matched_key: "0.4.0",
                requested_key: "0.4.2".to_string(),
            }),
            ..Default::default()
        };
        let merged = merge_configurations(selections(), &sources);
        assert_eq!(merged.matched_version.as_deref(), Some("0.4.0"));
        assert_eq!(merged.requested_version.as_deref(), Some("0.4.2"));
        assert_eq!(merged.warnings.len(), 1);
        assert!(merged.warnings[0].contains("0.4.2"));
    }

    #[test]
    fn test_framework_compatibility_and_template_warnings() {
        let model = ModelConfig {
            requires_template: true,
            framework_compatibility: BTreeMap::from([(
                "vllm".to_string(),
                ">=0.5.0".to_string(),
            )]),
            ..Default::default()
        };
        let sources = MergeSources {
            model: Some(MatchResult {
                config: &model,
                match_type: MatchType::Exact,
                matched_key: "org/model",
                requested_key: "org/model".to_string(),
            }),
            ..Default::default()
        };
        let merged = merge_configurations(selections(), &sources);
        assert_eq!(merged.warnings.len(), 2);
        assert!(merged.warnings[0].contains(">=0.5.0"));
        assert!(merged.warnings[1].contains("chat template"));
    }

    #[test]
    fn test_serializes_source_names() {
        let merged = merge_configurations(UserSelections::default(), &MergeSources::default());
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["configSources"], json!(["Default"]));
        assert_eq!(json["validationLevel"], "unknown");
        assert_eq!(ConfigSource::HuggingFaceHubApi.to_string(), "HuggingFace_Hub_API");
    }
}
