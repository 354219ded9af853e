//! Export a resolved configuration as a registry contribution

use super::merge::{ConfigSource, MergedConfiguration};
use crate::error::ResolverResult;
use crate::registry::ValidationLevel;
use crate::registry::loader::{FRAMEWORK_REGISTRY_FILE, MODEL_REGISTRY_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

pub const PLACEHOLDER_FRAMEWORK: &str = "REPLACE_WITH_FRAMEWORK";
pub const PLACEHOLDER_VERSION: &str = "REPLACE_WITH_FRAMEWORK_VERSION";
pub const PLACEHOLDER_BASE_IMAGE: &str = "REPLACE_WITH_BASE_IMAGE";
pub const PLACEHOLDER_ACCELERATOR_TYPE: &str = "REPLACE_WITH_ACCELERATOR_TYPE";
pub const PLACEHOLDER_ACCELERATOR_VERSION: &str = "REPLACE_WITH_ACCELERATOR_VERSION";
pub const PLACEHOLDER_MODEL_FAMILY: &str = "REPLACE_WITH_MODEL_FAMILY";

const PLACEHOLDERS: [&str; 6] = [
    PLACEHOLDER_FRAMEWORK,
    PLACEHOLDER_VERSION,
    PLACEHOLDER_BASE_IMAGE,
    PLACEHOLDER_ACCELERATOR_TYPE,
    PLACEHOLDER_ACCELERATOR_VERSION,
    PLACEHOLDER_MODEL_FAMILY,
];

/// Testing outcomes reported by whoever ran the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    pub deployment_succeeded: bool,
    pub inference_succeeded: bool,
    pub tested_instance_type: Option<String>,
    pub notes: Option<String>,
}

impl ExportOptions {
    /// Validation level earned by the reported outcomes
    pub fn validation_level(&self) -> ValidationLevel {
        match (self.deployment_succeeded, self.inference_succeeded) {
            (true, true) => ValidationLevel::CommunityValidated,
            (true, false) => ValidationLevel::Experimental,
            _ => ValidationLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    Framework,
    Model,
}

impl RegistryType {
    /// Registry document the entry belongs in
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Framework => FRAMEWORK_REGISTRY_FILE,
            Self::Model => MODEL_REGISTRY_FILE,
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framework => write!(f, "framework"),
            Self::Model => write!(f, "model"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub validation_level: ValidationLevel,
    pub config_sources: Vec<ConfigSource>,
    pub deployment_succeeded: bool,
    pub inference_succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_instance_type: Option<String>,
    /// Placeholders still present in `configEntry`
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub registry_type: RegistryType,
    pub config_entry: Value,
    pub submission_instructions: String,
    pub metadata: ExportMetadata,
}

/// Model-scoped when a model was selected and model data took part
pub fn registry_type_for(config: &MergedConfiguration) -> RegistryType {
    let model_data =
        config.chat_template.is_some() || config.has_source(ConfigSource::ModelRegistry);
    if config.selections.model_id.is_some() && model_data {
        RegistryType::Model
    } else {
        RegistryType::Framework
    }
}

/// Build a registry entry plus submission instructions
pub fn export_configuration(
    config: &MergedConfiguration,
    options: &ExportOptions,
) -> ResolverResult<ExportResult> {
    let registry_type = registry_type_for(config);
    let level = options.validation_level();

    let config_entry = match registry_type {
        RegistryType::Framework => framework_entry(config, options, level),
        RegistryType::Model => model_entry(config, options, level),
    };

    let rendered = serde_json::to_string_pretty(&config_entry)?;
    let placeholders: Vec<String> = PLACEHOLDERS
        .iter()
        .filter(|placeholder| rendered.contains(&format!("\"{placeholder}\"")))
        .map(|placeholder| placeholder.to_string())
        .collect();

    let submission_instructions =
        submission_instructions(registry_type, level, &placeholders, options, &rendered);

    tracing::info!(
        registry_type = %registry_type,
        validation_level = %level,
        placeholders = placeholders.len(),
        "Exported configuration"
    );

    Ok(ExportResult {
        registry_type,
        config_entry,
        submission_instructions,
        metadata: ExportMetadata {
            exported_at: Utc::now(),
            validation_level: level,
            config_sources: config.config_sources.clone(),
            deployment_succeeded: options.deployment_succeeded,
            inference_succeeded: options.inference_succeeded,
            tested_instance_type: options.tested_instance_type.clone(),
            placeholders,
        },
    })
}

fn framework_entry(
    config: &MergedConfiguration,
    options: &ExportOptions,
    level: ValidationLevel,
) -> Value {
    let framework = non_empty(config.selections.framework.as_deref(), PLACEHOLDER_FRAMEWORK);
    let version = config
        .selections
        .framework_version
        .as_deref()
        .or(config.matched_version.as_deref());
    let version = non_empty(version, PLACEHOLDER_VERSION);

    let accelerator = match &config.accelerator {
        Some(requirement) => {
            let mut accelerator = json!({
                "type": requirement.kind.as_str(),
                "version": requirement
                    .version
                    .as_deref()
                    .unwrap_or(PLACEHOLDER_ACCELERATOR_VERSION),
            });
            if let Some(range) = &requirement.version_range {
                accelerator["versionRange"] = json!(range);
            }
            accelerator
        }
        None => json!({
            "type": PLACEHOLDER_ACCELERATOR_TYPE,
            "version": PLACEHOLDER_ACCELERATOR_VERSION,
        }),
    };

    let mut entry = Map::new();
    entry.insert(
        "baseImage".to_string(),
        json!(non_empty(config.base_image.as_deref(), PLACEHOLDER_BASE_IMAGE)),
    );
    entry.insert("accelerator".to_string(), accelerator);
    entry.insert("envVars".to_string(), json!(config.env_vars));
    if let Some(ami) = &config.inference_ami_version {
        entry.insert("inferenceAmiVersion".to_string(), json!(ami));
    }
    entry.insert(
        "recommendedInstanceTypes".to_string(),
        json!(recommended_instance_types(config, options)),
    );
    entry.insert("validationLevel".to_string(), json!(level));
    if let Some(notes) = &options.notes {
        entry.insert("notes".to_string(), json!(notes));
    }

    keyed(framework, keyed(version, Value::Object(entry)))
}

fn model_entry(
    config: &MergedConfiguration,
    options: &ExportOptions,
    level: ValidationLevel,
) -> Value {
    let model_id = config.selections.model_id.as_deref().unwrap_or_default();

    let mut compatibility = Map::new();
    if let Some(framework) = config.selections.framework.as_deref() {
        let version = config
            .selections
            .framework_version
            .as_deref()
            .or(config.matched_version.as_deref());
        let constraint = match version {
            Some(version) => format!(">={version}"),
            None => "*".to_string(),
        };
        compatibility.insert(framework.to_string(), json!(constraint));
    }

    let mut entry = Map::new();
    entry.insert(
        "family".to_string(),
        json!(non_empty(config.model_family.as_deref(), PLACEHOLDER_MODEL_FAMILY)),
    );
    entry.insert("chatTemplate".to_string(), json!(config.chat_template));
    entry.insert(
        "requiresTemplate".to_string(),
        json!(config.requires_template || config.chat_template.is_some()),
    );
    entry.insert("validationLevel".to_string(), json!(level));
    entry.insert(
        "frameworkCompatibility".to_string(),
        Value::Object(compatibility),
    );
    entry.insert("envVars".to_string(), json!(config.env_vars));
    entry.insert(
        "recommendedInstanceTypes".to_string(),
        json!(recommended_instance_types(config, options)),
    );
    if let Some(notes) = &options.notes {
        entry.insert("notes".to_string(), json!(notes));
    }

    keyed(model_id, Value::Object(entry))
}

/// Resolved recommendations, or the tested instance when there are none
fn recommended_instance_types(
    config: &MergedConfiguration,
    options: &ExportOptions,
) -> Vec<String> {
    if !config.recommended_instance_types.is_empty() {
        return config.recommended_instance_types.clone();
    }
    options.tested_instance_type.iter().cloned().collect()
}

fn keyed(key: &str, value: Value) -> Value {
    let mut object = Map::new();
    object.insert(key.to_string(), value);
    Value::Object(object)
}

fn non_empty<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(placeholder)
}

fn submission_instructions(
    registry_type: RegistryType,
    level: ValidationLevel,
    placeholders: &[String],
    options: &ExportOptions,
    rendered: &str,
) -> String {
    let mut steps = vec![
        "Fork the registry repository".to_string(),
        format!("Merge the entry below into {}", registry_type.file_name()),
    ];
    if !placeholders.is_empty() {
        steps.push(format!("Replace the placeholders: {}", placeholders.join(", ")));
    }
    steps.push(match &options.tested_instance_type {
        Some(instance) => format!(
            "Open a pull request noting it was tested on {instance} (validation level: {level})"
        ),
        None => format!(
            "Open a pull request describing how it was tested (validation level: {level})"
        ),
    });

    let numbered: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect();

    format!(
        "To contribute this {registry_type} configuration:\n{}\n\n{rendered}\n",
        numbered.join("\n")
    )
}
