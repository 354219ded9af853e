//! Registry record types
//!
//! These mirror the JSON registry documents (camelCase keys). Every field is
//! optional or defaulted so that incomplete entries load as "absent data" instead
//! of rejecting the whole document.

use super::ordered::OrderedMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Environment variables, name to value
pub type EnvVars = BTreeMap<String, String>;

/// framework name -> version key -> config
pub type FrameworkRegistry = BTreeMap<String, BTreeMap<String, FrameworkConfig>>;

/// model id or wildcard pattern -> config, in document order
pub type ModelRegistry = OrderedMap<ModelConfig>;

/// instance type -> accelerator capability
pub type InstanceAcceleratorMapping = BTreeMap<String, InstanceAccelerator>;

/// framework name -> env var name -> flag spec
pub type KnownFlagRegistry = BTreeMap<String, BTreeMap<String, FlagSpec>>;

/// framework name -> community reports about env vars
pub type CommunityReports = BTreeMap<String, Vec<CommunityReport>>;

/// Hardware family an image is built for or an instance provides
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AcceleratorType {
    Cuda,
    Neuron,
    Rocm,
    Cpu,
    /// Any family without a dedicated validator
    Other(String),
}

impl AcceleratorType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cuda => "cuda",
            Self::Neuron => "neuron",
            Self::Rocm => "rocm",
            Self::Cpu => "cpu",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for AcceleratorType {
    fn from(value: String) -> Self {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "cuda" => Self::Cuda,
            "neuron" => Self::Neuron,
            "rocm" => Self::Rocm,
            "cpu" => Self::Cpu,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for AcceleratorType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AcceleratorType> for String {
    fn from(value: AcceleratorType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AcceleratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How thoroughly a configuration has been verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationLevel {
    Tested,
    CommunityValidated,
    Experimental,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tested => write!(f, "tested"),
            Self::CommunityValidated => write!(f, "community-validated"),
            Self::Experimental => write!(f, "experimental"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

/// Accelerator a framework image requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceleratorRequirement {
    #[serde(rename = "type")]
    pub kind: AcceleratorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_range: Option<VersionRange>,
}

impl AcceleratorRequirement {
    /// Version the instance must satisfy, falling back to the range minimum
    pub fn required_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.version_range.as_ref()?.min.as_deref())
    }
}

/// Named override bundle under a framework or model entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerator: Option<AcceleratorRequirement>,
    #[serde(deserialize_with = "deserialize_env_vars")]
    pub env_vars: EnvVars,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_ami_version: Option<String>,
    pub recommended_instance_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_template: Option<String>,
}

/// Per-version configuration of a serving framework
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameworkConfig {
    pub base_image: Option<String>,
    pub accelerator: Option<AcceleratorRequirement>,
    #[serde(deserialize_with = "deserialize_env_vars")]
    pub env_vars: EnvVars,
    pub inference_ami_version: Option<String>,
    pub recommended_instance_types: Vec<String>,
    pub validation_level: Option<ValidationLevel>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Configuration attached to a model id or model id pattern
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub family: Option<String>,
    pub chat_template: Option<String>,
    pub requires_template: bool,
    pub validation_level: Option<ValidationLevel>,
    /// framework name -> version constraint (e.g. ">=0.4.0")
    pub framework_compatibility: BTreeMap<String, String>,
    #[serde(deserialize_with = "deserialize_env_vars")]
    pub env_vars: EnvVars,
    pub recommended_instance_types: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Accelerator capability of an instance type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAccelerator {
    #[serde(rename = "type")]
    pub kind: AcceleratorType,
    #[serde(default, deserialize_with = "deserialize_scalar_list")]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "number")]
    Float,
    #[serde(alias = "bool")]
    Boolean,
    #[default]
    #[serde(other)]
    String,
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::String => write!(f, "string"),
        }
    }
}

/// Declared shape of a framework environment variable
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlagSpec {
    #[serde(rename = "type")]
    pub kind: FlagType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed_values: Vec<String>,
    pub deprecated: bool,
    pub replacement: Option<String>,
    pub description: Option<String>,
}

/// Field report about an env var misbehaving on some framework versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityReport {
    pub env_var: String,
    pub message: String,
    /// Version constraint the report applies to; all versions when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<String>,
}

/// Rule data consumed by env var validation
#[derive(Debug, Clone, Default)]
pub struct EnvVarRules {
    pub known_flags: KnownFlagRegistry,
    pub community_reports: CommunityReports,
}

/// Every registry the resolution pipeline reads
#[derive(Debug, Clone, Default)]
pub struct Registries {
    pub frameworks: FrameworkRegistry,
    pub models: ModelRegistry,
    pub instances: InstanceAcceleratorMapping,
    pub env_var_rules: EnvVarRules,
}

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept numbers and booleans as env var values; drop nulls and nested values
fn deserialize_env_vars<'de, D>(deserializer: D) -> Result<EnvVars, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
        .collect())
}

fn deserialize_scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(scalar_to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accelerator_type_from_string() {
        assert_eq!(AcceleratorType::from("CUDA"), AcceleratorType::Cuda);
        assert_eq!(AcceleratorType::from("neuron"), AcceleratorType::Neuron);
        assert_eq!(
            AcceleratorType::from("tpu"),
            AcceleratorType::Other("tpu".to_string())
        );
        assert_eq!(AcceleratorType::from(" TPU "), AcceleratorType::from("tpu"));
        assert_eq!(AcceleratorType::Rocm.to_string(), "rocm");
    }

    #[test]
    fn test_framework_config_lenient_env_vars() {
        let config: FrameworkConfig = serde_json::from_value(json!({
            "baseImage": "vllm/vllm-openai:v0.4.0",
            "accelerator": { "type": "cuda", "version": "12.1" },
            "envVars": { "MAX_MODEL_LEN": 4096, "TRUST_REMOTE_CODE": true, "SKIP": null },
            "validationLevel": "community-validated"
        }))
        .unwrap();

        assert_eq!(config.env_vars.get("MAX_MODEL_LEN").unwrap(), "4096");
        assert_eq!(config.env_vars.get("TRUST_REMOTE_CODE").unwrap(), "true");
        assert!(!config.env_vars.contains_key("SKIP"));
        assert_eq!(
            config.validation_level,
            Some(ValidationLevel::CommunityValidated)
        );
        assert_eq!(
            config.accelerator.unwrap().kind,
            AcceleratorType::Cuda
        );
    }

    #[test]
    fn test_unknown_validation_level_degrades() {
        let config: FrameworkConfig =
            serde_json::from_value(json!({ "validationLevel": "gold-star" })).unwrap();
        assert_eq!(config.validation_level, Some(ValidationLevel::Unknown));
    }

    #[test]
    fn test_instance_versions_accept_numbers() {
        let instance: InstanceAccelerator =
            serde_json::from_value(json!({ "type": "cuda", "versions": [12.1, "12.2"] }))
                .unwrap();
        assert_eq!(instance.versions, vec!["12.1", "12.2"]);
    }

    #[test]
    fn test_required_version_falls_back_to_range_min() {
        let requirement = AcceleratorRequirement {
            kind: AcceleratorType::Neuron,
            version: None,
            version_range: Some(VersionRange {
                min: Some("2.18".to_string()),
                max: None,
            }),
        };
        assert_eq!(requirement.required_version(), Some("2.18"));
    }

    #[test]
    fn test_flag_type_aliases() {
        let spec: FlagSpec =
            serde_json::from_value(json!({ "type": "int", "max": 128 })).unwrap();
        assert_eq!(spec.kind, FlagType::Integer);
        assert_eq!(spec.max, Some(128.0));

        let spec: FlagSpec = serde_json::from_value(json!({ "type": "duration" })).unwrap();
        assert_eq!(spec.kind, FlagType::String);
    }

    #[test]
    fn test_validation_level_display() {
        assert_eq!(ValidationLevel::Tested.to_string(), "tested");
        assert_eq!(
            ValidationLevel::CommunityValidated.to_string(),
            "community-validated"
        );
        assert_eq!(ValidationLevel::Experimental.to_string(), "experimental");
        assert_eq!(ValidationLevel::Unknown.to_string(), "unknown");
    }
}
