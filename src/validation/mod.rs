//! Compatibility and environment validation
//!
//! Nothing here blocks a deployment on its own: results describe compatibility
//! and leave the decision to the caller. Missing data is reported as compatible
//! with an explanatory warning or info message.

pub mod accelerator;
pub mod env_vars;

pub use accelerator::{
    AcceleratorValidator, CpuValidator, CudaValidator, NeuronValidator, RocmValidator,
};
pub use env_vars::{EnvValidationOptions, EnvVarTarget, EnvVarValidationReport};

use crate::registry::{
    AcceleratorType, EnvVarRules, EnvVars, FrameworkConfig, InstanceAccelerator,
    InstanceAcceleratorMapping,
};
use serde::{Deserialize, Serialize};

/// Outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub compatible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn compatible() -> Self {
        Self {
            compatible: true,
            ..Default::default()
        }
    }

    pub fn incompatible(error: impl Into<String>) -> Self {
        Self {
            compatible: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

/// Aggregates accelerator validators and env var strategies
pub struct ValidationEngine {
    validators: Vec<Box<dyn AcceleratorValidator>>,
}

impl ValidationEngine {
    /// Engine with the built-in CUDA, Neuron, ROCm and CPU validators
    pub fn new() -> Self {
        Self {
            validators: accelerator::default_validators(),
        }
    }

    /// Register an additional validator; it replaces any built-in one for its family
    pub fn with_validator(mut self, validator: Box<dyn AcceleratorValidator>) -> Self {
        let kind = validator.accelerator_type();
        self.validators.retain(|v| v.accelerator_type() != kind);
        self.validators.push(validator);
        self
    }

    fn validator_for(&self, kind: &AcceleratorType) -> Option<&dyn AcceleratorValidator> {
        self.validators
            .iter()
            .find(|v| v.accelerator_type() == *kind)
            .map(|v| v.as_ref())
    }

    /// Check whether an instance can run a framework image
    pub fn validate_accelerator_compatibility(
        &self,
        framework: &FrameworkConfig,
        instance: &InstanceAccelerator,
    ) -> ValidationResult {
        let Some(requirement) = framework.accelerator.as_ref() else {
            return ValidationResult::compatible()
                .with_info("Framework declares no accelerator requirement");
        };

        if requirement.kind != instance.kind {
            return ValidationResult::incompatible(format!(
                "Accelerator type mismatch: framework requires {} but instance provides {}",
                requirement.kind, instance.kind
            ));
        }

        match self.validator_for(&requirement.kind) {
            Some(validator) => validator.validate(framework, instance),
            None => ValidationResult::compatible().with_warning(format!(
                "No validator exists for accelerator type '{}'; compatibility not verified",
                requirement.kind
            )),
        }
    }

    /// Instance types able to run `framework`, ranked
    ///
    /// Types the framework itself recommends come first, in its order; the rest
    /// follow in mapping order.
    pub fn get_recommended_instance_types(
        &self,
        framework: &FrameworkConfig,
        mapping: &InstanceAcceleratorMapping,
    ) -> Vec<String> {
        let mut compatible: Vec<&str> = mapping
            .iter()
            .filter(|(_, instance)| {
                self.validate_accelerator_compatibility(framework, instance)
                    .compatible
            })
            .map(|(name, _)| name.as_str())
            .collect();

        let rank = |name: &str| {
            framework
                .recommended_instance_types
                .iter()
                .position(|preferred| preferred == name)
                .unwrap_or(usize::MAX)
        };
        // Stable sort keeps mapping order among unranked types
        compatible.sort_by_key(|name| rank(name));

        compatible.into_iter().map(str::to_string).collect()
    }

    /// Run the enabled env var strategies
    pub fn validate_environment_variables(
        &self,
        env_vars: &EnvVars,
        target: EnvVarTarget<'_>,
        options: EnvValidationOptions,
        rules: &EnvVarRules,
    ) -> EnvVarValidationReport {
        env_vars::validate(env_vars, target, options, rules)
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AcceleratorRequirement;
    use std::collections::BTreeMap;

    fn framework(kind: &str, version: &str) -> FrameworkConfig {
        FrameworkConfig {
            accelerator: Some(AcceleratorRequirement {
                kind: AcceleratorType::from(kind),
                version: Some(version.to_string()),
                version_range: None,
            }),
            ..Default::default()
        }
    }

    fn instance(kind: &str, versions: &[&str]) -> InstanceAccelerator {
        InstanceAccelerator {
            kind: AcceleratorType::from(kind),
            versions: versions.iter().map(|v| v.to_string()).collect(),
            description: None,
        }
    }

    fn mapping() -> InstanceAcceleratorMapping {
        BTreeMap::from([
            ("ml.g4dn.xlarge".to_string(), instance("cuda", &["11.8"])),
            ("ml.g5.xlarge".to_string(), instance("cuda", &["12.1", "12.2"])),
            ("ml.g6.xlarge".to_string(), instance("cuda", &["12.4"])),
            ("ml.inf2.xlarge".to_string(), instance("neuron", &["2.19"])),
            ("ml.m5.xlarge".to_string(), instance("cpu", &[])),
        ])
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let engine = ValidationEngine::new();
        let result = engine.validate_accelerator_compatibility(
            &framework("cuda", "12.1"),
            &instance("neuron", &["2.19"]),
        );
        assert!(!result.compatible);
        let error = result.error.unwrap();
        assert!(error.contains("cuda"));
        assert!(error.contains("neuron"));
    }

    #[test]
    fn test_unknown_type_is_permissive_with_warning() {
        let engine = ValidationEngine::new();
        let result = engine.validate_accelerator_compatibility(
            &framework("tpu", "5"),
            &instance("tpu", &["4"]),
        );
        assert!(result.compatible);
        assert!(result.warning.unwrap().contains("tpu"));
    }

    #[test]
    fn test_unknown_type_compares_case_insensitively() {
        let engine = ValidationEngine::new();
        let result = engine.validate_accelerator_compatibility(
            &framework("TPU", "5"),
            &instance("tpu", &["5"]),
        );
        assert!(result.compatible);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_no_accelerator_section_is_compatible() {
        let engine = ValidationEngine::new();
        let result = engine.validate_accelerator_compatibility(
            &FrameworkConfig::default(),
            &instance("cuda", &["12.1"]),
        );
        assert!(result.compatible);
        assert!(result.info.is_some());
    }

    #[test]
    fn test_recommended_instance_types_filters_and_ranks() {
        let engine = ValidationEngine::new();
        let mut config = framework("cuda", "12.1");
        config.recommended_instance_types = vec!["ml.g6.xlarge".to_string()];

        let recommended = engine.get_recommended_instance_types(&config, &mapping());
        assert_eq!(recommended, vec!["ml.g6.xlarge", "ml.g5.xlarge"]);
    }

    #[test]
    fn test_recommended_instance_types_may_be_empty() {
        let engine = ValidationEngine::new();
        let recommended =
            engine.get_recommended_instance_types(&framework("rocm", "6.1"), &mapping());
        assert!(recommended.is_empty());

        let recommended = engine.get_recommended_instance_types(
            &framework("cuda", "12.1"),
            &InstanceAcceleratorMapping::new(),
        );
        assert!(recommended.is_empty());
    }

    #[test]
    fn test_custom_validator_replaces_builtin() {
        struct StrictCpu;
        impl AcceleratorValidator for StrictCpu {
            fn accelerator_type(&self) -> AcceleratorType {
                AcceleratorType::Cpu
            }
            fn validate(&self, _: &FrameworkConfig, _: &InstanceAccelerator) -> ValidationResult {
                ValidationResult::incompatible("no")
            }
            fn version_mismatch_message(&self, _: &str, _: &[String]) -> String {
                String::new()
            }
        }

        let engine = ValidationEngine::new().with_validator(Box::new(StrictCpu));
        let result = engine
            .validate_accelerator_compatibility(&framework("cpu", "1"), &instance("cpu", &[]));
        assert!(!result.compatible);
    }

    #[test]
    fn test_validation_result_serializes_camel_case() {
        let result = ValidationResult::incompatible("bad")
            .with_recommendations(vec!["ml.g5.xlarge".to_string()]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["compatible"], false);
        assert_eq!(json["recommendations"][0], "ml.g5.xlarge");
        assert!(json.get("warning").is_none());
    }
}
