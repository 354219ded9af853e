//! Per-family accelerator compatibility checks
//!
//! GPU and Neuron runtimes are backward compatible within a major version, so a
//! requirement of `12.1` is met by any `12.x` with `x >= 1`. CPU images run
//! anywhere.

use super::ValidationResult;
use crate::registry::{AcceleratorType, FrameworkConfig, InstanceAccelerator};
use crate::version::Version;

/// Compatibility predicate for one accelerator family
pub trait AcceleratorValidator: Send + Sync {
    /// Family this validator handles
    fn accelerator_type(&self) -> AcceleratorType;

    /// Check a framework's requirement against an instance's capability
    fn validate(
        &self,
        framework: &FrameworkConfig,
        instance: &InstanceAccelerator,
    ) -> ValidationResult;

    /// User-facing guidance when no provided version satisfies `required`
    fn version_mismatch_message(&self, required: &str, provided: &[String]) -> String;
}

pub struct CudaValidator;
pub struct NeuronValidator;
pub struct RocmValidator;
pub struct CpuValidator;

impl AcceleratorValidator for CudaValidator {
    fn accelerator_type(&self) -> AcceleratorType {
        AcceleratorType::Cuda
    }

    fn validate(
        &self,
        framework: &FrameworkConfig,
        instance: &InstanceAccelerator,
    ) -> ValidationResult {
        validate_major_minor(self, "CUDA", framework, instance)
    }

    fn version_mismatch_message(&self, required: &str, provided: &[String]) -> String {
        format!(
            "Framework requires CUDA {required}, but the instance provides CUDA {}. \
             CUDA is only backward compatible within a major version; choose an instance \
             with CUDA {}, such as the ml.g5 or ml.g6 families.",
            format_versions(provided),
            minimum_hint(required),
        )
    }
}

impl AcceleratorValidator for NeuronValidator {
    fn accelerator_type(&self) -> AcceleratorType {
        AcceleratorType::Neuron
    }

    fn validate(
        &self,
        framework: &FrameworkConfig,
        instance: &InstanceAccelerator,
    ) -> ValidationResult {
        validate_major_minor(self, "Neuron SDK", framework, instance)
    }

    fn version_mismatch_message(&self, required: &str, provided: &[String]) -> String {
        format!(
            "Framework requires Neuron SDK {required}, but the instance provides Neuron SDK {}. \
             Choose an instance with Neuron SDK {}, such as the ml.inf2 or ml.trn1 families.",
            format_versions(provided),
            minimum_hint(required),
        )
    }
}

impl AcceleratorValidator for RocmValidator {
    fn accelerator_type(&self) -> AcceleratorType {
        AcceleratorType::Rocm
    }

    fn validate(
        &self,
        framework: &FrameworkConfig,
        instance: &InstanceAccelerator,
    ) -> ValidationResult {
        validate_major_minor(self, "ROCm", framework, instance)
    }

    fn version_mismatch_message(&self, required: &str, provided: &[String]) -> String {
        format!(
            "Framework requires ROCm {required}, but the instance provides ROCm {}. \
             Choose an AMD GPU host with ROCm {}.",
            format_versions(provided),
            minimum_hint(required),
        )
    }
}

impl AcceleratorValidator for CpuValidator {
    fn accelerator_type(&self) -> AcceleratorType {
        AcceleratorType::Cpu
    }

    fn validate(&self, _: &FrameworkConfig, _: &InstanceAccelerator) -> ValidationResult {
        ValidationResult::compatible().with_info("CPU images run on any instance type")
    }

    fn version_mismatch_message(&self, _: &str, _: &[String]) -> String {
        String::new()
    }
}

/// Shared rule: same major version and provided minor >= required minor
///
/// A declared `versionRange.max` additionally caps the accepted versions.
fn validate_major_minor(
    validator: &dyn AcceleratorValidator,
    label: &str,
    framework: &FrameworkConfig,
    instance: &InstanceAccelerator,
) -> ValidationResult {
    let Some(requirement) = framework.accelerator.as_ref() else {
        return ValidationResult::compatible().with_info("No accelerator requirement declared");
    };

    let Some(required_raw) = requirement.required_version() else {
        return ValidationResult::compatible()
            .with_info(format!("No {label} version requirement declared"));
    };

    let Some(required) = Version::parse(required_raw) else {
        return ValidationResult::compatible().with_warning(format!(
            "Unparsable {label} version requirement '{required_raw}'; version check skipped"
        ));
    };

    let provided: Vec<Version> = instance
        .versions
        .iter()
        .filter_map(|v| Version::parse(v))
        .collect();

    if provided.is_empty() {
        return ValidationResult::compatible().with_warning(format!(
            "Instance does not report usable {label} versions; assuming compatible"
        ));
    }

    let max = requirement
        .version_range
        .as_ref()
        .and_then(|range| range.max.as_deref())
        .and_then(Version::parse);

    let supported = provided.iter().any(|v| {
        v.major == required.major && v.minor >= required.minor && max.is_none_or(|m| *v <= m)
    });

    if supported {
        ValidationResult::compatible().with_info(format!(
            "{label} {required_raw} is supported by instance versions {}",
            format_versions(&instance.versions)
        ))
    } else {
        ValidationResult::incompatible(
            validator.version_mismatch_message(required_raw, &instance.versions),
        )
    }
}

fn format_versions(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".to_string()
    } else {
        versions.join(", ")
    }
}

fn minimum_hint(required: &str) -> String {
    match Version::parse(required) {
        Some(v) => format!("{}.{}+ (same major version)", v.major, v.minor),
        None => format!("{required} or newer"),
    }
}

/// Validators for every built-in accelerator family
pub fn default_validators() -> Vec<Box<dyn AcceleratorValidator>> {
    vec![
        Box::new(CudaValidator),
        Box::new(NeuronValidator),
        Box::new(RocmValidator),
        Box::new(CpuValidator),
    ]
}
