//! Environment variable validation strategies
//!
//! Strategies are independent: each one appends to the shared report and none
//! of them stops the others from running.

use crate::registry::{CommunityReport, EnvVarRules, EnvVars, FlagSpec, FlagType};
use crate::version::satisfies;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const KNOWN_FLAGS_STRATEGY: &str = "known-flags";
pub const COMMUNITY_REPORTS_STRATEGY: &str = "community-reports";
pub const DOCKER_INTROSPECTION_STRATEGY: &str = "docker-introspection";

/// Which strategies to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvValidationOptions {
    pub use_known_flags: bool,
    pub use_community_reports: bool,
    pub use_docker_introspection: bool,
}

impl Default for EnvValidationOptions {
    fn default() -> Self {
        Self {
            use_known_flags: true,
            use_community_reports: true,
            use_docker_introspection: false,
        }
    }
}

/// Framework the variables are destined for
#[derive(Debug, Clone, Copy)]
pub struct EnvVarTarget<'a> {
    pub framework: &'a str,
    pub version: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub strategies_used: Vec<String>,
}

impl EnvVarValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run every enabled strategy against `env_vars`
pub fn validate(
    env_vars: &EnvVars,
    target: EnvVarTarget<'_>,
    options: EnvValidationOptions,
    rules: &EnvVarRules,
) -> EnvVarValidationReport {
    let mut report = EnvVarValidationReport::default();

    if options.use_known_flags {
        let flags = rules.known_flags.get(target.framework);
        if flags.is_none() {
            tracing::debug!(framework = %target.framework, "No known flags registered");
        }
        check_known_flags(env_vars, flags, &mut report);
        report.strategies_used.push(KNOWN_FLAGS_STRATEGY.to_string());
    }

    if options.use_community_reports {
        let reports = rules
            .community_reports
            .get(target.framework)
            .map(Vec::as_slice)
            .unwrap_or_default();
        check_community_reports(env_vars, target.version, reports, &mut report);
        report
            .strategies_used
            .push(COMMUNITY_REPORTS_STRATEGY.to_string());
    }

    if options.use_docker_introspection {
        report.warnings.push(
            "Docker image introspection is experimental and not yet available; no image checks were run"
                .to_string(),
        );
        report
            .strategies_used
            .push(DOCKER_INTROSPECTION_STRATEGY.to_string());
    }

    tracing::debug!(
        framework = %target.framework,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        strategies = ?report.strategies_used,
        "Environment variables validated"
    );

    report
}

fn check_known_flags(
    env_vars: &EnvVars,
    flags: Option<&BTreeMap<String, FlagSpec>>,
    report: &mut EnvVarValidationReport,
) {
    let Some(flags) = flags else {
        return;
    };

    for (name, value) in env_vars {
        let Some(spec) = flags.get(name) else {
            continue;
        };

        if spec.deprecated {
            report.warnings.push(match &spec.replacement {
                Some(replacement) => format!("{name} is deprecated; use {replacement} instead"),
                None => format!("{name} is deprecated"),
            });
        }

        check_flag_value(name, value, spec, report);
    }
}

fn check_flag_value(name: &str, value: &str, spec: &FlagSpec, report: &mut EnvVarValidationReport) {
    let raw = value.trim();

    let numeric = match spec.kind {
        FlagType::Integer => match raw.parse::<i64>() {
            Ok(n) => Some(n as f64),
            Err(_) => {
                report.errors.push(type_error(name, value, spec.kind));
                return;
            }
        },
        FlagType::Float => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                report.errors.push(type_error(name, value, spec.kind));
                return;
            }
        },
        FlagType::Boolean => {
            if parse_bool(raw).is_none() {
                report.errors.push(type_error(name, value, spec.kind));
                return;
            }
            None
        }
        FlagType::String => None,
    };

    if let Some(n) = numeric {
        if let Some(min) = spec.min
            && n < min
        {
            report
                .errors
                .push(format!("{name}={value} is out of range; must be >= {min}"));
        }
        if let Some(max) = spec.max
            && n > max
        {
            report
                .errors
                .push(format!("{name}={value} is out of range; must be <= {max}"));
        }
    }

    if !spec.allowed_values.is_empty() && !spec.allowed_values.iter().any(|v| v == raw) {
        report.errors.push(format!(
            "{name}={value} is not an allowed value (expected one of: {})",
            spec.allowed_values.join(", ")
        ));
    }
}

fn type_error(name: &str, value: &str, kind: FlagType) -> String {
    format!("{name}={value} is not a valid {kind} value")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn check_community_reports(
    env_vars: &EnvVars,
    version: Option<&str>,
    reports: &[CommunityReport],
    report: &mut EnvVarValidationReport,
) {
    for entry in reports {
        if !env_vars.contains_key(&entry.env_var) {
            continue;
        }

        // Reports scoped to versions we cannot evaluate still apply
        let applies = match (&entry.versions, version) {
            (Some(constraint), Some(version)) => satisfies(version, constraint).unwrap_or(true),
            _ => true,
        };

        if applies {
            report.warnings.push(format!(
                "Community report for {}: {}",
                entry.env_var, entry.message
            ));
        }
    }
}
