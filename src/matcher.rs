//! Registry matching
//!
//! Resolves a (framework, version) pair or a model id to a registry entry.
//! Framework versions fall back to the nearest parseable version; model ids fall
//! back to wildcard patterns, scanned in registry document order.

use crate::registry::{FrameworkConfig, FrameworkRegistry, ModelConfig, ModelRegistry};
use crate::version::{Version, distance};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a registry entry was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Pattern,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// A registry entry together with how it was matched
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a, T> {
    pub config: &'a T,
    pub match_type: MatchType,
    /// Registry key that matched (version key or model pattern)
    pub matched_key: &'a str,
    /// What the caller asked for
    pub requested_key: String,
}

/// Matches selections against loaded registries
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationMatcher<'a> {
    frameworks: &'a FrameworkRegistry,
    models: &'a ModelRegistry,
}

impl<'a> ConfigurationMatcher<'a> {
    pub fn new(frameworks: &'a FrameworkRegistry, models: &'a ModelRegistry) -> Self {
        Self { frameworks, models }
    }

    /// Match a framework version, exactly or by nearest version
    pub fn match_framework(
        &self,
        framework: &str,
        version: &str,
    ) -> Option<MatchResult<'a, FrameworkConfig>> {
        let versions = self.frameworks.get(framework)?;

        if let Some((key, config)) = versions.get_key_value(version) {
            return Some(MatchResult {
                config,
                match_type: MatchType::Exact,
                matched_key: key.as_str(),
                requested_key: version.to_string(),
            });
        }

        let Some(target) = Version::parse(version) else {
            tracing::debug!(
                framework = %framework,
                version = %version,
                "Requested version is unparsable, no fuzzy match possible"
            );
            return None;
        };

        let (key, config, _) = versions
            .iter()
            .filter_map(|(key, config)| {
                Version::parse(key).map(|candidate| (key, config, distance(&target, &candidate)))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))?;

        tracing::info!(
            framework = %framework,
            requested = %version,
            matched = %key,
            "Using nearest registry version"
        );

        Some(MatchResult {
            config,
            match_type: MatchType::Fuzzy,
            matched_key: key.as_str(),
            requested_key: version.to_string(),
        })
    }

    /// Highest parseable version registered for a framework
    pub fn latest_framework_version(
        &self,
        framework: &str,
    ) -> Option<MatchResult<'a, FrameworkConfig>> {
        let versions = self.frameworks.get(framework)?;
        let (key, config, _) = versions
            .iter()
            .filter_map(|(key, config)| Version::parse(key).map(|v| (key, config, v)))
            .max_by(|a, b| a.2.cmp(&b.2))?;

        Some(MatchResult {
            config,
            match_type: MatchType::Fuzzy,
            matched_key: key.as_str(),
            requested_key: String::new(),
        })
    }

    /// Match a model id exactly, then against patterns in registry order
    pub fn match_model(&self, model_id: &str) -> Option<MatchResult<'a, ModelConfig>> {
        let models: &'a ModelRegistry = self.models;

        if let Some((key, config)) = models.iter().find(|(key, _)| *key == model_id) {
            return Some(MatchResult {
                config,
                match_type: MatchType::Exact,
                matched_key: key,
                requested_key: model_id.to_string(),
            });
        }

        let (key, config) = models
            .iter()
            .find(|(pattern, _)| pattern_matches(pattern, model_id))?;

        tracing::debug!(model_id = %model_id, pattern = %key, "Model matched registry pattern");

        Some(MatchResult {
            config,
            match_type: MatchType::Pattern,
            matched_key: key,
            requested_key: model_id.to_string(),
        })
    }
}

/// Case-insensitive full match of `model_id` against a registry key
///
/// Keys without `*` compare literally; `*` matches any run of characters.
pub fn pattern_matches(pattern: &str, model_id: &str) -> bool {
    if !pattern.contains('*') {
        return pattern.eq_ignore_ascii_case(model_id);
    }

    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match RegexBuilder::new(&format!("^{body}$"))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(model_id),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid model pattern");
            false
        }
    }
}
