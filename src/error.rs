//! Error types for the resolution pipeline
//!
//! Expected-bad input (unknown frameworks, unreachable hub, malformed registry
//! entries) never surfaces here; it degrades to `None` or a permissive
//! [`ValidationResult`](crate::validation::ValidationResult). These variants cover
//! misuse of the API and registry I/O that the manager turns into empty mappings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    /// An operation needed registries before `load_registries()` ran
    #[error("registries have not been loaded; call load_registries() first")]
    RegistriesNotLoaded,

    /// Registry document could not be read
    #[error("failed to read registry file {path:?}: {source}")]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry document is not valid JSON for its schema
    #[error("failed to parse registry file {path:?}: {source}")]
    RegistryParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// User selections are structurally invalid
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Remote metadata client was configured with unusable settings
    #[error("invalid hub client configuration: {0}")]
    InvalidHubConfig(String),

    /// HTTP client construction failed
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ResolverResult<T> = Result<T, ResolverError>;
