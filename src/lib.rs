//! Container Config - Model container configuration resolver
//!
//! Resolves the effective configuration of a model-serving container (base image,
//! accelerator requirements, environment variables, chat template and recommended
//! instance types) from layered registries and the HuggingFace Hub.

pub mod config;
pub mod error;
pub mod hub;
pub mod manager;
pub mod matcher;
pub mod registry;
pub mod validation;
pub mod version;

pub use config::{HubSettings, ResolverConfig};
pub use error::{ResolverError, ResolverResult};
pub use hub::{HubClient, HubModelInfo};
pub use manager::{
    ConfigSource, ConfigurationManager, ExportOptions, ExportResult, MergedConfiguration,
    UserSelections,
};
pub use matcher::{ConfigurationMatcher, MatchResult, MatchType};
pub use registry::{FileRegistryLoader, InMemoryRegistryLoader, Registries, RegistryLoader};
pub use validation::{ValidationEngine, ValidationResult};
pub use version::Version;
