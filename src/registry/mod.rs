//! Registry data model and loading
//!
//! Provides:
//! - Record types for framework, model and instance registries
//! - Env var rule data (known flags, community reports)
//! - Loaders that read registries from disk or memory

pub mod loader;
pub mod ordered;
pub mod types;

pub use loader::{FileRegistryLoader, InMemoryRegistryLoader, RegistryLoader};
pub use ordered::OrderedMap;
pub use types::{
    AcceleratorRequirement, AcceleratorType, CommunityReport, CommunityReports, EnvVarRules,
    EnvVars, FlagSpec, FlagType, FrameworkConfig, FrameworkRegistry, InstanceAccelerator,
    InstanceAcceleratorMapping, KnownFlagRegistry, ModelConfig, ModelRegistry, Profile,
    Registries, ValidationLevel, VersionRange,
};
