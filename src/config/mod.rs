//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! devsync.toml (optional)
//!     → loader.rs (read & deserialize, or defaults)
//!     → validation.rs (semantic checks)
//!     → DevConfig (validated, immutable)
//!     → sections handed to launcher, proxy and watcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults so an absent file is a valid setup
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError, DEFAULT_CONFIG_FILE};
pub use schema::{
    DevConfig, ObservabilityConfig, ProxyConfig, ReadinessConfig, ServerConfig, WatchConfig,
};
