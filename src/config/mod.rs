//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayNodeConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the server, which swaps relay settings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes arrive as a whole new value
//! - All fields have defaults to allow minimal configs
//! - The bind address is read once at startup; reloads do not rebind

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DirectoryConfig, ListenerConfig, ObservabilityConfig, RelayConfig, RelayNodeConfig,
    TimeoutConfig,
};
