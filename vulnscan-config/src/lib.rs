//! Shared configuration library for vulnscan.
//!
//! This crate centralizes `.env` loading, TOML file discovery, environment
//! overrides, database URL resolution and the guard rails applied to the
//! composed configuration. The `vulnscan` binary builds one [`Config`] at
//! startup and hands it to the server, the worker and the migrator.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::{
    Config, ConfigMetadata, CorsConfig, DatabaseConfig, DispatcherConfig,
    EngineConfig, LauncherConfig, LauncherKind, ReconcilerConfig,
    ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
