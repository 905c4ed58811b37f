//! HTTP front end of the vulnscan control plane.
//!
//! The `vulnscan` binary serves this router, and also hosts the `worker`
//! subcommand that every execution unit runs.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
