//! ds_gateway: declarative DataStage job-control gateway.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod cache;
pub mod config;
pub mod datastage;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod registry;
pub mod utils;

/// Return the gateway home directory.
///
/// Resolution order:
/// 1. `DSGATE_HOME` environment variable
/// 2. `$HOME/.dsgate`
pub fn gateway_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("DSGATE_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".dsgate")
    }
}
