//! Stack configuration.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a persistence stack.
///
/// Everything has a sensible default; hosts typically deserialize this from
/// their own config surface and hand it to
/// [`crate::stack::PersistenceStack::with_config`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// Override for the directory holding name-derived store files. When
    /// unset, the platform data directory is used.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Logging configuration, consumed by [`crate::logging::init_logging`].
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform data directory for name-derived store locations
/// (e.g. `~/.local/share/strata` on Linux).
pub fn default_store_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "strata").map(|dirs| dirs.data_dir().to_path_buf())
}
