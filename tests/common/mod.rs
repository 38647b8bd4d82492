//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod temp_workspace;

use std::path::Path;
use std::time::Duration;

use codegraph::config::ImportConfig;

// Re-export for convenience
pub use temp_workspace::TestWorkspace;

/// Import configuration used by the end-to-end tests.
///
/// CI environments need longer timeouts due to slower hardware and more
/// concurrent processes.
pub fn base_config(root: &Path) -> ImportConfig {
    let mut config = ImportConfig::new(root, "rust-analyzer");
    // The diagnostics phase deliberately waits one timeout window, so an
    // over-generous timeout makes every test linger.
    config.timeout = if std::env::var("CI").is_ok() {
        Duration::from_secs(20)
    } else {
        Duration::from_secs(10)
    };
    config
}
