//! Process exit codes
//!
//! These follow Unix conventions where applicable (124 for timeouts as
//! `timeout(1)` does, 128 + SIGINT for interrupts).

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid configuration document or flags
pub const VALIDATION_ERROR: i32 = 2;

/// Template rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Chart could not be resolved, loaded or rendered
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, output conflicts
pub const IO_ERROR: i32 = 5;

/// Rendered manifests violate the configured policy
pub const MANIFEST_ERROR: i32 = 6;

/// Rendering did not finish within `--timeout`
pub const TIMEOUT: i32 = 124;

/// Interrupted with Ctrl-C
pub const INTERRUPTED: i32 = 130;
