//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default maximum number of Composables reconciled at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default first requeue delay after a retryable failure (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default cap for the requeue delay (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting the controller stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Field manager / controller name used on writes
pub const CONTROLLER_NAME: &str = "composable-controller";

/// Status message written when a Composable is first seen
pub const CREATING_RESOURCE_MESSAGE: &str = "Creating resource";

/// Prefix of the status message when template validation fails
pub const VALIDATION_FAILED_PREFIX: &str = "Request is malformed and failed validation. ";

/// Initial backoff after a throttled (429) controller watch (milliseconds)
pub const WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Cap for the throttled controller watch backoff (milliseconds)
pub const WATCH_BACKOFF_MAX_MS: u64 = 30_000;
