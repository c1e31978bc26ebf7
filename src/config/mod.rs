//! # Configuration
//!
//! Controller configuration loaded from environment variables.

mod controller;

pub use controller::ControllerConfig;

use std::sync::Arc;

/// Configuration shared between the watch loop, error policy and reconciler
pub type SharedControllerConfig = Arc<ControllerConfig>;
