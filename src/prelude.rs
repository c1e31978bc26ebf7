//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use composable_controller::prelude::*;
//! ```

// CRD types - most commonly used
pub use crate::crd::*;

// Collaborator traits - implemented by the kube-backed clients and by test fakes
pub use crate::controller::watches::WatchRegistry;
pub use crate::discovery::ResourceDiscovery;
pub use crate::store::ObjectStore;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, reconcile_composable, BackoffState, Reconciler, ReconcilerError,
};

// Resolution
pub use crate::resolver::{Disposition, ResolveError, Resolver};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, SharedControllerConfig};
