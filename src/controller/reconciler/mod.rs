//! # Reconciler
//!
//! Core reconciliation logic for `Composable` resources.
//!
//! The reconciler:
//! - Validates the embedded template (unless an admission webhook already does)
//! - Resolves every `getValueFrom` reference in the template
//! - Creates the underlying object, or updates it when it drifted
//! - Updates resource status with the result
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the Composable (a deleted one is a no-op)
//! 2. Mark a fresh Composable `Pending`
//! 3. Validate and resolve the template
//!    - broken template or unknown kind: `Failed`, not retried
//!    - missing object or value: `Pending`, retried with backoff
//! 4. Create or update the underlying object and watch its kind
//! 5. Mark the Composable `Online`

pub mod reconcile;
pub mod status;
pub mod types;
pub mod underlying;
pub mod validation;

// Re-export public API
pub use reconcile::{reconcile, reconcile_composable};
pub use types::{resource_key, BackoffState, Reconciler, ReconcilerError};
pub use underlying::{UnderlyingError, UnderlyingOutcome};
pub use validation::{validate_template, FieldError, FieldErrorType, ValidationError};
