//! # Custom Resource Definitions
//!
//! CRD types for the Composable controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `Composable` resource and its template
//! - `status.rs` - Status types for tracking reconciliation state

mod spec;
mod status;

pub use spec::{Composable, ComposableSpec};
pub use status::{ComposableState, ComposableStatus};
