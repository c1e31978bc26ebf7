//! Composable Controller Library
//!
//! Core functionality of the Composable controller: the `Composable` CRD,
//! reference resolution, and the reconciler that creates the underlying objects.
//!
//! ## Quick Start
//!
//! ```rust
//! use composable_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod discovery;
pub mod observability;
pub mod prelude;
pub mod resolver;
pub mod runtime;
pub mod store;
pub mod transformers;
