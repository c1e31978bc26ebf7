//! # Resolution Errors
//!
//! Every failure of a reference is classified into one variant; control flow
//! only ever inspects the variant, never the message.

use super::path::PathError;
use crate::discovery::LocatorError;
use crate::transformers::TransformError;
use thiserror::Error;

/// What the reconciler does with a failed resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Mark the Composable Failed and wait for a user edit
    Fail,
    /// Mark the Composable Pending and requeue with backoff
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Malformed directive (missing kind/path, name xor labels violated, not the sole key, ...)
    #[error("{0}, Object reference is ill-formed")]
    IllFormedReference(String),

    /// The API resource of the referenced kind could not be determined
    #[error("{0}, Error resolving the kind for an object reference")]
    KindNotFound(String),

    /// Get returned 404, or a label selector did not match exactly one object
    #[error("{0}, Error finding an object reference")]
    ObjectNotFound(String),

    /// The path addressed nothing in the referenced object
    #[error("{0}, Error finding a value in an object reference")]
    ValueNotFound(String),

    /// A transformer could not convert the extracted value
    #[error("{0}, Error transforming the value of an object reference")]
    Transform(String),

    /// The API server failed for a reason other than not-found
    #[error("{0}, Error reading an object reference")]
    Api(String),
}

impl ResolveError {
    /// Reconcile disposition for this failure
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            ResolveError::IllFormedReference(_)
            | ResolveError::KindNotFound(_)
            | ResolveError::Transform(_) => Disposition::Fail,
            ResolveError::ObjectNotFound(_)
            | ResolveError::ValueNotFound(_)
            | ResolveError::Api(_) => Disposition::Retry,
        }
    }

    /// True when a `defaultValue` on the reference may stand in for the value
    ///
    /// An unknown kind never qualifies: the shape of the API could not be
    /// established, so it is a configuration error rather than an absence.
    #[must_use]
    pub fn accepts_default(&self) -> bool {
        is_object_not_found(self) || is_value_not_found(self)
    }

    /// Metric label for this class
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            ResolveError::IllFormedReference(_) => "ill_formed_reference",
            ResolveError::KindNotFound(_) => "kind_not_found",
            ResolveError::ObjectNotFound(_) => "object_not_found",
            ResolveError::ValueNotFound(_) => "value_not_found",
            ResolveError::Transform(_) => "transform",
            ResolveError::Api(_) => "api",
        }
    }
}

#[must_use]
pub fn is_ill_formed_reference(err: &ResolveError) -> bool {
    matches!(err, ResolveError::IllFormedReference(_))
}

#[must_use]
pub fn is_kind_not_found(err: &ResolveError) -> bool {
    matches!(err, ResolveError::KindNotFound(_))
}

#[must_use]
pub fn is_object_not_found(err: &ResolveError) -> bool {
    matches!(err, ResolveError::ObjectNotFound(_))
}

#[must_use]
pub fn is_value_not_found(err: &ResolveError) -> bool {
    matches!(err, ResolveError::ValueNotFound(_))
}

/// Any of the three "not found" classes
#[must_use]
pub fn is_ref_not_found(err: &ResolveError) -> bool {
    is_kind_not_found(err) || is_object_not_found(err) || is_value_not_found(err)
}

impl From<LocatorError> for ResolveError {
    fn from(err: LocatorError) -> Self {
        ResolveError::KindNotFound(err.to_string())
    }
}

impl From<TransformError> for ResolveError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::UnknownTransformer(_) => {
                ResolveError::IllFormedReference(err.to_string())
            }
            _ => ResolveError::Transform(err.to_string()),
        }
    }
}

impl From<PathError> for ResolveError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Parse { .. } => ResolveError::IllFormedReference(err.to_string()),
            PathError::NotFound(_) => ResolveError::ValueNotFound(err.to_string()),
        }
    }
}
