//! # Composable Status
//!
//! Status types for tracking reconciliation state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a Composable
///
/// An unset state (`None` on the status) means the controller never looked at
/// the resource yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ComposableState {
    /// Waiting on something (first reconcile, or a referenced object/value is missing)
    Pending,
    /// Underlying object was created or updated successfully
    Online,
    /// The template or one of its references is broken; needs a user edit
    Failed,
}

impl ComposableState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComposableState::Pending => "Pending",
            ComposableState::Online => "Online",
            ComposableState::Failed => "Failed",
        }
    }
}

impl fmt::Display for ComposableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the Composable resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComposableStatus {
    /// Current state: Pending, Online or Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ComposableState>,
    /// Human-readable diagnostic: the error text, or a timestamp on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComposableStatus {
    #[must_use]
    pub fn new(state: ComposableState, message: impl Into<String>) -> Self {
        Self {
            state: Some(state),
            message: Some(message.into()),
        }
    }

    /// True when neither state nor message was ever written
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.state.is_none() && self.message.is_none()
    }
}
