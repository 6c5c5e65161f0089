//! Loader protocol types
//!
//! The loader command receives one JSON request line on stdin and answers
//! with one JSON response line on stdout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{NamespaceName, Operation};

/// A message sent to the loader command
#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest {
    pub operation: Operation,

    pub namespace: NamespaceName,

    /// Absolute path of the source unit
    pub path: PathBuf,

    /// Declared dependencies, tracked and external
    pub requires: Vec<NamespaceName>,
}

/// A response from the loader command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadResponse {
    pub success: bool,

    /// Error message (if failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}
