//! Namespace nodes and their load state

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::decl::NsDecl;
use super::name::NamespaceName;

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("Invalid load state transition for {name}: {from} -> {to}")]
    InvalidTransition {
        name: NamespaceName,
        from: LoadState,
        to: LoadState,
    },
}

/// Load state of a namespace in the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error,
}

impl LoadState {
    /// Returns true if moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: LoadState) -> bool {
        use LoadState::*;
        matches!(
            (self, next),
            (Unloaded, Loading)
                | (Loading, Loaded)
                | (Loading, Error)
                | (Loaded, Unloaded)
                | (Error, Loading)
                | (Error, Unloaded)
        )
    }

    /// Returns true if the runtime may hold definitions for this namespace
    pub fn is_resident(self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Error => "error",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque change marker for a source unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fingerprint of file contents (blake3 hex digest)
    pub fn of_content(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scanned source unit: where it lives, what it declares, and its fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub decl: NsDecl,
    pub fingerprint: Fingerprint,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, decl: NsDecl, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            decl,
            fingerprint,
        }
    }
}

/// A tracked namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceNode {
    /// Unique namespace name
    pub name: NamespaceName,

    /// Declared dependencies (tracked and external)
    pub requires: BTreeSet<NamespaceName>,

    /// Source file the namespace was read from
    pub path: PathBuf,

    /// Fingerprint of the source at last scan
    pub fingerprint: Fingerprint,

    /// When the namespace last finished loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub state: LoadState,

    /// False when reload is disabled for this namespace
    #[serde(default = "default_true")]
    pub reload: bool,

    /// False when unload is disabled for this namespace
    #[serde(default = "default_true")]
    pub unload: bool,
}

fn default_true() -> bool {
    true
}

impl NamespaceNode {
    /// Creates an unloaded node from a scanned unit
    pub fn from_unit(unit: &SourceUnit) -> Self {
        Self {
            name: unit.decl.name.clone(),
            requires: unit.decl.requires(),
            path: unit.path.clone(),
            fingerprint: unit.fingerprint.clone(),
            loaded_at: None,
            state: LoadState::Unloaded,
            reload: unit.decl.reload,
            unload: unit.decl.unload,
        }
    }

    /// Refreshes declaration data from a rescan, keeping load state
    pub fn update_from(&mut self, unit: &SourceUnit) {
        self.requires = unit.decl.requires();
        self.path = unit.path.clone();
        self.fingerprint = unit.fingerprint.clone();
        self.reload = unit.decl.reload;
        self.unload = unit.decl.unload;
    }

    /// Moves to `next`, rejecting transitions the state machine forbids
    pub fn transition(&mut self, next: LoadState) -> Result<(), StateError> {
        if !self.state.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                name: self.name.clone(),
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        match next {
            LoadState::Loaded => self.loaded_at = Some(Utc::now()),
            LoadState::Unloaded => self.loaded_at = None,
            _ => {}
        }
        Ok(())
    }
}
