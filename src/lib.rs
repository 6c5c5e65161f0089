//! nstools - namespace dependency tracking and selective reload
//!
//! Scans source directories for namespace declarations, keeps a dependency
//! graph between them, and when sources change unloads the changed namespaces
//! and everything depending on them before reloading them in dependency order.
//!
//! The [`domain`] module holds the tracker itself and has no I/O. [`storage`]
//! reads sources and persists state, [`runtime`] talks to the host runtime,
//! and [`cli`] ties them together.

pub mod cli;
pub mod domain;
pub mod runtime;
pub mod storage;

pub use domain::{CancelToken, DependencyGraph, Loader, NamespaceName, Registry, SourceProvider};
