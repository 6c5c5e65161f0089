//! Domain models for nstools
//!
//! Namespace declarations, the dependency graph, ordering, change detection
//! and selective reload. No filesystem or process I/O happens here; sources
//! come through [`SourceProvider`] and the runtime through [`Loader`].

mod change;
mod decl;
mod graph;
mod name;
mod node;
mod reader;
mod registry;
mod reload;
mod source;
mod topo;

pub use change::{detect_changes, ChangeSet};
pub use decl::{DeclError, NsDecl, Reference, ReferenceKind, LOAD_FLAG, UNLOAD_FLAG};
pub use graph::{format_cycle, DependencyGraph, GraphError};
pub use name::{NameError, NamespaceName};
pub use node::{Fingerprint, LoadState, NamespaceNode, SourceUnit, StateError};
pub use reader::{read_all, Form, ReadError, ReadOptions, Reader};
pub use registry::{NodeRecord, Refresh, RefreshError, RefreshReport, Registry, Scope, TeardownReport};
pub use reload::{execute, plan_reload, BatchOutcome, CancelToken, LoadError, Loader, Operation, ReloadPlan};
pub use source::{decode_decl, MemoryProvider, SourceError, SourceProvider};
pub use topo::{find_cycles, partition, topological_order, TopoPartition};
