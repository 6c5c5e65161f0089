//! # Runtime
//!
//! Loader implementations that connect the tracker to a host runtime.
//!
//! The only bundled loader is [`CommandLoader`], which talks to an external
//! process using the JSON line protocol in [`protocol`]. Embedders implement
//! [`crate::domain::Loader`] directly.

mod command;
pub mod protocol;

pub use command::CommandLoader;
pub use protocol::{LoadRequest, LoadResponse};
