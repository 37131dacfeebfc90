//! Plugin contract for the Wyrmhole host.
//!
//! This crate provides:
//! - The [`Plugin`] capability trait the dispatch loop forwards into
//! - The [`HostFunctions`] a plugin uses to talk back to the extension
//! - The [`PluginLoader`] contract plus two loaders: an in-process
//!   [`PluginRegistry`] and an [`ExecPluginLoader`] that runs plugins as
//!   child processes
//!
//! # Exec plugins
//!
//! Exec plugins read JSON lines on stdin and write JSON lines on stdout:
//!
//! ```text
//! host   -> {"type":"init","protocol_version":1}
//! plugin <- {"type":"ready","name":"My Plugin","protocol_version":1}
//! host   -> {"type":"cmd","colonyId":0,"cmdId":1,"msg":"[\"New\",{}]"}
//! plugin <- {"type":"resp","colonyId":0,"cmdId":1,"msg":"{\"ok\":true}"}
//! host   -> {"type":"shutdown"}
//! ```
//!
//! Lines a plugin writes after `ready` are relayed to the extension through
//! the host's async call queue, so they never race the dispatch loop.

mod exec;
mod plugin;
pub mod protocol;
mod registry;
mod task;

pub use exec::{ExecPlugin, ExecPluginLoader};
pub use plugin::{HostError, HostFunctions, Plugin, PluginError, PluginLoader};
pub use protocol::{HostMessage, PluginMessage, PROTOCOL_VERSION};
pub use registry::PluginRegistry;
pub use task::AsyncCall;
