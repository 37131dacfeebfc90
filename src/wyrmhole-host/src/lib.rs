//! Dispatch loop and plugin bridge for the Wyrmhole native-messaging host.
//!
//! A reader thread decodes frames from stdin and hands them to the
//! [`LoopHandle`], which reassembles chunks and queues complete messages.
//! [`MainLoop::run`] drains that queue together with the async calls plugins
//! schedule, handing each message to the [`PluginBridge`]. Everything bound
//! for the extension goes through one [`Outbound`] writer.

mod bridge;
mod host_functions;
mod main_loop;
mod outbound;
mod stdio;

pub use bridge::{BridgeState, PluginBridge};
pub use host_functions::HostFunctionTable;
pub use main_loop::{Dispatch, LoopConfig, LoopHandle, LoopStats, MainLoop};
pub use outbound::Outbound;
pub use stdio::{pump_frames, spawn_stdin_reader};
