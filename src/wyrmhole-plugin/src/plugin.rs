use crate::task::AsyncCall;
use std::sync::Arc;
use thiserror::Error;
use wyrmhole_protocol::{ColonyId, FrameError, MessageId};

/// Errors raised while loading or talking to a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to load plugin for {mimetype}: {reason}")]
    Load { mimetype: String, reason: String },
    #[error("plugin initialization failed: {0}")]
    Init(String),
    #[error("plugin call failed: {0}")]
    Call(String),
}

/// Errors surfaced to plugins when they call back into the host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to write to the browser: {0}")]
    Write(#[from] FrameError),
    #[error("the dispatch loop has shut down")]
    LoopClosed,
}

/// Entry points the host hands to a plugin during initialization.
///
/// Every method may be called from any plugin thread.
pub trait HostFunctions: Send + Sync {
    /// Queue `call` to run on the dispatch loop thread.
    fn schedule_call(&self, call: AsyncCall) -> Result<(), HostError>;

    /// Send a command from a colony to the extension.
    fn send_command(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: &str,
    ) -> Result<(), HostError>;

    /// Answer a command the extension sent earlier.
    fn send_response(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: &str,
    ) -> Result<(), HostError>;
}

/// A loaded plugin as seen by the dispatch loop.
///
/// All methods run on the dispatch loop thread. Plugins that do work on
/// their own threads talk back through the [`HostFunctions`] they were
/// initialized with.
pub trait Plugin: Send {
    /// Display name reported to the extension after a successful create.
    fn name(&self) -> &str;

    fn initialize(&mut self, host: Arc<dyn HostFunctions>) -> Result<(), PluginError>;

    /// A command from the extension addressed to `colony_id`.
    fn on_command(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    ) -> Result<(), PluginError>;

    /// The extension's response to a command this plugin sent.
    fn on_response(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    ) -> Result<(), PluginError>;

    /// Release resources before the plugin is dropped.
    fn shutdown(&mut self) {}
}

/// Resolves a mimetype to a fresh, uninitialized plugin.
pub trait PluginLoader: Send {
    fn load(&self, mimetype: &str) -> Result<Box<dyn Plugin>, PluginError>;
}
