use crate::main_loop::Dispatch;
use crate::outbound::Outbound;
use std::sync::Arc;
use wyrmhole_plugin::{HostFunctions, Plugin, PluginError, PluginLoader};
use wyrmhole_protocol::{Ack, ColonyId, Message, MessageId};

const NO_PLUGIN_LOADED: &str = "No plugin loaded";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Uninitialized,
    Active {
        name: String,
        mimetype: String,
    },
    Failed {
        reason: String,
    },
}

/// Routes completed messages to local bookkeeping or the active plugin.
pub struct PluginBridge {
    loader: Box<dyn PluginLoader>,
    host: Arc<dyn HostFunctions>,
    outbound: Arc<Outbound>,
    plugin: Option<Box<dyn Plugin>>,
    state: BridgeState,
}

impl std::fmt::Debug for PluginBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBridge")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PluginBridge {
    pub fn new(
        loader: Box<dyn PluginLoader>,
        host: Arc<dyn HostFunctions>,
        outbound: Arc<Outbound>,
    ) -> Self {
        Self {
            loader,
            host,
            outbound,
            plugin: None,
            state: BridgeState::Uninitialized,
        }
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// Shut the active plugin down, if any.
    pub fn shutdown(&mut self) {
        if let Some(mut plugin) = self.plugin.take() {
            tracing::info!(plugin = plugin.name(), "shutting down plugin");
            plugin.shutdown();
        }
        self.state = BridgeState::Uninitialized;
    }

    fn create(&mut self, mimetype: String) {
        if self.plugin.is_some() {
            tracing::info!(%mimetype, "replacing active plugin");
            self.shutdown();
        }

        match self.load(&mimetype) {
            Ok(plugin) => {
                let name = plugin.name().to_string();
                tracing::info!(%mimetype, plugin = %name, "plugin loaded");
                self.ack(&Ack::plugin_loaded(name.clone()));
                self.plugin = Some(plugin);
                self.state = BridgeState::Active { name, mimetype };
            }
            Err(err) => {
                tracing::warn!(%mimetype, error = %err, "plugin load failed");
                let reason = err.to_string();
                self.ack(&Ack::error(reason.clone()));
                self.state = BridgeState::Failed { reason };
            }
        }
    }

    fn load(&self, mimetype: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let mut plugin = self.loader.load(mimetype)?;
        plugin.initialize(Arc::clone(&self.host))?;
        Ok(plugin)
    }

    fn forward(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
        response: bool,
    ) {
        let Some(plugin) = self.plugin.as_mut() else {
            tracing::warn!(%colony_id, %msg_id, "message arrived with no plugin loaded");
            self.ack(&Ack::error(NO_PLUGIN_LOADED));
            return;
        };

        let result = if response {
            plugin.on_response(colony_id, msg_id, payload)
        } else {
            plugin.on_command(colony_id, msg_id, payload)
        };
        if let Err(err) = result {
            tracing::error!(
                plugin = plugin.name(),
                %colony_id,
                %msg_id,
                error = %err,
                "plugin rejected message"
            );
        }
    }

    fn ack(&self, ack: &Ack) {
        if let Err(err) = self.outbound.send_ack(ack) {
            tracing::error!(error = %err, "failed to send ack");
        }
    }
}

impl Dispatch for PluginBridge {
    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Create { mimetype } => self.create(mimetype),
            Message::Command {
                colony_id,
                msg_id,
                payload,
            } => self.forward(colony_id, msg_id, payload, false),
            Message::Response {
                colony_id,
                msg_id,
                payload,
            } => self.forward(colony_id, msg_id, payload, true),
            Message::Error { description } => {
                tracing::debug!(%description, "acknowledging bad message");
                self.ack(&Ack::error(description));
            }
        }
    }
}
