//! Line protocol spoken with external plugin executables.
//!
//! The host writes one [`HostMessage`] per line to the plugin's stdin and
//! reads one [`PluginMessage`] per line from its stdout. The first exchange
//! is always `init` -> `ready`.

use serde::{Deserialize, Serialize};
use wyrmhole_protocol::{ColonyId, MessageId};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Lines sent from the host to a plugin process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "init")]
    Init { protocol_version: u32 },
    #[serde(rename = "cmd")]
    Command {
        #[serde(rename = "colonyId")]
        colony_id: ColonyId,
        #[serde(rename = "cmdId")]
        msg_id: MessageId,
        msg: String,
    },
    #[serde(rename = "resp")]
    Response {
        #[serde(rename = "colonyId")]
        colony_id: ColonyId,
        #[serde(rename = "cmdId")]
        msg_id: MessageId,
        msg: String,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Lines sent from a plugin process to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PluginMessage {
    /// Reply to `init`.
    #[serde(rename = "ready")]
    Ready { name: String, protocol_version: u32 },
    /// A command the plugin wants delivered to the extension.
    #[serde(rename = "cmd")]
    Command {
        #[serde(rename = "colonyId", default)]
        colony_id: ColonyId,
        #[serde(rename = "cmdId")]
        msg_id: MessageId,
        msg: String,
    },
    /// The plugin's answer to an extension command.
    #[serde(rename = "resp")]
    Response {
        #[serde(rename = "colonyId", default)]
        colony_id: ColonyId,
        #[serde(rename = "cmdId")]
        msg_id: MessageId,
        msg: String,
    },
}
