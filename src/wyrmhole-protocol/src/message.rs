use crate::ids::{ColonyId, MessageId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully reassembled message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Load the plugin registered for `mimetype`.
    Create { mimetype: String },
    /// A call from the extension into a colony.
    Command {
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    },
    /// The extension's answer to a command the plugin sent earlier.
    Response {
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    },
    /// An inbound frame that could not be understood.
    Error { description: String },
}

impl Message {
    pub fn error(err: impl fmt::Display) -> Self {
        Message::Error {
            description: err.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Create { .. } => "create",
            Message::Command { .. } => "command",
            Message::Response { .. } => "response",
            Message::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Single-frame status record the host sends for local decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn plugin_loaded(name: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Success,
            plugin: Some(name.into()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            plugin: None,
            message: Some(message.into()),
        }
    }
}
