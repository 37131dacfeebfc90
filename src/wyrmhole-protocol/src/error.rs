use crate::ids::MessageId;
use thiserror::Error;

/// Reasons an inbound envelope cannot become a message.
///
/// The display text is what the extension sees in the failure
/// acknowledgment, so keep it human-readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    MalformedEnvelope(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("missing sequence id in multi-part message")]
    MissingSequenceId,
    #[error("invalid sequence size for message {msg_id}: already declared {declared}, got {found}")]
    SequenceSizeMismatch {
        msg_id: MessageId,
        declared: u32,
        found: u32,
    },
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    #[error("chunk count must be at least 1")]
    InvalidChunkCount,
    #[error("sequence id {sequence} outside 1..={count}")]
    SequenceOutOfRange { sequence: u32, count: u32 },
}

/// Failures reading or writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream ended inside a frame ({read} of {expected} bytes)")]
    Truncated { read: usize, expected: usize },
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("payload needs {0} chunks, more than a sequence id can address")]
    TooManyChunks(usize),
}
