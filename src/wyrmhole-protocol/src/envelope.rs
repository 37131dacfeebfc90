use crate::error::ProtocolError;
use crate::ids::{ColonyId, Direction, MessageId};
use serde_json::{Map, Value};

/// A decoded frame, before chunk reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Create { mimetype: String },
    Chunk(Chunk),
}

/// One fragment of a possibly multi-part message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub msg_id: MessageId,
    pub colony_id: ColonyId,
    pub direction: Direction,
    /// Declared number of chunks (`c`).
    pub count: u32,
    /// 1-based position of this fragment (`n`).
    pub sequence: u32,
    pub fragment: String,
}

/// Decode one frame's text.
///
/// ```text
/// {"cmd":"create","mimetype":"application/x-fbtestplugin"}
/// {"cmdId":1,"c":1,"colonyId":0,"msg":"[\"New\",\"application/x-fbtestplugin\",{}]"}
/// ```
pub fn parse_envelope(raw: &str) -> Result<Envelope, ProtocolError> {
    let root: Value = serde_json::from_str(raw)
        .map_err(|err| ProtocolError::MalformedEnvelope(format!("invalid json: {err}")))?;
    let Value::Object(root) = root else {
        return Err(ProtocolError::MalformedEnvelope(
            "envelope is not an object".into(),
        ));
    };

    if let Some(cmd) = root.get("cmd") {
        parse_control(cmd, &root)
    } else if root.contains_key("msg") {
        parse_chunk(&root).map(Envelope::Chunk)
    } else {
        Err(ProtocolError::UnknownMessage(
            "expected a `cmd` or `msg` field".into(),
        ))
    }
}

fn parse_control(cmd: &Value, root: &Map<String, Value>) -> Result<Envelope, ProtocolError> {
    match cmd.as_str() {
        Some("create") => {
            let mimetype = root
                .get("mimetype")
                .ok_or(ProtocolError::MissingField("mimetype"))?
                .as_str()
                .ok_or_else(|| {
                    ProtocolError::MalformedEnvelope("`mimetype` must be a string".into())
                })?;
            Ok(Envelope::Create {
                mimetype: mimetype.to_string(),
            })
        }
        Some(other) => Err(ProtocolError::UnknownMessage(format!(
            "unknown command `{other}`"
        ))),
        None => Err(ProtocolError::UnknownMessage(format!(
            "unknown command {cmd}"
        ))),
    }
}

fn parse_chunk(root: &Map<String, Value>) -> Result<Chunk, ProtocolError> {
    let count = required_u32(root, "c")?;
    let msg_id = MessageId(required_u32(root, "cmdId")?);
    let colony_id = ColonyId(optional_u32(root, "colonyId")?.unwrap_or(0));

    if count == 0 {
        return Err(ProtocolError::InvalidChunkCount);
    }

    // A single-chunk message is always sequence 1; `n` is not consulted.
    let sequence = if count > 1 {
        let sequence = optional_u32(root, "n")?.ok_or(ProtocolError::MissingSequenceId)?;
        if sequence == 0 || sequence > count {
            return Err(ProtocolError::SequenceOutOfRange { sequence, count });
        }
        sequence
    } else {
        1
    };

    let direction = match root.get("type").and_then(Value::as_str) {
        Some("resp") => Direction::Response,
        _ => Direction::Command,
    };

    let fragment = root
        .get("msg")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedEnvelope("`msg` must be a string".into()))?
        .to_string();

    Ok(Chunk {
        msg_id,
        colony_id,
        direction,
        count,
        sequence,
        fragment,
    })
}

fn required_u32(root: &Map<String, Value>, field: &'static str) -> Result<u32, ProtocolError> {
    optional_u32(root, field)?.ok_or_else(|| {
        ProtocolError::MalformedEnvelope(format!("`{field}` must be an unsigned integer"))
    })
}

fn optional_u32(
    root: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u32>, ProtocolError> {
    let Some(value) = root.get(field) else {
        return Ok(None);
    };
    integral(value)
        .and_then(|v| u32::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| {
            ProtocolError::MalformedEnvelope(format!("`{field}` must be an unsigned integer"))
        })
}

/// Whole numbers are accepted even when the sender wrote them as `2.0`.
fn integral(value: &Value) -> Option<u64> {
    if let Some(v) = value.as_u64() {
        return Some(v);
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
