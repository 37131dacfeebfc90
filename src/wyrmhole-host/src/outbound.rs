use std::io::Write;
use std::sync::{Mutex, PoisonError};
use wyrmhole_protocol::{write_frame, Ack, Chunker, ColonyId, Direction, FrameError, MessageId};

/// Serialized writer for everything the host sends to the extension.
///
/// All frames of one payload are written under a single lock so frames from
/// concurrent senders never interleave.
pub struct Outbound {
    writer: Mutex<Box<dyn Write + Send>>,
    chunker: Chunker,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("chunker", &self.chunker)
            .finish_non_exhaustive()
    }
}

impl Outbound {
    pub fn new(writer: impl Write + Send + 'static, chunker: Chunker) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            chunker,
        }
    }

    pub fn stdout(chunker: Chunker) -> Self {
        Self::new(std::io::stdout(), chunker)
    }

    /// Chunk and frame `payload` for the extension.
    pub fn send(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        direction: Direction,
        payload: &str,
    ) -> Result<(), FrameError> {
        let documents = self.chunker.encode(colony_id, msg_id, direction, payload)?;
        self.write_all(&documents)?;
        tracing::debug!(
            %colony_id,
            %msg_id,
            direction = direction.as_str(),
            bytes = payload.len(),
            chunks = documents.len(),
            "sent message to extension"
        );
        Ok(())
    }

    /// Send a single-frame status record.
    pub fn send_ack(&self, ack: &Ack) -> Result<(), FrameError> {
        let document = serde_json::to_string(ack)?;
        self.write_all(std::slice::from_ref(&document))
    }

    fn write_all(&self, documents: &[String]) -> Result<(), FrameError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for document in documents {
            write_frame(&mut **writer, document)?;
        }
        writer.flush()?;
        Ok(())
    }
}
