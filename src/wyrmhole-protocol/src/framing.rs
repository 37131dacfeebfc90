use crate::error::FrameError;
use crate::ids::{ColonyId, Direction, MessageId};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use wyrmhole_core::MAX_CHUNK_SIZE;

/// Size of the little-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Serialize)]
struct ChunkDocument<'a> {
    c: u32,
    #[serde(rename = "type")]
    direction: Direction,
    #[serde(rename = "colonyId")]
    colony_id: ColonyId,
    #[serde(rename = "cmdId")]
    msg_id: MessageId,
    n: u32,
    msg: &'a str,
}

/// Splits outbound payloads into chunk documents no larger than
/// `max_chunk_size` bytes of fragment text.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(MAX_CHUNK_SIZE)
    }
}

impl Chunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Cut `payload` into fragments.
    ///
    /// Cuts land on `char` boundaries, so a fragment may come up a few bytes
    /// short of the limit when a multi-byte character straddles it. An empty
    /// payload still yields one (empty) fragment.
    pub fn split<'a>(&self, payload: &'a str) -> Vec<&'a str> {
        if payload.is_empty() {
            return vec![""];
        }

        let mut fragments = Vec::with_capacity(payload.len().div_ceil(self.max_chunk_size));
        let mut rest = payload;
        while !rest.is_empty() {
            let mut end = self.max_chunk_size.min(rest.len());
            while !rest.is_char_boundary(end) {
                end -= 1;
            }
            if end == 0 {
                // Limit is narrower than one character; send it whole.
                end = rest
                    .char_indices()
                    .nth(1)
                    .map(|(idx, _)| idx)
                    .unwrap_or(rest.len());
            }
            let (head, tail) = rest.split_at(end);
            fragments.push(head);
            rest = tail;
        }
        fragments
    }

    /// Serialize `payload` as the ordered chunk documents `n = 1..=c`.
    pub fn encode(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        direction: Direction,
        payload: &str,
    ) -> Result<Vec<String>, FrameError> {
        let fragments = self.split(payload);
        let count =
            u32::try_from(fragments.len()).map_err(|_| FrameError::TooManyChunks(fragments.len()))?;

        fragments
            .into_iter()
            .zip(1..=count)
            .map(|(msg, n)| {
                serde_json::to_string(&ChunkDocument {
                    c: count,
                    direction,
                    colony_id,
                    msg_id,
                    n,
                    msg,
                })
                .map_err(FrameError::from)
            })
            .collect()
    }
}

/// Prefix `text` with its little-endian `u32` length.
pub fn encode_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(text.len()).map_err(|_| FrameError::TooLarge {
        len: text.len(),
        max: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + text.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(text.as_bytes());
    Ok(frame)
}

/// Write one frame. Callers writing several frames that must stay adjacent
/// hold their own lock across the calls.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, text: &str) -> Result<(), FrameError> {
    let frame = encode_frame(text)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Blocking reader for inbound frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Read the next frame's text. `Ok(None)` means the peer closed the
    /// stream cleanly between frames.
    pub fn read_frame(&mut self) -> Result<Option<String>, FrameError> {
        let mut header = [0_u8; FRAME_HEADER_LEN];
        let read = read_full(&mut self.inner, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < FRAME_HEADER_LEN {
            return Err(FrameError::Truncated {
                read,
                expected: FRAME_HEADER_LEN,
            });
        }

        let len = u32::from_le_bytes(header) as usize;
        if len > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        let mut payload = vec![0_u8; len];
        let read = read_full(&mut self.inner, &mut payload)?;
        if read < len {
            return Err(FrameError::Truncated {
                read,
                expected: len,
            });
        }
        Ok(Some(String::from_utf8(payload)?))
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}
