//! Wire protocol spoken between a browser extension and the Wyrmhole host.
//!
//! Every frame on stdin/stdout is a 4-byte little-endian length followed by
//! that many bytes of UTF-8 JSON. A frame carries either a control envelope
//! (`{"cmd":"create","mimetype":...}`) or one chunk of a larger message:
//!
//! ```text
//! {"c":3,"n":2,"type":"cmd","colonyId":0,"cmdId":17,"msg":"...fragment..."}
//! ```
//!
//! Chunks for the same `cmdId` may arrive in any order; the [`Reassembler`]
//! joins them by sequence number once every fragment is present. Outbound
//! payloads are split by the [`Chunker`] so no frame exceeds
//! [`MAX_CHUNK_SIZE`] bytes of fragment text.

mod envelope;
mod error;
mod framing;
mod ids;
mod message;
mod reassembly;

pub use envelope::{parse_envelope, Chunk, Envelope};
pub use error::{FrameError, ProtocolError};
pub use framing::{encode_frame, write_frame, Chunker, FrameReader, FRAME_HEADER_LEN};
pub use ids::{ColonyId, Direction, MessageId};
pub use message::{Ack, AckStatus, Message};
pub use reassembly::Reassembler;
pub use wyrmhole_core::MAX_CHUNK_SIZE;
