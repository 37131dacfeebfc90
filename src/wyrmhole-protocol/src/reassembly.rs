use crate::envelope::Chunk;
use crate::error::ProtocolError;
use crate::ids::{ColonyId, Direction, MessageId};
use crate::message::Message;
use std::collections::{BTreeMap, HashMap};

/// A message whose chunks are still arriving.
#[derive(Debug)]
struct PendingMessage {
    declared: u32,
    colony_id: ColonyId,
    direction: Direction,
    /// Keyed by 0-based sequence index; completeness is key coverage, so a
    /// repeated index never counts twice.
    fragments: BTreeMap<u32, String>,
}

impl PendingMessage {
    fn is_complete(&self) -> bool {
        self.fragments.len() as u64 >= u64::from(self.declared)
    }

    fn into_message(self, msg_id: MessageId) -> Message {
        let len = self.fragments.values().map(String::len).sum();
        let mut payload = String::with_capacity(len);
        for fragment in self.fragments.into_values() {
            payload.push_str(&fragment);
        }
        match self.direction {
            Direction::Command => Message::Command {
                colony_id: self.colony_id,
                msg_id,
                payload,
            },
            Direction::Response => Message::Response {
                colony_id: self.colony_id,
                msg_id,
                payload,
            },
        }
    }
}

/// Table of in-flight multi-chunk messages keyed by `cmdId`.
///
/// Entries are dropped as soon as their message completes, and when a chunk
/// for them is rejected, so abandoned sequences do not accumulate behind a
/// protocol error.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<MessageId, PendingMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages still waiting on chunks.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record one chunk, returning the whole message once every fragment is
    /// present.
    pub fn accept(&mut self, chunk: Chunk) -> Result<Option<Message>, ProtocolError> {
        let Chunk {
            msg_id,
            colony_id,
            direction,
            count,
            sequence,
            fragment,
        } = chunk;

        if sequence == 0 || sequence > count {
            self.pending.remove(&msg_id);
            return Err(ProtocolError::SequenceOutOfRange { sequence, count });
        }

        if let Some(existing) = self.pending.get(&msg_id) {
            if existing.declared != count {
                let declared = existing.declared;
                self.pending.remove(&msg_id);
                tracing::warn!(%msg_id, declared, found = count, "abandoning chunk sequence");
                return Err(ProtocolError::SequenceSizeMismatch {
                    msg_id,
                    declared,
                    found: count,
                });
            }
        }

        let entry = self
            .pending
            .entry(msg_id)
            .or_insert_with(|| PendingMessage {
                declared: count,
                colony_id,
                direction,
                fragments: BTreeMap::new(),
            });

        if entry.fragments.insert(sequence - 1, fragment).is_some() {
            tracing::debug!(%msg_id, sequence, "duplicate chunk replaced earlier fragment");
        }

        if !entry.is_complete() {
            tracing::trace!(
                %msg_id,
                received = entry.fragments.len(),
                declared = count,
                "waiting for more chunks"
            );
            return Ok(None);
        }

        Ok(self
            .pending
            .remove(&msg_id)
            .map(|pending| pending.into_message(msg_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(msg_id: u32, count: u32, sequence: u32, fragment: &str) -> Chunk {
        Chunk {
            msg_id: MessageId(msg_id),
            colony_id: ColonyId(5),
            direction: Direction::Command,
            count,
            sequence,
            fragment: fragment.to_string(),
        }
    }

    #[test]
    fn single_chunk_completes_immediately() {
        let mut table = Reassembler::new();
        let msg = table.accept(chunk(1, 1, 1, "whole")).unwrap();
        assert_eq!(
            msg,
            Some(Message::Command {
                colony_id: ColonyId(5),
                msg_id: MessageId(1),
                payload: "whole".into()
            })
        );
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn out_of_order_chunks_join_by_sequence() {
        let mut table = Reassembler::new();
        assert_eq!(table.accept(chunk(2, 3, 3, "c")).unwrap(), None);
        assert_eq!(table.accept(chunk(2, 3, 1, "a")).unwrap(), None);
        assert_eq!(table.pending_len(), 1);

        let msg = table.accept(chunk(2, 3, 2, "b")).unwrap().expect("complete");
        let Message::Command { payload, .. } = msg else {
            panic!("expected command");
        };
        assert_eq!(payload, "abc");
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn size_mismatch_is_rejected_and_evicted() {
        let mut table = Reassembler::new();
        table.accept(chunk(3, 2, 1, "a")).unwrap();

        let err = table.accept(chunk(3, 4, 2, "b")).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::SequenceSizeMismatch {
                msg_id: MessageId(3),
                declared: 2,
                found: 4
            }
        );
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn duplicate_index_does_not_complete_early() {
        let mut table = Reassembler::new();
        assert_eq!(table.accept(chunk(4, 2, 1, "first")).unwrap(), None);
        assert_eq!(table.accept(chunk(4, 2, 1, "again")).unwrap(), None);

        let msg = table.accept(chunk(4, 2, 2, "-tail")).unwrap().expect("complete");
        let Message::Command { payload, .. } = msg else {
            panic!("expected command");
        };
        assert_eq!(payload, "again-tail");
    }

    #[test]
    fn interleaved_messages_stay_separate() {
        let mut table = Reassembler::new();
        table.accept(chunk(10, 2, 1, "x1")).unwrap();
        table.accept(chunk(11, 2, 2, "y2")).unwrap();
        let first = table.accept(chunk(10, 2, 2, "x2")).unwrap().unwrap();
        let second = table.accept(chunk(11, 2, 1, "y1")).unwrap().unwrap();

        assert!(matches!(first, Message::Command { payload, .. } if payload == "x1x2"));
        assert!(matches!(second, Message::Command { payload, .. } if payload == "y1y2"));
    }

    #[test]
    fn response_direction_is_kept() {
        let mut table = Reassembler::new();
        let mut resp = chunk(12, 1, 1, "done");
        resp.direction = Direction::Response;
        let msg = table.accept(resp).unwrap().unwrap();
        assert!(matches!(msg, Message::Response { msg_id: MessageId(12), .. }));
    }

    #[test]
    fn id_is_reusable_after_completion() {
        let mut table = Reassembler::new();
        table.accept(chunk(20, 1, 1, "one")).unwrap().unwrap();
        assert_eq!(table.accept(chunk(20, 2, 1, "two-")).unwrap(), None);
        let msg = table.accept(chunk(20, 2, 2, "parts")).unwrap().unwrap();
        assert!(matches!(msg, Message::Command { payload, .. } if payload == "two-parts"));
    }
}
