// Log entry and command types (spec section 3, `LogEntry`).

use serde::{Deserialize, Serialize};

use crate::common::{ClientId, LogIndex, Term};

/// A single Raft log entry. Two entries with the same `(index, term)` are
/// required to be byte-equal (spec section 3 invariant); we get that for
/// free by never mutating an entry once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub kind: EntryKind,
    /// Bincode-encoded `Command`, empty for `EntryKind::NoOp`.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum EntryKind {
    Command,
    NoOp,
}

impl LogEntry {
    pub fn command(index: LogIndex, term: Term, payload: Vec<u8>) -> Self {
        Self {
            index,
            term,
            kind: EntryKind::Command,
            payload,
        }
    }

    pub fn no_op(index: LogIndex, term: Term) -> Self {
        Self {
            index,
            term,
            kind: EntryKind::NoOp,
            payload: Vec::new(),
        }
    }
}

/// A client-submitted write command, carried as the payload of a
/// `EntryKind::Command` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Command {
    pub client_id: ClientId,
    pub seq: u64,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Op {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .expect("Command encoding is infallible for in-memory structures")
    }

    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        let (cmd, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_roundtrips_through_bincode() {
        let cmd = Command {
            client_id: "c1".to_string(),
            seq: 7,
            op: Op::Put {
                key: "k".to_string(),
                value: b"v".to_vec(),
            },
        };
        let encoded = cmd.encode();
        let decoded = Command::decode(&encoded).unwrap();
        assert_eq!(cmd, decoded);
    }
}
