//! Operation records and their durable entry format.
//!
//! ## Entry naming
//!
//! Each record is stored in its own entry named
//! `{sequence:020}-{kind}.op`, e.g. `00000000000000000042-del.op`.
//! Zero padding makes a lexicographic sort of the listing equal to
//! sequence order, and the kind tag makes the listing readable on its own.
//!
//! ## Entry layout
//!
//! `[u32 LE: json length][u32 LE: crc32 of json][json: OperationRecord]`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Document, ItemIdentity};
use crate::error::{IndexerError, Result};

/// Sequence number assigned at enqueue time.
pub type SeqNumber = u64;

/// File extension of committed entries.
pub const ENTRY_EXTENSION: &str = ".op";

/// File extension of entries still being written.
pub const PARTIAL_EXTENSION: &str = ".tmp";

const HEADER_LEN: usize = 8;

/// What an operation does to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Remove every document for the identity.
    Delete,
    /// Add (or replace) the document for the identity.
    Add,
    /// Commit marker requesting an index compaction.
    Optimize,
}

impl OperationKind {
    /// Short tag used in entry names.
    pub fn tag(&self) -> &'static str {
        match self {
            OperationKind::Delete => "del",
            OperationKind::Add => "add",
            OperationKind::Optimize => "opt",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "del" => Some(OperationKind::Delete),
            "add" => Some(OperationKind::Add),
            "opt" => Some(OperationKind::Optimize),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The unit of work in the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Strictly increasing, never reused. Zero until enqueued.
    pub sequence: SeqNumber,
    pub kind: OperationKind,
    /// Target item. `None` only for [`OperationKind::Optimize`].
    pub identity: Option<ItemIdentity>,
    /// Fields to index. Empty for deletes and optimize markers.
    #[serde(default)]
    pub payload: Document,
    pub enqueue_time: DateTime<Utc>,
}

impl OperationRecord {
    pub fn delete(identity: ItemIdentity) -> Self {
        OperationRecord {
            sequence: 0,
            kind: OperationKind::Delete,
            identity: Some(identity),
            payload: Document::new(),
            enqueue_time: Utc::now(),
        }
    }

    pub fn add(identity: ItemIdentity, payload: Document) -> Self {
        OperationRecord {
            sequence: 0,
            kind: OperationKind::Add,
            identity: Some(identity),
            payload,
            enqueue_time: Utc::now(),
        }
    }

    pub fn optimize() -> Self {
        OperationRecord {
            sequence: 0,
            kind: OperationKind::Optimize,
            identity: None,
            payload: Document::new(),
            enqueue_time: Utc::now(),
        }
    }

    /// Check that kind, identity and payload agree.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, &self.identity) {
            (OperationKind::Optimize, None) => Ok(()),
            (OperationKind::Optimize, Some(_)) => Err(IndexerError::invalid_argument(
                "optimize records must not carry an identity",
            )),
            (_, None) => Err(IndexerError::invalid_argument(format!(
                "{} records require an identity",
                self.kind
            ))),
            (OperationKind::Delete, Some(_)) if !self.payload.is_empty() => Err(
                IndexerError::invalid_argument("delete records must have an empty payload"),
            ),
            _ => Ok(()),
        }
    }

    /// The durable entry name for this record.
    pub fn entry_name(&self) -> String {
        entry_name(self.sequence, self.kind)
    }

    /// Serialize into the entry layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len: u32 = json.len().try_into().map_err(|_| {
            IndexerError::invalid_argument(format!(
                "record {} is too large to encode ({} bytes)",
                self.sequence,
                json.len()
            ))
        })?;
        let crc = crc32fast::hash(&json);

        let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    /// Parse an entry, verifying length and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexerError::storage(format!(
                "entry truncated: {} bytes",
                bytes.len()
            )));
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let json = &bytes[HEADER_LEN..];
        if json.len() != len {
            return Err(IndexerError::storage(format!(
                "entry length mismatch: header says {len}, found {}",
                json.len()
            )));
        }
        if crc32fast::hash(json) != crc {
            return Err(IndexerError::storage("entry checksum mismatch"));
        }
        Ok(serde_json::from_slice(json)?)
    }
}

/// Build an entry name from its parts.
pub fn entry_name(sequence: SeqNumber, kind: OperationKind) -> String {
    format!("{sequence:020}-{}{ENTRY_EXTENSION}", kind.tag())
}

/// Split an entry name back into sequence and kind.
pub fn parse_entry_name(name: &str) -> Option<(SeqNumber, OperationKind)> {
    let stem = name.strip_suffix(ENTRY_EXTENSION)?;
    let (seq, tag) = stem.split_once('-')?;
    Some((seq.parse().ok()?, OperationKind::from_tag(tag)?))
}
