//! Revision snapshot interchange format.
//!
//! The disassembly stage hands each loaded client build over as a
//! protobuf-encoded [`RevisionSnapshot`]. Fingerprints are already computed by
//! the time a snapshot exists; this module only decodes, validates and
//! converts.
//!
//! ## Wire schema
//!
//! ```text
//! message RevisionSnapshot {
//!   string revision = 1;
//!   repeated MessageEntry messages = 2;
//! }
//!
//! message MessageEntry {
//!   uint32 id = 1;
//!   string fingerprint = 2;
//!   Direction direction = 3;
//!   uint32 reference_count = 4;
//!   string display_signature = 5;
//!   string symbolic_name = 6;
//!   optional string parser_name = 7;
//! }
//!
//! enum Direction {
//!   DIRECTION_UNSPECIFIED = 0;
//!   OUTGOING = 1;
//!   INCOMING = 2;
//! }
//! ```

use crate::catalog::{Catalog, Direction, MessageRecord, Revision};
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use prost::Message;
use std::path::Path;
use tracing::{debug, trace};

/// Direction as carried on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireDirection {
    /// Not set; rejected on load
    Unspecified = 0,
    /// Sent by the client
    Outgoing = 1,
    /// Sent by the server
    Incoming = 2,
}

impl From<Direction> for WireDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Outgoing => WireDirection::Outgoing,
            Direction::Incoming => WireDirection::Incoming,
        }
    }
}

/// One message of a snapshot
#[derive(Clone, PartialEq, Message)]
pub struct MessageEntry {
    /// Revision-scoped id
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Structural fingerprint
    #[prost(string, tag = "2")]
    pub fingerprint: String,
    /// Direction, see [`WireDirection`]
    #[prost(enumeration = "WireDirection", tag = "3")]
    pub direction: i32,
    /// Number of references in the client
    #[prost(uint32, tag = "4")]
    pub reference_count: u32,
    /// Signature shown in reports
    #[prost(string, tag = "5")]
    pub display_signature: String,
    /// Class name
    #[prost(string, tag = "6")]
    pub symbolic_name: String,
    /// Parser class name, incoming only
    #[prost(string, optional, tag = "7")]
    pub parser_name: Option<String>,
}

/// Every message of one labelled client build
#[derive(Clone, PartialEq, Message)]
pub struct RevisionSnapshot {
    /// Revision label
    #[prost(string, tag = "1")]
    pub revision: String,
    /// Messages of both directions
    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<MessageEntry>,
}

impl RevisionSnapshot {
    /// Decodes a snapshot from protobuf bytes
    pub fn from_bytes(data: impl Buf) -> Result<Self> {
        Ok(Self::decode(data)?)
    }

    /// Encodes the snapshot to protobuf bytes
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }
}

impl MessageEntry {
    fn into_record(self) -> Result<MessageRecord> {
        let direction = match WireDirection::try_from(self.direction) {
            Ok(WireDirection::Outgoing) => Direction::Outgoing,
            Ok(WireDirection::Incoming) => Direction::Incoming,
            Ok(WireDirection::Unspecified) => {
                return Err(Error::invalid_snapshot(format!(
                    "message {} has no direction",
                    self.id
                )))
            }
            Err(_) => {
                return Err(Error::invalid_snapshot(format!(
                    "message {} has unknown direction {}",
                    self.id, self.direction
                )))
            }
        };

        let parser_name = self.parser_name.filter(|name| !name.is_empty());

        Ok(MessageRecord {
            id: self.id,
            fingerprint: self.fingerprint,
            direction,
            reference_count: self.reference_count,
            display_signature: self.display_signature,
            symbolic_name: self.symbolic_name,
            parser_name,
        })
    }

    fn from_record(record: &MessageRecord) -> Self {
        Self {
            id: record.id,
            fingerprint: record.fingerprint.clone(),
            direction: WireDirection::from(record.direction) as i32,
            reference_count: record.reference_count,
            display_signature: record.display_signature.clone(),
            symbolic_name: record.symbolic_name.clone(),
            parser_name: record.parser_name.clone(),
        }
    }
}

impl Revision {
    /// Validates a decoded snapshot and splits it into catalogs
    pub fn from_snapshot(snapshot: RevisionSnapshot) -> Result<Self> {
        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();

        for entry in snapshot.messages {
            let record = entry.into_record()?;
            match record.direction {
                Direction::Outgoing => outgoing.push(record),
                Direction::Incoming => incoming.push(record),
            }
        }

        let outgoing = Catalog::from_records(Direction::Outgoing, outgoing)?;
        let incoming = Catalog::from_records(Direction::Incoming, incoming)?;

        debug!(
            "Loaded revision {}: {} outgoing, {} incoming",
            snapshot.revision,
            outgoing.len(),
            incoming.len()
        );

        Revision::new(snapshot.revision, outgoing, incoming)
    }

    /// Converts the revision back into its wire form
    pub fn to_snapshot(&self) -> RevisionSnapshot {
        RevisionSnapshot {
            revision: self.label().to_string(),
            messages: Direction::ALL
                .iter()
                .flat_map(|direction| self.catalog(*direction).iter())
                .map(MessageEntry::from_record)
                .collect(),
        }
    }
}

/// Reads and validates a snapshot file
pub fn load_revision(path: impl AsRef<Path>) -> Result<Revision> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    trace!("Read {} bytes from {}", data.len(), path.display());
    Revision::from_snapshot(RevisionSnapshot::from_bytes(Bytes::from(data))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, fingerprint: &str, direction: WireDirection) -> MessageEntry {
        MessageEntry {
            id,
            fingerprint: fingerprint.to_string(),
            direction: direction as i32,
            reference_count: 1,
            display_signature: String::new(),
            symbolic_name: String::new(),
            parser_name: None,
        }
    }

    #[test]
    fn test_snapshot_splits_directions() {
        let snapshot = RevisionSnapshot {
            revision: "PRODUCTION-201701242205-837386173".to_string(),
            messages: vec![
                entry(10, "a", WireDirection::Outgoing),
                entry(10, "b", WireDirection::Incoming),
                entry(11, "c", WireDirection::Incoming),
            ],
        };

        let bytes = snapshot.to_bytes();
        let revision = Revision::from_snapshot(RevisionSnapshot::from_bytes(bytes).unwrap()).unwrap();

        assert_eq!(revision.label(), "PRODUCTION-201701242205-837386173");
        assert_eq!(revision.catalog(Direction::Outgoing).len(), 1);
        assert_eq!(revision.catalog(Direction::Incoming).len(), 2);
        assert_eq!(
            revision.catalog(Direction::Incoming).get(10).unwrap().fingerprint,
            "b"
        );
    }

    #[test]
    fn test_unspecified_direction_is_rejected() {
        let snapshot = RevisionSnapshot {
            revision: "v1".to_string(),
            messages: vec![entry(1, "a", WireDirection::Unspecified)],
        };
        let err = Revision::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, Error::InvalidSnapshot(_)));
    }

    #[test]
    fn test_unknown_direction_is_rejected() {
        let mut bad = entry(1, "a", WireDirection::Outgoing);
        bad.direction = 9;
        let snapshot = RevisionSnapshot {
            revision: "v1".to_string(),
            messages: vec![bad],
        };
        assert!(Revision::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let snapshot = RevisionSnapshot {
            revision: "v1".to_string(),
            messages: vec![
                entry(4, "a", WireDirection::Outgoing),
                entry(4, "b", WireDirection::Outgoing),
            ],
        };
        let err = Revision::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, Error::DuplicateMessageId { id: 4, .. }));
    }

    #[test]
    fn test_outgoing_parser_is_dropped() {
        let mut out = entry(1, "a", WireDirection::Outgoing);
        out.parser_name = Some("Bogus".to_string());
        let mut inc = entry(2, "b", WireDirection::Incoming);
        inc.parser_name = Some("RoomParser".to_string());

        let revision = Revision::from_snapshot(RevisionSnapshot {
            revision: "v1".to_string(),
            messages: vec![out, inc],
        })
        .unwrap();

        assert_eq!(revision.catalog(Direction::Outgoing).get(1).unwrap().parser_name, None);
        assert_eq!(
            revision.catalog(Direction::Incoming).get(2).unwrap().parser_name.as_deref(),
            Some("RoomParser")
        );
    }

    #[test]
    fn test_to_snapshot_keeps_every_message() {
        let snapshot = RevisionSnapshot {
            revision: "v2".to_string(),
            messages: vec![
                entry(3, "a", WireDirection::Incoming),
                entry(1, "b", WireDirection::Outgoing),
            ],
        };
        let revision = Revision::from_snapshot(snapshot).unwrap();
        let back = revision.to_snapshot();

        assert_eq!(back.revision, "v2");
        // outgoing first, then incoming
        let ids: Vec<_> = back.messages.iter().map(|m| (m.id, m.direction)).collect();
        assert_eq!(
            ids,
            vec![
                (1, WireDirection::Outgoing as i32),
                (3, WireDirection::Incoming as i32)
            ]
        );
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let err = RevisionSnapshot::from_bytes(Bytes::from_static(&[0x0A, 0xFF])).unwrap_err();
        assert!(matches!(err, Error::SnapshotDecode(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_revision("/nonexistent/revmatch/snapshot.pb").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
