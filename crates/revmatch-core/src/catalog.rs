//! Per-revision message catalogs.
//!
//! A [`Catalog`] holds every protocol message known for one direction of one
//! client revision, keyed by its revision-scoped id. Catalogs are produced by
//! an external disassembly stage (usually via [`crate::snapshot`]) and are
//! read-only once built.

use crate::error::{Error, Result};
use crate::index::FingerprintIndex;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Revision-scoped protocol message identifier
pub type MessageId = u32;

/// Which side of the connection sends a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Sent by the client
    Outgoing,
    /// Sent by the server
    Incoming,
}

impl Direction {
    /// Both directions, in report order
    pub const ALL: [Direction; 2] = [Direction::Outgoing, Direction::Incoming];

    /// Returns the title used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outgoing => "Outgoing",
            Direction::Incoming => "Incoming",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol message as seen in one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Revision-scoped id, unique within a direction
    pub id: MessageId,
    /// Opaque structural signature, stable while the message shape is unchanged
    pub fingerprint: String,
    /// Direction of the message
    pub direction: Direction,
    /// Number of references to the message elsewhere in the client (0 = dead)
    pub reference_count: u32,
    /// Signature shown in reports, e.g. `(k:int, name:String)`
    pub display_signature: String,
    /// Class name of the message
    pub symbolic_name: String,
    /// Parser class name (incoming only)
    pub parser_name: Option<String>,
}

impl MessageRecord {
    /// Creates a referenced record with empty naming information
    pub fn new(id: MessageId, fingerprint: impl Into<String>, direction: Direction) -> Self {
        Self {
            id,
            fingerprint: fingerprint.into(),
            direction,
            reference_count: 1,
            display_signature: String::new(),
            symbolic_name: String::new(),
            parser_name: None,
        }
    }

    /// Sets the reference count
    pub fn references(mut self, count: u32) -> Self {
        self.reference_count = count;
        self
    }

    /// Sets the display signature
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.display_signature = signature.into();
        self
    }

    /// Sets the symbolic name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.symbolic_name = name.into();
        self
    }

    /// Sets the parser name
    pub fn parser(mut self, parser: impl Into<String>) -> Self {
        self.parser_name = Some(parser.into());
        self
    }

    /// Returns true if nothing in the client references this message
    pub fn is_dead(&self) -> bool {
        self.reference_count == 0
    }
}

/// Messages of one direction of one revision, ordered by id
#[derive(Debug, Clone)]
pub struct Catalog {
    direction: Direction,
    records: BTreeMap<MessageId, MessageRecord>,
}

impl Catalog {
    /// Creates an empty catalog
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            records: BTreeMap::new(),
        }
    }

    /// Builds a catalog, rejecting foreign-direction records and repeated ids
    pub fn from_records(
        direction: Direction,
        records: impl IntoIterator<Item = MessageRecord>,
    ) -> Result<Self> {
        let mut catalog = Self::empty(direction);

        for mut record in records {
            if record.direction != direction {
                return Err(Error::DirectionMismatch {
                    id: record.id,
                    expected: direction,
                    found: record.direction,
                });
            }
            if catalog.records.contains_key(&record.id) {
                return Err(Error::DuplicateMessageId {
                    direction,
                    id: record.id,
                });
            }
            // parser names only exist for incoming messages
            if direction == Direction::Outgoing && record.parser_name.take().is_some() {
                trace!("Dropping parser name of outgoing message {}", record.id);
            }
            catalog.records.insert(record.id, record);
        }

        Ok(catalog)
    }

    /// Returns the catalog direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Looks up a record by id
    pub fn get(&self, id: MessageId) -> Option<&MessageRecord> {
        self.records.get(&id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the catalog holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> + '_ {
        self.records.values()
    }

    /// Builds the fingerprint index of this catalog
    pub fn index(&self) -> FingerprintIndex<'_> {
        FingerprintIndex::build(self)
    }
}

/// Both catalogs of one labelled client build
#[derive(Debug, Clone)]
pub struct Revision {
    label: String,
    outgoing: Catalog,
    incoming: Catalog,
}

impl Revision {
    /// Creates a revision from its two catalogs
    pub fn new(label: impl Into<String>, outgoing: Catalog, incoming: Catalog) -> Result<Self> {
        if outgoing.direction() != Direction::Outgoing {
            return Err(Error::invalid_snapshot("outgoing catalog holds incoming messages"));
        }
        if incoming.direction() != Direction::Incoming {
            return Err(Error::invalid_snapshot("incoming catalog holds outgoing messages"));
        }
        Ok(Self {
            label: label.into(),
            outgoing,
            incoming,
        })
    }

    /// Returns the revision label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the catalog for a direction
    pub fn catalog(&self, direction: Direction) -> &Catalog {
        match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_orders_by_id() {
        let catalog = Catalog::from_records(
            Direction::Outgoing,
            [
                MessageRecord::new(30, "c", Direction::Outgoing),
                MessageRecord::new(10, "a", Direction::Outgoing),
                MessageRecord::new(20, "b", Direction::Outgoing),
            ],
        )
        .unwrap();

        let ids: Vec<_> = catalog.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(20).unwrap().fingerprint, "b");
        assert!(catalog.get(40).is_none());
    }

    #[test]
    fn test_outgoing_parser_name_is_dropped() {
        let outgoing = Catalog::from_records(
            Direction::Outgoing,
            [MessageRecord::new(1, "a", Direction::Outgoing).parser("Bogus")],
        )
        .unwrap();
        assert_eq!(outgoing.get(1).unwrap().parser_name, None);

        let incoming = Catalog::from_records(
            Direction::Incoming,
            [MessageRecord::new(1, "a", Direction::Incoming).parser("ChatParser")],
        )
        .unwrap();
        assert_eq!(
            incoming.get(1).unwrap().parser_name.as_deref(),
            Some("ChatParser")
        );
    }

    #[test]
    fn test_catalog_rejects_duplicate_ids() {
        let err = Catalog::from_records(
            Direction::Incoming,
            [
                MessageRecord::new(5, "a", Direction::Incoming),
                MessageRecord::new(5, "b", Direction::Incoming),
            ],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            Error::DuplicateMessageId {
                direction: Direction::Incoming,
                id: 5
            }
        ));
    }

    #[test]
    fn test_catalog_rejects_foreign_direction() {
        let err = Catalog::from_records(
            Direction::Outgoing,
            [MessageRecord::new(1, "a", Direction::Incoming)],
        )
        .unwrap_err();

        assert!(matches!(err, Error::DirectionMismatch { id: 1, .. }));
    }

    #[test]
    fn test_record_builder() {
        let record = MessageRecord::new(7, "h", Direction::Incoming)
            .references(0)
            .name("ChatEvent")
            .signature("(k:int)")
            .parser("ChatParser");

        assert!(record.is_dead());
        assert_eq!(record.symbolic_name, "ChatEvent");
        assert_eq!(record.parser_name.as_deref(), Some("ChatParser"));
    }

    #[test]
    fn test_revision_rejects_swapped_catalogs() {
        let result = Revision::new(
            "v1",
            Catalog::empty(Direction::Incoming),
            Catalog::empty(Direction::Outgoing),
        );
        assert!(result.is_err());
    }
}
