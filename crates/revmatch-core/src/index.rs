//! Fingerprint index over a single catalog.
//!
//! Building the index is one linear pass over the catalog in id order:
//!
//! 1. Records with no references are set aside as dead
//! 2. Every other record is bucketed by fingerprint
//!
//! A bucket with one member is a unique entry, two or more members form a
//! collision group. Dead, colliding and unique records partition the catalog
//! exactly. Nothing is resolved here; ambiguity is only reported.

use crate::catalog::{Catalog, Direction, MessageRecord};
use indexmap::IndexMap;
use tracing::debug;

/// Records of one catalog grouped by fingerprint
#[derive(Debug, Clone)]
pub struct FingerprintIndex<'a> {
    direction: Direction,
    /// Fingerprint buckets in first-seen order, members ascending by id
    buckets: IndexMap<&'a str, Vec<&'a MessageRecord>>,
    /// Referenced records ascending by id
    live: Vec<&'a MessageRecord>,
    /// Unreferenced records ascending by id
    dead: Vec<&'a MessageRecord>,
}

impl<'a> FingerprintIndex<'a> {
    /// Indexes every referenced record of the catalog
    pub fn build(catalog: &'a Catalog) -> Self {
        let mut buckets: IndexMap<&'a str, Vec<&'a MessageRecord>> = IndexMap::new();
        let mut live = Vec::with_capacity(catalog.len());
        let mut dead = Vec::new();

        for record in catalog.iter() {
            if record.is_dead() {
                dead.push(record);
                continue;
            }
            buckets
                .entry(record.fingerprint.as_str())
                .or_default()
                .push(record);
            live.push(record);
        }

        let index = Self {
            direction: catalog.direction(),
            buckets,
            live,
            dead,
        };

        debug!(
            "Indexed {} {} messages: {} unique, {} in {} collision group(s), {} dead",
            catalog.len(),
            index.direction,
            index.unique().count(),
            index.collisions().map(|(_, group)| group.len()).sum::<usize>(),
            index.collisions().count(),
            index.dead.len()
        );

        index
    }

    /// Returns the direction of the indexed catalog
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns every referenced record sharing a fingerprint, ascending by id
    ///
    /// The slice is empty when no referenced record carries the fingerprint.
    pub fn candidates(&self, fingerprint: &str) -> &[&'a MessageRecord] {
        self.buckets
            .get(fingerprint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if two or more referenced records share the fingerprint
    pub fn is_collision(&self, fingerprint: &str) -> bool {
        self.candidates(fingerprint).len() > 1
    }

    /// Unreferenced records, ascending by id
    pub fn dead(&self) -> &[&'a MessageRecord] {
        &self.dead
    }

    /// Collision groups in first-seen fingerprint order
    pub fn collisions(&self) -> impl Iterator<Item = (&'a str, &[&'a MessageRecord])> + '_ {
        self.buckets
            .iter()
            .filter(|(_, group)| group.len() > 1)
            .map(|(fingerprint, group)| (*fingerprint, group.as_slice()))
    }

    /// Referenced records whose fingerprint no other record shares, ascending by id
    pub fn unique(&self) -> impl Iterator<Item = &'a MessageRecord> + '_ {
        self.live
            .iter()
            .copied()
            .filter(|record| !self.is_collision(&record.fingerprint))
    }

    /// Number of distinct fingerprints among referenced records
    pub fn fingerprint_count(&self) -> usize {
        self.buckets.len()
    }
}
