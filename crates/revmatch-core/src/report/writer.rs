//! Extensible report sinks.
//!
//! This module provides the [`ReportWriter`] trait for customizing what
//! happens with every event of a catalog report.

use crate::catalog::{Direction, MessageRecord};
use std::fmt::Result;

/// Trait receiving catalog report events.
///
/// Every method defaults to doing nothing, so a sink only implements the
/// events it cares about. Events arrive per direction in this order: the
/// direction header, every unique entry, the collision section (only when
/// collisions exist) with each group followed by its members, then the dead
/// section.
///
/// # Example
///
/// ```
/// use revmatch_core::report::ReportWriter;
/// use revmatch_core::MessageRecord;
///
/// struct DeadIds(Vec<u32>);
///
/// impl ReportWriter for DeadIds {
///     fn write_dead(&mut self, record: &MessageRecord) -> std::fmt::Result {
///         self.0.push(record.id);
///         Ok(())
///     }
/// }
/// ```
pub trait ReportWriter {
    /// Write the revision header
    fn write_revision(&mut self, label: &str) -> Result {
        let _ = label;
        Ok(())
    }

    /// Start the report of one direction; `total` counts every record
    fn begin_direction(&mut self, direction: Direction, total: usize) -> Result {
        let _ = (direction, total);
        Ok(())
    }

    /// Write a referenced record whose fingerprint is unique
    fn write_unique(&mut self, record: &MessageRecord) -> Result {
        let _ = record;
        Ok(())
    }

    /// Start the collision section
    fn begin_collisions(&mut self, direction: Direction) -> Result {
        let _ = direction;
        Ok(())
    }

    /// Start one collision group
    fn begin_group(&mut self, fingerprint: &str, size: usize) -> Result {
        let _ = (fingerprint, size);
        Ok(())
    }

    /// Write one member of a collision group
    fn write_collision(&mut self, record: &MessageRecord, group_size: usize) -> Result {
        let _ = (record, group_size);
        Ok(())
    }

    /// Start the dead section
    fn begin_dead(&mut self, direction: Direction) -> Result {
        let _ = direction;
        Ok(())
    }

    /// Write an unreferenced record
    fn write_dead(&mut self, record: &MessageRecord) -> Result {
        let _ = record;
        Ok(())
    }
}

/// A no-op writer that discards all output
pub struct NullWriter;

impl ReportWriter for NullWriter {}

/// A writer that collects section statistics
#[derive(Debug, Default)]
pub struct StatsWriter {
    /// Number of records across all directions
    pub total_count: usize,
    /// Number of unique entries
    pub unique_count: usize,
    /// Number of collision groups
    pub group_count: usize,
    /// Number of records inside collision groups
    pub collision_count: usize,
    /// Number of dead entries
    pub dead_count: usize,
}

impl ReportWriter for StatsWriter {
    fn begin_direction(&mut self, _direction: Direction, total: usize) -> Result {
        self.total_count += total;
        Ok(())
    }

    fn write_unique(&mut self, _record: &MessageRecord) -> Result {
        self.unique_count += 1;
        Ok(())
    }

    fn begin_group(&mut self, _fingerprint: &str, _size: usize) -> Result {
        self.group_count += 1;
        Ok(())
    }

    fn write_collision(&mut self, _record: &MessageRecord, _group_size: usize) -> Result {
        self.collision_count += 1;
        Ok(())
    }

    fn write_dead(&mut self, _record: &MessageRecord) -> Result {
        self.dead_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_writer() {
        let mut writer = NullWriter;
        assert!(writer.write_revision("v1").is_ok());
        assert!(writer
            .write_dead(&MessageRecord::new(1, "a", Direction::Outgoing))
            .is_ok());
    }

    #[test]
    fn test_stats_writer() {
        let mut writer = StatsWriter::default();
        let record = MessageRecord::new(1, "a", Direction::Outgoing);
        writer.begin_direction(Direction::Outgoing, 4).unwrap();
        writer.write_unique(&record).unwrap();
        writer.begin_group("a", 2).unwrap();
        writer.write_collision(&record, 2).unwrap();
        writer.write_collision(&record, 2).unwrap();
        writer.write_dead(&record).unwrap();

        assert_eq!(writer.total_count, 4);
        assert_eq!(writer.unique_count, 1);
        assert_eq!(writer.group_count, 1);
        assert_eq!(writer.collision_count, 2);
        assert_eq!(writer.dead_count, 1);
    }
}
