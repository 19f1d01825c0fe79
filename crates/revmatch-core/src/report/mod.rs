//! Annotated catalog reports.
//!
//! A report walks one [`FingerprintIndex`] per direction and emits three
//! mutually exclusive sections:
//!
//! 1. Unique entries, ascending by id
//! 2. Collision groups in first-seen fingerprint order, members ascending by
//!    id, each annotated with the group size (omitted when there are none)
//! 3. Dead entries, ascending by id
//!
//! Reporting never mutates the catalog. The [`ReportWriter`] trait decides
//! what an event turns into; [`TextWriter`] produces the `Messages.txt`
//! format:
//!
//! ```text
//! // PRODUCTION-201701242205-837386173
//!
//! // Outgoing Messages | 2
//! Outgoing[12, 7f3a] = LoginComposer(ticket:String)
//!
//! // Outgoing Dead Messages
//! Outgoing[Dead][40, 9c1e] = OldComposer()
//!
//! // Incoming Messages | 1
//! Incoming[5, 02bd] = RoomReadyEvent(k:Function)[Parser: RoomReadyParser]
//!
//! // Incoming Dead Messages
//! ```

mod writer;

use crate::catalog::{Catalog, Direction, MessageRecord, Revision};
use crate::index::FingerprintIndex;
use std::fmt::{self, Write as FmtWrite};

pub use writer::{NullWriter, ReportWriter, StatsWriter};

/// Walks one direction's index, feeding every event to `writer`
pub fn report_catalog<W: ReportWriter + ?Sized>(
    catalog: &Catalog,
    index: &FingerprintIndex<'_>,
    writer: &mut W,
) -> fmt::Result {
    let direction = catalog.direction();
    writer.begin_direction(direction, catalog.len())?;

    for record in index.unique() {
        writer.write_unique(record)?;
    }

    let mut collisions = index.collisions().peekable();
    if collisions.peek().is_some() {
        writer.begin_collisions(direction)?;
        for (fingerprint, group) in collisions {
            writer.begin_group(fingerprint, group.len())?;
            for record in group {
                writer.write_collision(record, group.len())?;
            }
        }
    }

    writer.begin_dead(direction)?;
    for record in index.dead() {
        writer.write_dead(record)?;
    }

    Ok(())
}

/// Walks both directions of a revision, outgoing first
pub fn report_revision<W: ReportWriter + ?Sized>(
    revision: &Revision,
    writer: &mut W,
) -> fmt::Result {
    writer.write_revision(revision.label())?;
    for direction in Direction::ALL {
        let catalog = revision.catalog(direction);
        report_catalog(catalog, &catalog.index(), writer)?;
    }
    Ok(())
}

/// Renders the full text report of a revision
pub fn render_revision(revision: &Revision) -> Result<String, fmt::Error> {
    let mut writer = TextWriter::new(String::new());
    report_revision(revision, &mut writer)?;
    Ok(writer.into_inner())
}

/// Writes reports in the annotated text format
#[derive(Debug)]
pub struct TextWriter<W> {
    out: W,
}

impl<W: FmtWrite> TextWriter<W> {
    /// Creates a text writer over any formatter sink
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying sink
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_entry(&mut self, record: &MessageRecord) -> fmt::Result {
        write!(
            self.out,
            "[{}, {}] = {}{}",
            record.id, record.fingerprint, record.symbolic_name, record.display_signature
        )?;
        if let Some(parser) = &record.parser_name {
            write!(self.out, "[Parser: {}]", parser)?;
        }
        writeln!(self.out)
    }
}

impl<W: FmtWrite> ReportWriter for TextWriter<W> {
    fn write_revision(&mut self, label: &str) -> fmt::Result {
        writeln!(self.out, "// {}", label)
    }

    fn begin_direction(&mut self, direction: Direction, total: usize) -> fmt::Result {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "// {} Messages | {}",
            direction,
            group_digits(total)
        )
    }

    fn write_unique(&mut self, record: &MessageRecord) -> fmt::Result {
        write!(self.out, "{}", record.direction)?;
        self.write_entry(record)
    }

    fn begin_collisions(&mut self, direction: Direction) -> fmt::Result {
        writeln!(self.out)?;
        writeln!(self.out, "// {} Message Hash Collisions", direction)
    }

    fn write_collision(&mut self, record: &MessageRecord, group_size: usize) -> fmt::Result {
        write!(self.out, "{}[Collisions: {}]", record.direction, group_size)?;
        self.write_entry(record)
    }

    fn begin_dead(&mut self, direction: Direction) -> fmt::Result {
        writeln!(self.out)?;
        writeln!(self.out, "// {} Dead Messages", direction)
    }

    fn write_dead(&mut self, record: &MessageRecord) -> fmt::Result {
        write!(self.out, "{}[Dead]", record.direction)?;
        self.write_entry(record)
    }
}

/// Formats a count with `,` thousands separators
pub fn group_digits(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
