//! Header rewriting across revisions.
//!
//! The [`Patcher`] streams a line-oriented text file, finds one embedded
//! message id per line with a configurable regular expression and replaces it
//! with the id (or fingerprint) that an [`IdResolver`] maps it to.
//!
//! ## Per-line algorithm
//!
//! 1. Cut a trailing comment found by a backward scan for an attached `//`
//!    marker; comment-only lines are dropped
//! 2. Collect every match of the identifier pattern; without one the line is
//!    copied as is
//! 3. Select the last match or the one at a fixed index
//! 4. Swap the previous revision label for the current one around the token
//! 5. Resolve the token and write the replacement plus a diagnostic comment
//!
//! Unparsable tokens and ids missing from the previous catalog are written as
//! `-1` and do not count as match attempts. Ids without a candidate are
//! written as `-1` and do count. Counters are returned in a [`PatchSummary`].

use crate::catalog::MessageId;
use crate::error::{Error, Result};
use crate::matcher::{IdResolver, MatchOutcome};
use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::io::{BufRead, Write};
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, trace};

/// Pattern used when none is configured: an integer after `=`
pub const DEFAULT_PATTERN: &str = r"=\s*(\d+)";

/// Line comment marker
pub const COMMENT_MARKER: &str = "//";

/// Value written in place of an id that could not be resolved
pub const UNRESOLVED: &str = "-1";

/// Which match on a line holds the id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrence {
    /// The last match on the line
    #[default]
    Last,
    /// The match at a zero-based index
    Index(usize),
}

impl FromStr for Occurrence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("last") {
            return Ok(Occurrence::Last);
        }
        s.parse::<usize>()
            .map(Occurrence::Index)
            .map_err(|_| format!("expected 'last' or a match index, got '{}'", s))
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::Last => f.write_str("last"),
            Occurrence::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Which characters may touch a `//` marker for it to start a trailing comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentBoundary {
    /// Only an ASCII letter, as in `Handshake//old id`
    #[default]
    Attached,
    /// An ASCII letter or whitespace, as in `Handshake = 4; // old id`
    Spaced,
}

impl CommentBoundary {
    fn accepts(self, preceding: u8) -> bool {
        match self {
            CommentBoundary::Attached => preceding.is_ascii_alphabetic(),
            CommentBoundary::Spaced => {
                preceding.is_ascii_alphabetic() || preceding.is_ascii_whitespace()
            }
        }
    }
}

/// Configuration for a patch run
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Identifier pattern
    pub pattern: Regex,
    /// Match selection
    pub occurrence: Occurrence,
    /// Label of the revision the input was written for
    pub previous_label: String,
    /// Label of the revision the output targets
    pub current_label: String,
    /// Suppress the banner and every diagnostic comment
    pub minimal_comments: bool,
    /// Write fingerprints instead of ids for resolved tokens
    pub output_fingerprints: bool,
    /// Trailing comment rule
    pub comment_boundary: CommentBoundary,
}

impl PatchConfig {
    /// Creates a config, compiling the identifier pattern
    pub fn new(
        pattern: &str,
        previous_label: impl Into<String>,
        current_label: impl Into<String>,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e))?;
        Ok(Self {
            pattern,
            occurrence: Occurrence::default(),
            previous_label: previous_label.into(),
            current_label: current_label.into(),
            minimal_comments: false,
            output_fingerprints: false,
            comment_boundary: CommentBoundary::default(),
        })
    }

    /// Sets the match selection
    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Sets whether comments are suppressed
    pub fn minimal_comments(mut self, minimal: bool) -> Self {
        self.minimal_comments = minimal;
        self
    }

    /// Sets whether fingerprints replace ids
    pub fn output_fingerprints(mut self, fingerprints: bool) -> Self {
        self.output_fingerprints = fingerprints;
        self
    }

    /// Sets the trailing comment rule
    pub fn comment_boundary(mut self, boundary: CommentBoundary) -> Self {
        self.comment_boundary = boundary;
        self
    }
}

/// What happened to the selected token of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The token is not an id
    Invalid(String),
    /// The id is not in the previous catalog
    NotFound(MessageId),
    /// The previous fingerprint has no current candidate
    NoMatch(MessageId),
    /// The id was rewritten
    Matched {
        /// Id in the previous revision
        previous: MessageId,
        /// Id in the current revision
        current: MessageId,
    },
}

impl TokenOutcome {
    /// Returns true if the token counts toward the attempt total
    pub fn is_attempt(&self) -> bool {
        matches!(self, TokenOutcome::NoMatch(_) | TokenOutcome::Matched { .. })
    }

    /// Returns true if the token was rewritten
    pub fn is_success(&self) -> bool {
        matches!(self, TokenOutcome::Matched { .. })
    }
}

/// Result of rewriting a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRewrite<'l> {
    /// A comment-only line, dropped from the output
    Skipped,
    /// No id on the line; the text after comment stripping
    Verbatim(&'l str),
    /// An id was processed
    Rewritten {
        /// The replacement line, without terminator
        text: String,
        /// What happened to the token
        outcome: TokenOutcome,
    },
}

/// Counters of a patch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    /// Lines read
    pub lines: usize,
    /// Comment-only lines dropped
    pub skipped: usize,
    /// Tokens counted as match attempts
    pub attempts: usize,
    /// Tokens rewritten
    pub successes: usize,
    /// Tokens that were not ids
    pub invalid: usize,
    /// Ids missing from the previous catalog
    pub not_found: usize,
    /// Ids without a current candidate
    pub no_match: usize,
}

impl PatchSummary {
    fn record(&mut self, outcome: &TokenOutcome) {
        match outcome {
            TokenOutcome::Invalid(_) => self.invalid += 1,
            TokenOutcome::NotFound(_) => self.not_found += 1,
            TokenOutcome::NoMatch(_) => self.no_match += 1,
            TokenOutcome::Matched { .. } => self.successes += 1,
        }
        if outcome.is_attempt() {
            self.attempts += 1;
        }
    }

    /// Adds the counters of another run
    pub fn merge(&mut self, other: &PatchSummary) {
        self.lines += other.lines;
        self.skipped += other.skipped;
        self.attempts += other.attempts;
        self.successes += other.successes;
        self.invalid += other.invalid;
        self.not_found += other.not_found;
        self.no_match += other.no_match;
    }
}

impl fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.successes, self.attempts)
    }
}

/// Rewrites ids in text streams
#[derive(Debug)]
pub struct Patcher<'r, R: ?Sized> {
    config: &'r PatchConfig,
    resolver: &'r R,
}

impl<'r, R: IdResolver + ?Sized> Patcher<'r, R> {
    /// Creates a patcher
    pub fn new(config: &'r PatchConfig, resolver: &'r R) -> Self {
        Self { config, resolver }
    }

    /// Streams `input` to `output`, rewriting one id per line
    ///
    /// Line terminators are kept as found. Output written before a failure
    /// stays written.
    pub fn patch<I: BufRead, O: Write>(&self, mut input: I, mut output: O) -> Result<PatchSummary> {
        let mut summary = PatchSummary::default();

        if !self.config.minimal_comments {
            writeln!(output, "// Current: {}", self.config.current_label)?;
            writeln!(output, "// Previous: {}", self.config.previous_label)?;
        }

        let mut buf = String::new();
        loop {
            buf.clear();
            if input.read_line(&mut buf)? == 0 {
                break;
            }
            summary.lines += 1;

            let (line, ending) = split_line_ending(&buf);
            match self.rewrite_line(line, summary.lines)? {
                LineRewrite::Skipped => {
                    trace!("Skipping comment line {}", summary.lines);
                    summary.skipped += 1;
                }
                LineRewrite::Verbatim(text) => {
                    output.write_all(text.as_bytes())?;
                    output.write_all(ending.as_bytes())?;
                }
                LineRewrite::Rewritten { text, outcome } => {
                    summary.record(&outcome);
                    output.write_all(text.as_bytes())?;
                    output.write_all(ending.as_bytes())?;
                }
            }
        }

        output.flush()?;
        debug!(
            "Patched {} lines: {} matched, {} attempts, {} invalid, {} not found",
            summary.lines, summary.successes, summary.attempts, summary.invalid, summary.not_found
        );
        Ok(summary)
    }

    /// Rewrites a single line without its terminator
    ///
    /// `line_number` is one-based and only used for diagnostics.
    pub fn rewrite_line<'l>(&self, line: &'l str, line_number: usize) -> Result<LineRewrite<'l>> {
        let Some(line) = strip_trailing_comment(line, self.config.comment_boundary) else {
            return Ok(LineRewrite::Skipped);
        };

        let spans = self.token_spans(line);
        if spans.is_empty() {
            return Ok(LineRewrite::Verbatim(line));
        }

        let span = match self.config.occurrence {
            Occurrence::Last => spans[spans.len() - 1].clone(),
            Occurrence::Index(index) => {
                spans
                    .get(index)
                    .cloned()
                    .ok_or(Error::OccurrenceOutOfRange {
                        line: line_number,
                        index,
                        found: spans.len(),
                    })?
            }
        };

        let token = &line[span.clone()];
        let prefix = self.relabel(&line[..span.start]);
        let suffix = self.relabel(&line[span.end..]);

        let (value, outcome, signature) = self.resolve_token(token, line_number);

        let mut text = String::with_capacity(line.len() + 32);
        text.push_str(&prefix);
        text.push_str(&value);
        text.push_str(&suffix);

        if !self.config.minimal_comments {
            text.push_str(&diagnostic(&outcome));
            if let Some(signature) = signature.filter(|s| !s.trim().is_empty()) {
                text.push_str(" | ");
                text.push_str(signature);
            }
        }

        Ok(LineRewrite::Rewritten { text, outcome })
    }

    fn resolve_token(
        &self,
        token: &str,
        line_number: usize,
    ) -> (Cow<'_, str>, TokenOutcome, Option<&'_ str>) {
        let Ok(id) = token.parse::<MessageId>() else {
            debug!("Line {}: invalid message id '{}'", line_number, token);
            return (
                Cow::Borrowed(UNRESOLVED),
                TokenOutcome::Invalid(token.to_string()),
                None,
            );
        };

        match self.resolver.resolve(id) {
            MatchOutcome::IdNotFound => {
                debug!("Line {}: message {} not in previous revision", line_number, id);
                (Cow::Borrowed(UNRESOLVED), TokenOutcome::NotFound(id), None)
            }
            MatchOutcome::NoCandidate => {
                debug!("Line {}: no match for message {}", line_number, id);
                (Cow::Borrowed(UNRESOLVED), TokenOutcome::NoMatch(id), None)
            }
            MatchOutcome::Resolved(record) => {
                trace!("Line {}: {} -> {}", line_number, id, record.id);
                let value = if self.config.output_fingerprints {
                    Cow::Borrowed(record.fingerprint.as_str())
                } else {
                    Cow::Owned(record.id.to_string())
                };
                (
                    value,
                    TokenOutcome::Matched {
                        previous: id,
                        current: record.id,
                    },
                    Some(record.display_signature.as_str()),
                )
            }
        }
    }

    /// Token spans on the line: the first participating group of each match,
    /// or the whole match for patterns without groups
    fn token_spans(&self, line: &str) -> Vec<Range<usize>> {
        self.config
            .pattern
            .captures_iter(line)
            .filter_map(|caps| {
                (1..caps.len())
                    .find_map(|group| caps.get(group))
                    .or_else(|| caps.get(0))
                    .map(|m| m.range())
            })
            .collect()
    }

    fn relabel<'s>(&self, text: &'s str) -> Cow<'s, str> {
        let previous = self.config.previous_label.as_str();
        if previous.is_empty() || previous == self.config.current_label || !text.contains(previous) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.replace(previous, &self.config.current_label))
        }
    }
}

fn diagnostic(outcome: &TokenOutcome) -> String {
    match outcome {
        TokenOutcome::Invalid(token) => format!(" //! Invalid Message ID: {}", token),
        TokenOutcome::NotFound(id) => format!(" //! Message Not Found: {}", id),
        TokenOutcome::NoMatch(id) => format!(" //! No Matches: {}", id),
        TokenOutcome::Matched { previous, .. } => format!(" // {}", previous),
    }
}

/// Removes a trailing comment from a line
///
/// Scans backward for the last `//` whose preceding character satisfies
/// `boundary`; markers after anything else (`https://`, `a = 1;//`) are left
/// alone. Returns `None` for comment-only lines: nothing but whitespace
/// survives the cut, or the line begins with a marker that is still present.
pub fn strip_trailing_comment(line: &str, boundary: CommentBoundary) -> Option<&str> {
    let Some(first) = line.find(COMMENT_MARKER) else {
        return Some(line);
    };

    let cut = find_comment_boundary(line, boundary);
    let kept = match cut {
        Some(cut) => line[..cut].trim_end(),
        None => line,
    };

    if kept.trim().is_empty() {
        return None;
    }
    // a marker left inside the kept text marks the whole line as commented
    if first < kept.len() && (cut.is_some() || line[..first].trim().is_empty()) {
        return None;
    }
    Some(kept)
}

fn find_comment_boundary(line: &str, boundary: CommentBoundary) -> Option<usize> {
    let bytes = line.as_bytes();
    let marker = COMMENT_MARKER.as_bytes();
    let mut i = bytes.len().checked_sub(marker.len())?;

    loop {
        if i > 0 && &bytes[i..i + marker.len()] == marker && boundary.accepts(bytes[i - 1]) {
            return Some(i);
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

fn split_line_ending(buf: &str) -> (&str, &str) {
    if let Some(line) = buf.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = buf.strip_suffix('\n') {
        (line, "\n")
    } else {
        (buf, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Direction, MessageRecord};
    use crate::matcher::RevisionMatcher;
    use pretty_assertions::assert_eq;

    fn out(id: MessageId, fingerprint: &str) -> MessageRecord {
        MessageRecord::new(id, fingerprint, Direction::Outgoing)
    }

    fn catalogs() -> (Catalog, Catalog) {
        let previous = Catalog::from_records(
            Direction::Outgoing,
            vec![out(10, "F"), out(11, "G"), out(12, "H")],
        )
        .unwrap();
        let current = Catalog::from_records(
            Direction::Outgoing,
            vec![
                out(55, "F"),
                out(70, "H").signature("(ticket:String)"),
                out(80, "G").references(0),
            ],
        )
        .unwrap();
        (previous, current)
    }

    fn run(config: &PatchConfig, input: &str) -> (String, PatchSummary) {
        let (previous, current) = catalogs();
        let index = current.index();
        let matcher = RevisionMatcher::new(&previous, &index);
        let patcher = Patcher::new(config, &matcher);

        let mut output = Vec::new();
        let summary = patcher.patch(input.as_bytes(), &mut output).unwrap();
        (String::from_utf8(output).unwrap(), summary)
    }

    fn config() -> PatchConfig {
        PatchConfig::new(DEFAULT_PATTERN, "v100", "v200").unwrap()
    }

    #[test]
    fn test_patch_relabels_and_annotates() {
        let (output, summary) = run(&config(), "const MSG_LOGIN = 10; // v100\n");

        assert_eq!(
            output,
            "// Current: v200\n// Previous: v100\nconst MSG_LOGIN = 55; // v200 // 10\n"
        );
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.to_string(), "1/1");
    }

    #[test]
    fn test_patch_appends_signature() {
        let (output, _) = run(&config().minimal_comments(false), "Login = 12;\n");
        assert!(output.ends_with("Login = 70; // 12 | (ticket:String)\n"));
    }

    #[test]
    fn test_unparsable_token() {
        let config = PatchConfig::new(r"=\s*(\w+)", "v100", "v200")
            .unwrap()
            .minimal_comments(true);
        let (output, summary) = run(&config, "Login = abc;\n");

        assert_eq!(output, "Login = -1;\n");
        assert_eq!(summary.attempts, 0);
        assert_eq!(summary.invalid, 1);

        let config = config.minimal_comments(false);
        let (output, _) = run(&config, "Login = abc;\n");
        assert!(output.ends_with("Login = -1; //! Invalid Message ID: abc\n"));
    }

    #[test]
    fn test_id_not_found() {
        let (output, summary) = run(&config(), "Login = 99;\n");

        assert!(output.ends_with("Login = -1; //! Message Not Found: 99\n"));
        assert_eq!(summary.attempts, 0);
        assert_eq!(summary.not_found, 1);
    }

    #[test]
    fn test_no_candidate() {
        // 11 has fingerprint G, only carried by a dead record now
        let (output, summary) = run(&config(), "Login = 11;\n");

        assert!(output.ends_with("Login = -1; //! No Matches: 11\n"));
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.successes, 0);
        assert_eq!(summary.to_string(), "0/1");
    }

    #[test]
    fn test_output_fingerprints() {
        let config = config().minimal_comments(true).output_fingerprints(true);
        let (output, summary) = run(&config, "Login = 10;\n");

        assert_eq!(output, "Login = F;\n");
        assert_eq!(summary.successes, 1);
    }

    #[test]
    fn test_lines_without_ids_are_copied() {
        let config = config().minimal_comments(true);
        let input = "namespace Protocol\r\n{\r\n    Login = 10;\r\n}";
        let (output, summary) = run(&config, input);

        assert_eq!(output, "namespace Protocol\r\n{\r\n    Login = 55;\r\n}");
        assert_eq!(summary.lines, 4);
    }

    #[test]
    fn test_comment_only_lines_are_skipped() {
        let config = config().minimal_comments(true);
        let input = "// header v100\n    // Login = 10;\nLogin = 10;\n";
        let (output, summary) = run(&config, input);

        assert_eq!(output, "Login = 55;\n");
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn test_attached_comment_is_cut() {
        let config = config().minimal_comments(true);
        let (output, _) = run(&config, "Login = 10;Handshake//Login = 11\n");
        assert_eq!(output, "Login = 55;Handshake\n");
    }

    #[test]
    fn test_spaced_boundary_cuts_trailing_comments() {
        let config = config()
            .minimal_comments(true)
            .comment_boundary(CommentBoundary::Spaced);
        let (output, summary) = run(&config, "Login = 10; // was = 12\n");

        assert_eq!(output, "Login = 55;\n");
        assert_eq!(summary.successes, 1);
    }

    #[test]
    fn test_url_is_not_a_comment() {
        let config = config().minimal_comments(true);
        let (output, _) = run(&config, "Url = \"https://example.org\"; Id = 10;\n");
        assert_eq!(output, "Url = \"https://example.org\"; Id = 55;\n");
    }

    #[test]
    fn test_occurrence_selection() {
        let config = PatchConfig::new(r"\d+", "", "")
            .unwrap()
            .minimal_comments(true);
        let (output, _) = run(&config, "Pair(10, 12)\n");
        assert_eq!(output, "Pair(10, 70)\n");

        let config = config.occurrence(Occurrence::Index(0));
        let (output, _) = run(&config, "Pair(10, 12)\n");
        assert_eq!(output, "Pair(55, 12)\n");
    }

    #[test]
    fn test_occurrence_out_of_range_is_fatal() {
        let (previous, current) = catalogs();
        let index = current.index();
        let matcher = RevisionMatcher::new(&previous, &index);
        let config = config().occurrence(Occurrence::Index(2));
        let patcher = Patcher::new(&config, &matcher);

        let err = patcher
            .patch("A = 10;\nB = 12;\n".as_bytes(), Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OccurrenceOutOfRange {
                line: 1,
                index: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let err = PatchConfig::new(r"=\s*(\d+", "a", "b").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_strip_trailing_comment() {
        use CommentBoundary::*;

        assert_eq!(strip_trailing_comment("a = 1;", Attached), Some("a = 1;"));
        assert_eq!(strip_trailing_comment("a = 1; // x", Attached), Some("a = 1; // x"));
        assert_eq!(strip_trailing_comment("a = 1; // x", Spaced), Some("a = 1;"));
        assert_eq!(strip_trailing_comment("a = 1;  note//x", Attached), Some("a = 1;  note"));
        assert_eq!(strip_trailing_comment("//", Attached), None);
        assert_eq!(strip_trailing_comment("   // x", Spaced), None);
        assert_eq!(strip_trailing_comment("  //a = 1;b//c", Attached), None);
        assert_eq!(
            strip_trailing_comment("u = \"http://x\";", Spaced),
            Some("u = \"http://x\";")
        );
        assert_eq!(strip_trailing_comment("", Attached), Some(""));
    }

    #[test]
    fn test_cut_line_with_earlier_marker_is_skipped() {
        use CommentBoundary::*;

        assert_eq!(
            strip_trailing_comment("Login = 10; // see Handshake//old", Attached),
            None
        );
        assert_eq!(strip_trailing_comment("Login = 10; // see // old", Spaced), None);
        // without a cut the same earlier marker is kept as content
        assert_eq!(
            strip_trailing_comment("Login = 10; // see 12", Attached),
            Some("Login = 10; // see 12")
        );

        let config = config().minimal_comments(true);
        let (output, summary) = run(&config, "Login = 10; // see Handshake//old
Login = 10;
");
        assert_eq!(output, "Login = 55;\n");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.attempts, 1);
    }

    #[test]
    fn test_relabel_is_skipped_for_empty_label() {
        let config = PatchConfig::new(DEFAULT_PATTERN, "", "v200")
            .unwrap()
            .minimal_comments(true);
        let (output, _) = run(&config, "A = 10; x\n");
        assert_eq!(output, "A = 55; x\n");
    }

    #[test]
    fn test_occurrence_from_str() {
        assert_eq!("last".parse::<Occurrence>(), Ok(Occurrence::Last));
        assert_eq!("LAST".parse::<Occurrence>(), Ok(Occurrence::Last));
        assert_eq!("3".parse::<Occurrence>(), Ok(Occurrence::Index(3)));
        assert!("-1".parse::<Occurrence>().is_err());
        assert_eq!(Occurrence::Index(4).to_string(), "4");
    }

    #[test]
    fn test_summary_merge() {
        let mut total = PatchSummary::default();
        let (_, a) = run(&config(), "A = 10;\nB = 11;\n");
        let (_, b) = run(&config(), "C = 12;\nD = 99;\n");
        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.attempts, 3);
        assert_eq!(total.successes, 2);
        assert_eq!(total.not_found, 1);
        assert_eq!(total.to_string(), "2/3");
    }
}
