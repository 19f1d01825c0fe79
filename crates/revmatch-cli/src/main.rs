//! revmatch - Carry protocol message ids across client revisions
//!
//! This tool reports the message catalogs of a client revision and rewrites
//! header files written for an older revision so that their ids match a
//! newer one.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use revmatch_core::report::report_revision;
use revmatch_core::{
    load_revision, render_revision, CommentBoundary, Direction, Occurrence, PatchConfig,
    PatchSummary, Patcher, Revision, RevisionMatcher, StatsWriter, DEFAULT_PATTERN,
};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::{DirEntry, WalkDir};

/// File name of the catalog report
const REPORT_FILE_NAME: &str = "Messages.txt";

/// Carry protocol message ids across client revisions
#[derive(Parser, Debug)]
#[command(name = "revmatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the annotated message report of a revision
    Report(ReportArgs),
    /// Rewrite header files from a previous revision to the current one
    Match(MatchArgs),
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Revision snapshot to report
    snapshot: PathBuf,

    /// Output directory for Messages.txt
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Overwrite an existing report
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Snapshot of the revision the headers were written for
    #[arg(long)]
    previous: PathBuf,

    /// Snapshot of the revision to update the headers to
    #[arg(long)]
    current: PathBuf,

    #[command(flatten)]
    headers: HeaderInputs,

    /// Regular expression locating the id on a line; the first capture group is the id
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Which match on a line holds the id: 'last' or a zero-based index
    #[arg(long, default_value = "last")]
    index: Occurrence,

    /// Omit the revision banner and all diagnostic comments
    #[arg(long)]
    minimal_comments: bool,

    /// Write message fingerprints instead of ids
    #[arg(long)]
    output_hashes: bool,

    /// Also treat `//` after whitespace as the start of a trailing comment
    #[arg(long)]
    strip_spaced_comments: bool,

    /// Output directory for patched files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Overwrite existing output files
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = true)]
struct HeaderInputs {
    /// Header file or directory holding outgoing (client) message ids
    #[arg(long)]
    client_headers: Option<PathBuf>,

    /// Header file or directory holding incoming (server) message ids
    #[arg(long)]
    server_headers: Option<PathBuf>,
}

impl HeaderInputs {
    fn by_direction(&self) -> impl Iterator<Item = (Direction, &Path)> {
        [
            (Direction::Outgoing, self.client_headers.as_deref()),
            (Direction::Incoming, self.server_headers.as_deref()),
        ]
        .into_iter()
        .filter_map(|(direction, path)| path.map(|p| (direction, p)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    run(&cli)
}

/// Dispatch the parsed subcommand
fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Report(args) => run_report(args).map(|_| ()),
        Command::Match(args) => run_match(args).map(|_| ()),
    }
}

/// Load a snapshot file with path context
fn load(path: &Path) -> Result<Revision> {
    if !path.is_file() {
        bail!("Snapshot does not exist: {}", path.display());
    }
    load_revision(path).with_context(|| format!("Failed to load snapshot: {}", path.display()))
}

/// Write the message report of one revision
fn run_report(args: &ReportArgs) -> Result<PathBuf> {
    let revision = load(&args.snapshot)?;

    let mut stats = StatsWriter::default();
    report_revision(&revision, &mut stats).context("Failed to count messages")?;
    info!(
        "Revision {}: {} messages, {} unique, {} in {} collision group(s), {} dead",
        revision.label(),
        stats.total_count,
        stats.unique_count,
        stats.collision_count,
        stats.group_count,
        stats.dead_count
    );

    let report_path = args.output.join(REPORT_FILE_NAME);
    let report = render_revision(&revision).context("Failed to render report")?;
    write_output_file(&report_path, &report, args.force)?;
    println!("Messages Saved: {}", report_path.display());

    Ok(report_path)
}

/// Patch every requested header input and return the combined counters
fn run_match(args: &MatchArgs) -> Result<PatchSummary> {
    let previous = load(&args.previous)?;
    let current = load(&args.current)?;

    let boundary = if args.strip_spaced_comments {
        CommentBoundary::Spaced
    } else {
        CommentBoundary::Attached
    };
    let config = PatchConfig::new(&args.pattern, previous.label(), current.label())
        .context("Invalid identifier pattern")?
        .occurrence(args.index)
        .minimal_comments(args.minimal_comments)
        .output_fingerprints(args.output_hashes)
        .comment_boundary(boundary);

    info!("Matching {} -> {}", previous.label(), current.label());

    let mut total = PatchSummary::default();
    for (direction, input) in args.headers.by_direction() {
        let index = current.catalog(direction).index();
        let matcher = RevisionMatcher::new(previous.catalog(direction), &index);
        let patcher = Patcher::new(&config, &matcher);

        let mut direction_total = PatchSummary::default();
        for (source, destination) in collect_inputs(input, &args.output)? {
            debug!("Patching {} -> {}", source.display(), destination.display());
            let summary = patch_file(&patcher, &source, &destination, args.force)?;
            println!(
                "{} {}: Matches: {}",
                direction,
                destination.display(),
                summary
            );
            direction_total.merge(&summary);
        }

        info!(
            "{} messages: {} matched of {} attempts ({} invalid, {} not found, {} without candidate)",
            direction,
            direction_total.successes,
            direction_total.attempts,
            direction_total.invalid,
            direction_total.not_found,
            direction_total.no_match
        );
        total.merge(&direction_total);
    }

    Ok(total)
}

/// Pair every input file with its output path
///
/// A single file lands directly in the output directory; a directory is
/// walked recursively and its layout kept below the output directory.
fn collect_inputs(input: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    if input.is_file() {
        let name = input
            .file_name()
            .with_context(|| format!("Input has no file name: {}", input.display()))?;
        return Ok(vec![(input.to_path_buf(), output_dir.join(name))]);
    }
    if !input.is_dir() {
        bail!("Header input does not exist: {}", input.display());
    }

    info!("Scanning directory: {}", input.display());

    let mut pairs = Vec::new();
    for entry in WalkDir::new(input)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(input)
            .with_context(|| format!("Unexpected path: {}", entry.path().display()))?;
        pairs.push((entry.path().to_path_buf(), output_dir.join(relative)));
    }

    trace!("Found {} header file(s) in {}", pairs.len(), input.display());
    Ok(pairs)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Patch one file into its destination
fn patch_file(
    patcher: &Patcher<'_, RevisionMatcher<'_>>,
    source: &Path,
    destination: &Path,
    force: bool,
) -> Result<PatchSummary> {
    if same_file(source, destination) {
        bail!(
            "Refusing to overwrite input file: {} (choose another --output)",
            source.display()
        );
    }
    prepare_destination(destination, force)?;

    let input = fs::File::open(source)
        .with_context(|| format!("Failed to open input file: {}", source.display()))?;
    let output = fs::File::create(destination)
        .with_context(|| format!("Failed to create file: {}", destination.display()))?;

    patcher
        .patch(BufReader::new(input), BufWriter::new(output))
        .with_context(|| format!("Failed to patch {}", source.display()))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Create parent directories and refuse to clobber without `--force`
fn prepare_destination(path: &Path, force: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Ok(())
}

/// Write a whole output file
fn write_output_file(path: &Path, content: &str, force: bool) -> Result<()> {
    prepare_destination(path, force)?;
    fs::write(path, content).with_context(|| format!("Failed to write file: {}", path.display()))
}
