//! jungle - find the large and stale corners of a storage inventory.
//!
//! Usage:
//!   jungle analyze LISTING -o DIR   Report the shallowest large or stale subtrees
//!   jungle ages LISTING             Show the access-age distribution
//!   jungle owners LISTING -o DIR    Write per-owner storage summaries
//!   jungle export LISTING -o FILE   Write every parsed record as CSV
//!   jungle --help                   Show help

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use jungle_analyze::{AgeAnalyzer, AgeConfig, AnalysisReport, Analyzer, OwnerAnalyzer, format_age};
use jungle_core::{AgeCutoff, AnalysisConfig, RecordRow};
use jungle_ingest::{ListingParser, ListingReader, TreeBuilder};

#[derive(Parser)]
#[command(
    name = "jungle",
    version,
    about = "Find the large and stale corners of a storage inventory",
    long_about = "jungle reads a file-system inventory listing, totals every directory \
                  and reports the shallowest subtrees that are either larger than a size \
                  threshold or have not been accessed since a cutoff."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select large or stale subtrees and write CSV and tree JSON reports
    Analyze {
        /// Inventory listing to read
        listing: PathBuf,

        /// Directory the reports are written to
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        options: AnalysisArgs,

        /// Output format for the summary
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show how file sizes spread over access age
    Ages {
        /// Inventory listing to read
        listing: PathBuf,

        #[command(flatten)]
        options: AnalysisArgs,

        /// Number of largest files to list per bucket
        #[arg(short = 'n', long, default_value = "5")]
        top: usize,

        /// Directory for a per-file CSV tagged with each file's age bucket
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write per-owner totals and largest files as CSV
    Owners {
        /// Inventory listing to read
        listing: PathBuf,

        /// Directory the CSV files are written to
        #[arg(short, long)]
        output: PathBuf,

        /// Number of largest files kept per owner
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Owner to leave out (repeatable)
        #[arg(long = "exclude-owner")]
        exclude_owners: Vec<String>,

        /// Prefix removed from every listed path
        #[arg(long)]
        strip_prefix: Option<String>,
    },

    /// Write every parsed record as one CSV row
    Export {
        /// Inventory listing to read
        listing: PathBuf,

        /// CSV file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Owner to leave out (repeatable)
        #[arg(long = "exclude-owner")]
        exclude_owners: Vec<String>,

        /// Prefix removed from every listed path
        #[arg(long)]
        strip_prefix: Option<String>,
    },
}

/// Options shared by the tree-building commands. Flags override `--config`.
#[derive(Args, Debug, Default)]
struct AnalysisArgs {
    /// JSON file with an analysis config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Size threshold in GB (10^9 bytes)
    #[arg(long)]
    gb_threshold: Option<f64>,

    /// Staleness cutoff as an age before now (e.g. "5", "5y", "18m", "90d")
    #[arg(long, conflicts_with = "cutoff")]
    years: Option<String>,

    /// Absolute staleness cutoff (Unix seconds or YYYY-MM-DD)
    #[arg(long)]
    cutoff: Option<String>,

    /// Shallowest depth that may be reported
    #[arg(long)]
    min_depth: Option<u32>,

    /// Fold paths deeper than this into their ancestor at this depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Restrict the analysis to this absolute path
    #[arg(long)]
    root: Option<String>,

    /// Prefix removed from every listed path
    #[arg(long)]
    strip_prefix: Option<String>,

    /// Glob of paths to skip (repeatable)
    #[arg(long = "ignore")]
    ignore_patterns: Vec<String>,

    /// Owner to leave out (repeatable)
    #[arg(long = "exclude-owner")]
    exclude_owners: Vec<String>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

impl AnalysisArgs {
    /// Resolve the effective config: file (or defaults), then flags.
    fn load(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .wrap_err_with(|| format!("Cannot read config {}", path.display()))?;
                AnalysisConfig::from_json(&text)
                    .wrap_err_with(|| format!("Invalid config {}", path.display()))?
            }
            None => AnalysisConfig::default(),
        };

        if let Some(gb) = self.gb_threshold {
            config.gb_threshold = gb;
        }
        if let Some(years) = &self.years {
            config.age_cutoff = Some(AgeCutoff::YearsBefore(parse_age(years)?));
        }
        if let Some(cutoff) = &self.cutoff {
            config.age_cutoff = Some(AgeCutoff::Timestamp(parse_cutoff(cutoff)?));
        }
        if let Some(depth) = self.min_depth {
            config.min_depth = depth;
        }
        if self.max_depth.is_some() {
            config.max_depth = self.max_depth;
        }
        if self.root.is_some() {
            config.root = self.root.clone();
        }
        if self.strip_prefix.is_some() {
            config.strip_prefix = self.strip_prefix.clone();
        }
        config.ignore_patterns.extend(self.ignore_patterns.iter().cloned());
        config.exclude_owners.extend(self.exclude_owners.iter().cloned());
        if let Some(threads) = self.threads {
            config.threads = threads;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze {
            listing,
            output,
            options,
            format,
        } => {
            let config = options.load()?;
            run_analyze(&listing, &output, config, format)?;
        }
        Command::Ages {
            listing,
            options,
            top,
            output,
            format,
        } => {
            let config = options.load()?;
            run_ages(&listing, output.as_deref(), config, top, format)?;
        }
        Command::Owners {
            listing,
            output,
            top,
            exclude_owners,
            strip_prefix,
        } => {
            run_owners(&listing, &output, top, exclude_owners, strip_prefix)?;
        }
        Command::Export {
            listing,
            output,
            exclude_owners,
            strip_prefix,
        } => {
            eprintln!("Reading {}...", listing.display());
            let counts = export_records(&listing, &output, &exclude_owners, strip_prefix)?;
            println!(
                " {} records written, {} lines read, {} malformed, {} excluded",
                counts.written, counts.lines, counts.malformed, counts.excluded
            );
            eprintln!("Wrote {}", output.display());
        }
    }

    Ok(())
}

/// Log to stderr; `warn` by default, raised by `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

/// Build the tree, select the frontier and write both reports.
fn run_analyze(listing: &Path, output: &Path, config: AnalysisConfig, format: OutputFormat) -> Result<()> {
    eprintln!("Reading {}...", listing.display());

    let builder = TreeBuilder::new(config.clone())?;
    let progress = builder.subscribe();
    let mut tree = builder
        .build_from_listing(listing)
        .wrap_err("Failed to build the path tree")?;
    if let Some(last) = progress.try_iter().last() {
        eprintln!(
            "Read {} lines in {:.2}s ({:.0} lines/s)",
            last.lines_read,
            last.elapsed.as_secs_f64(),
            last.lines_per_second()
        );
    }

    let report = Analyzer::new(config).analyze(&mut tree);

    fs::create_dir_all(output)
        .wrap_err_with(|| format!("Cannot create output directory {}", output.display()))?;
    let stem = report_stem(listing);
    let csv_path = output.join(format!("{stem}.csv"));
    let json_path = output.join(format!("{stem}.tree.json"));
    write_csv(&csv_path, &report.rows)?;
    fs::write(&json_path, serde_json::to_string_pretty(&report.tree)?)
        .wrap_err_with(|| format!("Cannot write {}", json_path.display()))?;

    match format {
        OutputFormat::Text => print_summary(listing, &report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.summary)?),
    }
    eprintln!("Wrote {} and {}", csv_path.display(), json_path.display());

    Ok(())
}

/// Build the tree and bucket its files by access age.
fn run_ages(
    listing: &Path,
    output: Option<&Path>,
    config: AnalysisConfig,
    top: usize,
    format: OutputFormat,
) -> Result<()> {
    eprintln!("Reading {}...", listing.display());

    let tree = TreeBuilder::new(config)?
        .build_from_listing(listing)
        .wrap_err("Failed to build the path tree")?;

    let age_config = AgeConfig::builder()
        .top_files_per_bucket(top)
        .build()
        .map_err(|e| eyre!("Invalid age config: {e}"))?;
    let analyzer = AgeAnalyzer::with_config(age_config);
    let report = analyzer.analyze(&tree);

    if let Some(output) = output {
        fs::create_dir_all(output)
            .wrap_err_with(|| format!("Cannot create output directory {}", output.display()))?;
        let csv_path = output.join(format!("{}.ages.csv", report_stem(listing)));
        write_csv(&csv_path, analyzer.file_rows(&tree))?;
        eprintln!("Wrote {}", csv_path.display());
    }

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Access Age Distribution");
            println!("{}", "─".repeat(70));
            println!();

            let max_size = report.buckets.iter().map(|b| b.total_size).max().unwrap_or(0).max(1);
            for bucket in &report.buckets {
                let ratio = bucket.total_size as f64 / max_size as f64;
                println!(
                    "   {:<14} {:>10} {:>10} files  {}",
                    bucket.name,
                    format_size(bucket.total_size),
                    bucket.file_count,
                    make_bar(ratio, 30)
                );
            }
            println!();
            println!(
                " {} files, {} total, average age {}",
                report.total_files,
                format_size(report.total_size),
                format_age(report.average_age_years)
            );
            println!(" Median file falls in: {}", report.median_age_bucket);

            for bucket in report.buckets.iter().filter(|b| !b.largest_files.is_empty()) {
                println!();
                println!(" Largest in {}:", bucket.name);
                for file in &bucket.largest_files {
                    println!("   {:>10}  {}", format_size(file.size), truncate(&file.path, 70));
                }
            }
            println!();
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Stream the listing into per-owner summaries and write three CSV files.
fn run_owners(
    listing: &Path,
    output: &Path,
    top: usize,
    exclude_owners: Vec<String>,
    strip_prefix: Option<String>,
) -> Result<()> {
    eprintln!("Reading {}...", listing.display());

    let parser = ListingParser::new().with_strip_prefix(strip_prefix);
    let reader = ListingReader::new(parser, AnalysisConfig::default().channel_capacity).spawn(listing)?;

    let mut skipped = 0u64;
    let records = reader.batches().iter().flatten().filter_map(|line| match line.result {
        Ok(record) => Some(record),
        Err(error) => {
            debug!(line = line.line_number, %error, "skipping malformed line");
            skipped += 1;
            None
        }
    });
    let report = OwnerAnalyzer::new(top)
        .with_excluded(exclude_owners)
        .analyze(records);
    let lines = reader.join()?;

    if report.summaries.is_empty() {
        bail!("No owner records in {} ({lines} lines, {skipped} malformed)", listing.display());
    }

    fs::create_dir_all(output)
        .wrap_err_with(|| format!("Cannot create output directory {}", output.display()))?;
    write_csv(&output.join("top_files_per_owner.csv"), &report.top_files)?;
    write_csv(&output.join("owner_storage_summary.csv"), &report.summaries)?;
    write_csv(&output.join("biggest_file_per_owner.csv"), report.biggest_files())?;

    println!(
        " {} owners, {} lines read, {} malformed, {} duplicate paths",
        report.summaries.len(),
        lines,
        skipped,
        report.duplicates
    );
    for summary in report.summaries.iter().take(10) {
        println!(
            "   {:<16} {:>10} {:>10} files",
            truncate(&summary.owner, 16),
            format_size(summary.total_size),
            summary.file_count
        );
    }
    eprintln!("Wrote owner reports to {}", output.display());

    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct ExportCounts {
    written: u64,
    lines: u64,
    malformed: u64,
    excluded: u64,
}

/// Stream parsed records straight to a CSV file, one row per record.
fn export_records(
    listing: &Path,
    output: &Path,
    exclude_owners: &[String],
    strip_prefix: Option<String>,
) -> Result<ExportCounts> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Cannot create output directory {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(output)
        .wrap_err_with(|| format!("Cannot create {}", output.display()))?;

    let parser = ListingParser::new().with_strip_prefix(strip_prefix);
    let reader = ListingReader::new(parser, AnalysisConfig::default().channel_capacity).spawn(listing)?;

    let mut counts = ExportCounts::default();
    for line in reader.batches().iter().flatten() {
        match line.result {
            Ok(record) if exclude_owners.iter().any(|o| o == record.owner.as_str()) => {
                counts.excluded += 1;
            }
            Ok(record) => {
                writer.serialize(RecordRow::from(&record))?;
                counts.written += 1;
            }
            Err(error) => {
                debug!(line = line.line_number, %error, "skipping malformed line");
                counts.malformed += 1;
            }
        }
    }
    writer.flush()?;
    counts.lines = reader.join()?;

    Ok(counts)
}

/// Print the headline numbers and the selected subtrees.
fn print_summary(listing: &Path, report: &AnalysisReport) {
    let summary = &report.summary;
    let ingest = &summary.ingest;

    println!();
    println!("{}", "─".repeat(70));
    println!(" {} - {}", listing.display(), format_size(summary.total.size));
    println!(
        " {} records, {} files, {} skipped ({} malformed, {} conflicting), {} duplicates",
        ingest.records_seen,
        summary.total.file_count,
        ingest.skipped(),
        ingest.malformed,
        ingest.conflicts,
        ingest.duplicates
    );
    let cutoff = match summary.thresholds.age_cutoff {
        Some(ts) => format!("last access before {}", format_date(ts)),
        None => "any access".to_string(),
    };
    println!(
        " Thresholds: > {} or {}, from depth {}",
        format_size(summary.thresholds.size_bytes),
        cutoff,
        summary.min_depth
    );
    println!(
        " Selected {} subtrees ({} size, {} age, {} both) holding {}",
        summary.selected,
        summary.by_size,
        summary.by_age,
        summary.by_both,
        format_size(summary.reported_size)
    );
    println!("{}", "─".repeat(70));
    println!();

    let total = summary.total.size.max(1);
    for row in &report.rows {
        let age = row
            .oldest_access_age_years
            .map(format_age)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "   {:<40} {:>10} {:>12} {:<4} {}",
            truncate(&row.path, 40),
            format_size(row.aggregate_size),
            age,
            row.reason,
            make_bar(row.aggregate_size as f64 / total as f64, 10)
        );
    }
    if report.rows.is_empty() {
        println!(" Nothing exceeded the thresholds.");
    }
    println!();
}

fn write_csv<I>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let mut writer = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("Cannot create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// File stem the reports are named after.
fn report_stem(listing: &Path) -> String {
    listing
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "report".to_string())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in decimal units, matching the GB threshold.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}

fn format_date(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

/// Parse an age (e.g. "5", "5y", "18m", "2w", "90d") into years.
/// A bare number is years.
fn parse_age(s: &str) -> Result<f64> {
    let s = s.trim().to_lowercase();
    let day = 1.0 / 365.0;

    let (num, multiplier) = if let Some(num) = s.strip_suffix('y') {
        (num, 1.0)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 30.0 * day)
    } else if let Some(num) = s.strip_suffix('w') {
        (num, 7.0 * day)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, day)
    } else {
        (s.as_str(), 1.0)
    };

    let num: f64 = num
        .trim()
        .parse()
        .wrap_err_with(|| format!("Invalid age {s:?}"))?;
    Ok(num * multiplier)
}

/// Parse an absolute cutoff: Unix seconds or a `YYYY-MM-DD` date (UTC midnight).
fn parse_cutoff(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<i64>() {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .wrap_err_with(|| format!("Invalid cutoff {s:?}, expected Unix seconds or YYYY-MM-DD"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| eyre!("Invalid cutoff {s:?}"))
}
