//! bbatool CLI - Command-line tool for The Settlers 7 BBA archives.
//!
//! This is the main entry point for the bbatool command-line application.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use bbatool::prelude::*;

/// bbatool - The Settlers 7 BBA archive tool
#[derive(Parser)]
#[command(name = "bbatool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from a BBA archive
    Unpack {
        /// Path to the BBA file
        #[arg(env = "BBA_ARCHIVE")]
        archive: PathBuf,

        /// Output directory (defaults to <archive>_Extracted)
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: Option<PathBuf>,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Rebuild a BBA archive from a folder
    Pack {
        /// Path to the BBA file to rewrite
        #[arg(env = "BBA_ARCHIVE")]
        archive: PathBuf,

        /// Folder to pack
        #[arg(short, long, env = "INPUT_FOLDER")]
        input: PathBuf,

        /// Extra extensions to store gzip-compressed (e.g. xml)
        #[arg(short, long, value_delimiter = ',')]
        compress: Vec<String>,
    },

    /// List contents of a BBA archive
    List {
        /// Path to the BBA file
        #[arg(env = "BBA_ARCHIVE")]
        archive: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        /// Print entries as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Check the directory and payload checksums of a BBA archive
    Verify {
        /// Path to the BBA file
        #[arg(env = "BBA_ARCHIVE")]
        archive: PathBuf,
    },

    /// Create an empty BBA archive
    Create {
        /// Path of the new BBA file
        archive: PathBuf,

        /// Use the demo cipher variant
        #[arg(long)]
        demo: bool,

        /// Number of hash slots (fixed for the life of the archive)
        #[arg(short, long, default_value_t = 4096)]
        slots: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Unpack { archive, output, filter } => {
            cmd_unpack(&archive, output.as_deref(), filter.as_deref())?;
        }
        Commands::Pack { archive, input, compress } => {
            cmd_pack(&archive, &input, &compress)?;
        }
        Commands::List { archive, filter, detailed, json } => {
            cmd_list(&archive, filter.as_deref(), detailed, json)?;
        }
        Commands::Verify { archive } => {
            cmd_verify(&archive)?;
        }
        Commands::Create { archive, demo, slots } => {
            cmd_create(&archive, demo, slots)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {wide_msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn open_archive(path: &Path) -> Result<BbaArchive> {
    BbaArchive::open(path).with_context(|| format!("Failed to open BBA archive {}", path.display()))
}

fn cmd_unpack(archive_path: &Path, output: Option<&Path>, filter: Option<&str>) -> Result<()> {
    println!("Opening BBA archive: {}", archive_path.display());

    let start = Instant::now();
    let archive = open_archive(archive_path)?;
    println!(
        "Loaded {} entries ({} variant) in {:?}",
        archive.entry_count(),
        archive.variant(),
        start.elapsed()
    );

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| archive.default_output_dir());
    let filter = filter.map(NameFilter::new);

    let pb = progress_bar(archive.entry_count())?;
    let start = Instant::now();
    let report = archive
        .unpack_with_progress(&output, filter.as_ref(), |done, _, entry| {
            pb.set_position(done as u64);
            pb.set_message(entry.name().to_string());
        })
        .context("Failed to extract archive")?;
    pb.finish_with_message("Done");

    println!(
        "Extracted {} files and {} directories ({} bytes, {} skipped) to {} in {:?}",
        report.files,
        report.directories,
        report.bytes,
        report.skipped,
        output.display(),
        start.elapsed()
    );

    Ok(())
}

fn cmd_pack(archive_path: &Path, input: &Path, compress: &[String]) -> Result<()> {
    println!("Packing {} into {}", input.display(), archive_path.display());

    let mut archive = open_archive(archive_path)?;
    for extension in compress {
        if !archive.extensions_mut().register(extension, FileKind::Compressed) {
            anyhow::bail!("Invalid extension: {extension:?}");
        }
    }

    let pb = progress_bar(0)?;
    let start = Instant::now();
    let (archive, report) = archive
        .pack_with_progress(input, |done, total, name| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            pb.set_message(name.to_string());
        })
        .context("Failed to pack archive")?;
    pb.finish_with_message("Done");

    println!(
        "Packed {} entries ({} files, {} compressed, {} payload bytes) in {:?}",
        report.entries,
        report.files,
        report.compressed,
        report.payload_bytes,
        start.elapsed()
    );
    if report.released_slots > 0 {
        println!("Released {} stale hash slots", report.released_slots);
    }
    if !report.unindexed.is_empty() {
        eprintln!(
            "Warning: {} entries have no hash slot ({} slots total):",
            report.unindexed.len(),
            archive.hash_slots().len()
        );
        for name in &report.unindexed {
            eprintln!("  {name}");
        }
    }

    Ok(())
}

fn cmd_list(archive_path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let filter = filter.map(NameFilter::new);

    let entries: Vec<EntryInfo> = match &filter {
        Some(filter) => archive.iter().filter(|e| filter.matches(&e.name)).collect(),
        None => archive.iter().collect(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?
        );
        return Ok(());
    }

    for entry in &entries {
        if detailed {
            println!(
                "{:>12} {:>12} {:>5} {:08x} {}",
                entry.compressed_size,
                entry.decompressed_size,
                entry.kind.label(),
                entry.decompressed_crc32,
                entry.name
            );
        } else {
            println!("{}", entry.name);
        }
    }

    println!("\nTotal: {} entries", entries.len());
    if !archive.orphaned_slots().is_empty() {
        println!("Orphaned hash slots: {}", archive.orphaned_slots().len());
    }

    Ok(())
}

fn cmd_verify(archive_path: &Path) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let start = Instant::now();
    let report = archive.verify().context("Failed to verify archive")?;

    println!(
        "Directory blob CRC: expected {:08x}, actual {:08x}",
        report.blob_crc32_expected, report.blob_crc32_actual
    );
    for mismatch in &report.mismatches {
        println!(
            "  {} ({}): expected {:08x}, actual {:08x}",
            mismatch.name, mismatch.field, mismatch.expected, mismatch.actual
        );
    }
    for (name, error) in &report.failures {
        println!("  {name}: {error}");
    }

    println!(
        "Checked {} payloads in {:?}: {} mismatches, {} failures",
        report.checked,
        start.elapsed(),
        report.mismatches.len(),
        report.failures.len()
    );

    if !report.is_ok() {
        anyhow::bail!("Archive failed verification");
    }
    Ok(())
}

fn cmd_create(archive_path: &Path, demo: bool, slots: usize) -> Result<()> {
    let variant = if demo { Variant::Demo } else { Variant::Product };
    let archive = BbaArchive::create(archive_path, variant, slots)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;

    println!(
        "Created {} ({} variant, {} hash slots)",
        archive.path().display(),
        archive.variant(),
        archive.hash_slots().len()
    );

    Ok(())
}
