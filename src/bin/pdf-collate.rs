//! PDF Collate CLI tool
//!
//! A command-line tool for merging PDFs with optional stamping, compression
//! and password protection.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pdf_collate::pdf::{inspect_path, merge_to_file, MergeJob};

/// PDF Collate - Merge PDFs, stamp a watermark and protect the result
#[derive(Parser)]
#[command(name = "pdf-collate")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge numbered PDFs in order
    pdf-collate merge -o handout.pdf \"[0-9]*.pdf\"

    # Stamp every page with the first page of a watermark PDF
    pdf-collate merge -o out.pdf --watermark draft.pdf a.pdf b.pdf

    # Diagonal text label, compression and a password
    pdf-collate merge -o out.pdf --stamp-text CONFIDENTIAL --compress --password secret *.pdf

    # Run a saved job
    pdf-collate merge --job handout.json -o out.pdf")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge PDF files into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// PDF whose first page is stamped on every page
        #[arg(long, conflicts_with = "stamp_text")]
        watermark: Option<PathBuf>,

        /// Text stamped diagonally on every page
        #[arg(long)]
        stamp_text: Option<String>,

        /// Password for the output file
        #[arg(long, env = "PDF_COLLATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Recompress content streams
        #[arg(long)]
        compress: bool,

        /// JSON job file; command-line options override its settings
        #[arg(long)]
        job: Option<PathBuf>,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Merge {
            inputs,
            output,
            watermark,
            stamp_text,
            password,
            compress,
            job,
        } => cmd_merge(inputs, output, watermark, stamp_text, password, compress, job),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Expand glob patterns in input paths
///
/// Matches of one pattern are sorted; patterns and literal paths keep the
/// order they were given in.
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = Vec::new();
            for entry in glob(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            matched.sort();
            paths.extend(matched);
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Merge PDFs into one
fn cmd_merge(
    inputs: Vec<String>,
    output: PathBuf,
    watermark: Option<PathBuf>,
    stamp_text: Option<String>,
    password: Option<String>,
    compress: bool,
    job_file: Option<PathBuf>,
) -> Result<()> {
    let mut job = match &job_file {
        Some(path) => MergeJob::load(path)
            .with_context(|| format!("Cannot load job file {}", path.display()))?,
        None => MergeJob::default(),
    };

    let inputs = expand_globs(inputs)?;
    if !inputs.is_empty() {
        job.inputs = inputs;
    }
    if watermark.is_some() {
        job.watermark = watermark;
        job.stamp_text = None;
    }
    if stamp_text.is_some() {
        job.stamp_text = stamp_text;
        job.watermark = None;
    }
    if password.is_some() {
        job.password = password;
    }
    job.compress |= compress;

    eprintln!("Merging {} PDF files...", job.inputs.len());

    merge_to_file(&job, &output).map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("Merge failed while {}", stage))
    })?;

    println!("{}", output.display());
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let metadata = inspect_path(&input)
        .with_context(|| format!("Cannot inspect {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Version: {}", metadata.version);
    println!("Pages: {}", metadata.page_count);
    println!("Encrypted: {}", if metadata.encrypted { "yes" } else { "no" });

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    for (i, size) in metadata.page_sizes.iter().enumerate() {
        println!("  Page {}: {} x {} pt", i + 1, size.width(), size.height());
    }

    Ok(())
}
