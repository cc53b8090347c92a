//! xrescfg - Inspect xresloader config tables through runtime protobuf descriptors
//!
//! This tool registers compiled descriptor sets (`.pb` files produced by
//! `protoc --descriptor_set_out`), loads one data-block table against them
//! and prints its rows, or looks rows up by a key field.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use xrescfg_core::{ConfigSet, FsSource, KeyPart, LoaderConfig, Registry};

/// Inspect xresloader config tables through runtime protobuf descriptors
#[derive(Parser, Debug)]
#[command(name = "xrescfg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Descriptor set file to register (repeatable, registered in order)
    #[arg(long = "descriptor")]
    descriptors: Vec<PathBuf>,

    /// Directory searched recursively for `.pb` descriptor sets
    #[arg(long)]
    descriptor_dir: Option<PathBuf>,

    /// Directory table files are resolved against
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Table file to load; without it the registry summary is printed
    #[arg(short, long, requires = "message")]
    data: Option<String>,

    /// Qualified message name of the table rows
    #[arg(short, long)]
    message: Option<String>,

    /// Field to build the key-value index on
    #[arg(short, long, requires = "data")]
    key: Option<String>,

    /// Key value to look up (repeatable)
    #[arg(short, long, requires = "key")]
    lookup: Vec<String>,

    /// Qualified name of the container message
    #[arg(long, default_value = xrescfg_core::DATABLOCKS_MESSAGE)]
    container: String,

    /// Repeated bytes field of the container holding the rows
    #[arg(long, default_value = xrescfg_core::DATABLOCKS_FIELD)]
    data_block_field: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Output format for rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Text dump of every row
    Text,
    /// Only the number of rows
    Count,
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
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    run(&cli, &mut stdout.lock())
}

/// Descriptor set files named on the command line, then those found in
/// `--descriptor-dir` in path order
fn descriptor_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut files = cli.descriptors.clone();

    if let Some(dir) = &cli.descriptor_dir {
        if !dir.is_dir() {
            bail!("Descriptor directory does not exist: {}", dir.display());
        }

        let mut found: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pb"))
            .collect();
        found.sort();
        debug!("Found {} descriptor sets in {}", found.len(), dir.display());
        files.extend(found);
    }

    if files.is_empty() {
        bail!("No descriptor sets given, use --descriptor or --descriptor-dir");
    }
    Ok(files)
}

fn build_registry(files: &[PathBuf]) -> Result<Registry> {
    let mut registry = Registry::new();
    for file in files {
        registry
            .register_file(file)
            .with_context(|| format!("Failed to register {}", file.display()))?;
        info!("Registered {}", file.display());
    }
    Ok(registry)
}

fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let files = descriptor_files(cli)?;
    let registry = Arc::new(build_registry(&files)?);

    let (Some(data), Some(message)) = (&cli.data, &cli.message) else {
        write!(out, "{}", registry.summary())?;
        return Ok(());
    };

    let source = match &cli.root {
        Some(root) => FsSource::with_root(root),
        None => FsSource::new(),
    };
    let loader = LoaderConfig::new()
        .container_message(cli.container.as_str())
        .data_block_field(cli.data_block_field.as_str());
    let mut table = ConfigSet::new(
        Arc::clone(&registry),
        Arc::new(source),
        data.as_str(),
        message.as_str(),
        loader,
    );

    if let Some(key) = &cli.key {
        table
            .add_kv_index_auto(key)
            .with_context(|| format!("Cannot index {} by {}", message, key))?;
    }

    let report = table
        .reload()
        .with_context(|| format!("Failed to load {}", data))?;
    for error in report.errors.iter() {
        eprintln!("warning: {}", error);
    }
    info!(
        "Loaded {} rows from {} ({} filtered, {} failed)",
        report.loaded,
        data,
        report.filtered,
        report.errors.len()
    );

    if cli.lookup.is_empty() {
        match cli.format {
            OutputFormat::Count => writeln!(out, "{}", table.rows().len())?,
            OutputFormat::Text => {
                for row in table.rows() {
                    writeln!(out, "{}", row)?;
                }
            }
        }
        return Ok(());
    }

    let key_field = match &cli.key {
        Some(key) => key,
        None => bail!("--lookup needs --key"),
    };
    let descriptor = registry
        .get_message_descriptor(message)
        .with_context(|| format!("Unknown message {}", message))?;
    let field = descriptor
        .field_by_name(key_field)
        .with_context(|| format!("Message {} has no field {}", message, key_field))?;

    let mut found = 0;
    for text in &cli.lookup {
        let part = KeyPart::parse_for(field, text)
            .with_context(|| format!("Cannot use {:?} as a {} key", text, field.kind()))?;
        match table.get_kv_auto(part) {
            Some(row) => {
                found += 1;
                if cli.format == OutputFormat::Text {
                    writeln!(out, "{}", row)?;
                }
            }
            None => eprintln!("{} {} not found", key_field, text),
        }
    }

    if cli.format == OutputFormat::Count {
        writeln!(out, "{}", found)?;
    }
    Ok(())
}
