//! CLI for hydroalign.
//!
//! Creates array stores from an axis config, converts exported series into
//! them, and inspects the result.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use hydroalign::{ArrayStore, BatchReport, ConvertConfig, JsonSource, OpenMode, WriteOutcome, convert};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// hydroalign: Align hydrological time series onto a fixed time axis.
#[derive(Parser)]
#[command(name = "hydroalign", version, about)]
struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create an empty store from an axis config.
    Init {
        /// Path of the store directory to create.
        store_path: PathBuf,

        /// JSON config describing the time axis and fill value.
        #[arg(long)]
        config: PathBuf,

        /// Replace an existing store at the same path.
        #[arg(long)]
        force: bool,
    },

    /// Align every exported series in a directory and write it into a store.
    Convert {
        /// Directory of exported `*.json` series.
        source_dir: PathBuf,

        /// Path to the store directory.
        store_path: PathBuf,

        /// Report format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Display the dimension, axis range, and variables of a store.
    Info {
        /// Path to the store directory.
        store_path: PathBuf,
    },

    /// Print one variable as CSV against the time axis.
    Dump {
        /// Path to the store directory.
        store_path: PathBuf,

        /// Variable name.
        variable: String,
    },
}

/// Output format for conversion reports.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One line per variable.
    Text,
    /// The full report as JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            store_path,
            config,
            force,
        } => cmd_init(&store_path, &config, force),
        Commands::Convert {
            source_dir,
            store_path,
            format,
        } => cmd_convert(&source_dir, &store_path, &format),
        Commands::Info { store_path } => cmd_info(&store_path),
        Commands::Dump {
            store_path,
            variable,
        } => cmd_dump(&store_path, &variable),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so that stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Implements `hydroalign init <store_path> --config <file> [--force]`.
fn cmd_init(store_path: &Path, config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConvertConfig::load(config_path)?;
    let axis = config.build_axis()?;

    if store_path.exists() {
        if !force {
            return Err(format!(
                "'{}' already exists (use --force to replace it)",
                store_path.display()
            )
            .into());
        }
        // Only ever delete something that is recognisably a store.
        if !store_path.join("meta.json").is_file() {
            return Err(format!(
                "refusing to replace '{}': not a hydroalign store",
                store_path.display()
            )
            .into());
        }
        // Fails if a conversion holds the store; otherwise keeps it locked until gone.
        ArrayStore::open(store_path, OpenMode::ReadWrite)?.destroy()?;
        info!(path = %store_path.display(), "removed existing store");
    }

    let store = ArrayStore::create(store_path, &axis, config.fill_value)?;

    println!("Created store: {}", store.path().display());
    println!("  Axis: {} .. {} ({} steps)", axis.first(), axis.last(), axis.len());
    println!("  Fill value: {}", store.fill_value());

    Ok(())
}

/// Implements `hydroalign convert <source_dir> <store_path>`.
fn cmd_convert(
    source_dir: &Path,
    store_path: &Path,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ArrayStore::open(store_path, OpenMode::ReadWrite)?;
    let source = JsonSource::new(source_dir);

    let report = convert(&source, &mut store)?;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        match outcome {
            WriteOutcome::Written {
                variable,
                start_index,
                count,
            } => println!("written  {variable}: {count} values at index {start_index}"),
            WriteOutcome::Skipped {
                variable,
                reason,
                detail,
                source: Some(source),
            } => println!("skipped  {variable} [{}] from {source}: {detail}", reason.code()),
            WriteOutcome::Skipped {
                variable,
                reason,
                detail,
                source: None,
            } => println!("skipped  {variable} [{}]: {detail}", reason.code()),
        }
    }

    println!();
    println!(
        "{} written, {} skipped",
        report.written(),
        report.skipped()
    );
}

/// Implements `hydroalign info <store_path>`.
fn cmd_info(store_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = ArrayStore::open(store_path, OpenMode::ReadOnly)?;
    let axis = store.read_axis()?;

    println!("Store: {}", store_path.display());
    println!();
    println!(
        "Dimension: {} (length {})",
        store.dimension().name,
        store.dimension().length
    );
    println!("Axis: {} .. {}", axis.first(), axis.last());
    println!("Fill value: {}", store.fill_value());
    println!();

    println!("Variables: {}", store.variables().len());
    for variable in store.variables() {
        println!("  - {} (fill={})", variable.name, variable.fill());
        for (key, value) in &variable.attributes {
            println!("      {key} = {value}");
        }
    }

    let total_size = dir_size(store_path)?;
    println!();
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));

    Ok(())
}

/// Implements `hydroalign dump <store_path> <variable>`.
fn cmd_dump(store_path: &Path, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = ArrayStore::open(store_path, OpenMode::ReadOnly)?;
    let variable = store
        .variable(name)
        .ok_or_else(|| format!("Variable '{name}' not found"))?;
    let fill = variable.fill();

    let axis = store.read_axis()?;
    let values = store.read_variable(name)?;

    println!("timestamp,value");
    for (timestamp, value) in axis.as_slice().iter().zip(&values) {
        println!("{timestamp},{}", csv_cell(*value, fill));
    }

    Ok(())
}

/// Renders a value for CSV; fill values are shown as empty cells.
fn csv_cell(value: f64, fill: f64) -> String {
    #[allow(clippy::float_cmp)] // Fill values are stored bit-for-bit
    let is_fill = value.is_nan() || value == fill;
    if is_fill { String::new() } else { value.to_string() }
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Recursively calculates directory size.
fn dir_size(path: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let mut total = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_cell_hides_fill() {
        assert_eq!(csv_cell(-9999.0, -9999.0), "");
        assert_eq!(csv_cell(f64::NAN, f64::NAN), "");
        assert_eq!(csv_cell(1.5, -9999.0), "1.5");
        assert_eq!(csv_cell(0.0, f64::NAN), "0");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "hydroalign",
            "-v",
            "convert",
            "export",
            "store",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Convert {
                format: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_init_refuses_non_store_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = temp_dir.path().join("axis.json");
        std::fs::write(
            &config,
            r#"{"axis": {"start": "2000-01-01 00:00:00 UTC", "step_seconds": 86400, "length": 3}}"#,
        )
        .unwrap();
        let target = temp_dir.path().join("data");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep.txt"), "important").unwrap();

        assert!(cmd_init(&target, &config, true).is_err());
        assert!(target.join("keep.txt").exists());

        let store = temp_dir.path().join("store");
        cmd_init(&store, &config, false).unwrap();
        assert!(cmd_init(&store, &config, false).is_err());
        cmd_init(&store, &config, true).unwrap();
        assert!(store.join("meta.json").exists());
    }

    #[test]
    fn test_forced_init_leaves_locked_store_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = temp_dir.path().join("axis.json");
        std::fs::write(
            &config,
            r#"{"axis": {"start": "2000-01-01 00:00:00 UTC", "step_seconds": 3600, "length": 4}}"#,
        )
        .unwrap();
        let store_path = temp_dir.path().join("store");
        cmd_init(&store_path, &config, false).unwrap();

        let writer = ArrayStore::open(&store_path, OpenMode::ReadWrite).unwrap();
        assert!(cmd_init(&store_path, &config, true).is_err());
        assert!(store_path.join("meta.json").exists());
        assert!(store_path.join("time.slab").exists());
        drop(writer);

        cmd_init(&store_path, &config, true).unwrap();
        let store = ArrayStore::open(&store_path, OpenMode::ReadOnly).unwrap();
        assert_eq!(store.axis_len(), 4);
    }
}
