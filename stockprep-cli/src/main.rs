//! StockPrep CLI: clean a directory of price CSVs and inspect the result.
//!
//! Commands:
//! - `clean`: normalize every CSV in a directory and write one Parquet table
//! - `inspect`: per-symbol summary and top/bottom movers of a cleaned table

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stockprep_core::analytics::{summary_by_symbol, top_bottom_movers, SymbolSummary};
use stockprep_core::data::{read_consolidated, read_meta};
use stockprep_core::{clean_data, CleanConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stockprep",
    version,
    about = "StockPrep CLI: clean and consolidate daily price CSVs"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every CSV in a directory into one Parquet file.
    Clean {
        /// Directory containing SYMBOL.csv files.
        input_dir: PathBuf,

        /// Output Parquet path.
        output: PathBuf,

        /// TOML cleaning config. Defaults apply to anything omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Clean files in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Skip the metadata sidecar.
        #[arg(long, default_value_t = false)]
        no_meta: bool,
    },
    /// Summarize a cleaned Parquet table.
    Inspect {
        /// Parquet file written by `clean`.
        path: PathBuf,

        /// Numeric column to summarize.
        #[arg(long, default_value = "close")]
        column: String,

        /// Number of top and bottom movers to list.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Clean {
            input_dir,
            output,
            config,
            parallel,
            no_meta,
        } => run_clean(&input_dir, &output, config.as_deref(), parallel, no_meta),
        Commands::Inspect { path, column, top } => run_inspect(&path, &column, top),
    }
}

fn run_clean(
    input_dir: &Path,
    output: &Path,
    config_path: Option<&Path>,
    parallel: bool,
    no_meta: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => CleanConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CleanConfig::default(),
    };
    config.parallel |= parallel;
    if no_meta {
        config.write_metadata = false;
    }
    info!(
        config_file = ?config_path,
        date_column = %config.date_column,
        price_columns = ?config.price_columns,
        parallel = config.parallel,
        compression = ?config.compression,
        write_metadata = config.write_metadata,
        "starting clean"
    );

    let table = clean_data(input_dir, output, &config).with_context(|| {
        format!(
            "cleaning {} into {}",
            input_dir.display(),
            output.display()
        )
    })?;

    println!(
        "Wrote {} rows for {} symbol(s) to {}",
        table.height(),
        table.symbols().len(),
        output.display()
    );
    Ok(())
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

fn print_summary(rows: &[SymbolSummary]) {
    println!(
        "{:<10} {:>6} {:>10} {:>10} {:>10} {:>10} {:>9}",
        "Symbol", "Rows", "Mean", "Std", "Min", "Max", "Change"
    );
    println!("{}", "-".repeat(71));
    for s in rows {
        println!(
            "{:<10} {:>6} {:>10} {:>10} {:>10} {:>10} {:>8}%",
            s.symbol,
            s.count,
            fmt_opt(s.mean, 2),
            fmt_opt(s.std, 2),
            fmt_opt(s.min, 2),
            fmt_opt(s.max, 2),
            fmt_opt(s.change_pct, 1),
        );
    }
}

fn run_inspect(path: &Path, column: &str, top: usize) -> Result<()> {
    let table =
        read_consolidated(path).with_context(|| format!("reading {}", path.display()))?;

    println!("Table: {}", path.display());
    println!("Rows: {}", table.height());
    match read_meta(path) {
        Ok(meta) => {
            let range = match (meta.start, meta.end) {
                (Some(start), Some(end)) => format!("{} to {}", start.date(), end.date()),
                _ => "(no dates)".to_string(),
            };
            println!("Dates: {range}");
            println!("Written: {} by v{}", meta.written_at, meta.tool_version);
        }
        Err(e) => debug!(error = %e, "no readable metadata sidecar"),
    }
    println!();

    let summary = summary_by_symbol(&table, column)
        .with_context(|| format!("summarizing column '{column}'"))?;
    print_summary(&summary);

    let movers = top_bottom_movers(&table, column, top)?;
    println!();
    println!("--- Top {top} ---");
    for (symbol, change) in &movers.top {
        println!("  {symbol:<10} {change:>8.1}%");
    }
    println!("--- Bottom {top} ---");
    for (symbol, change) in &movers.bottom {
        println!("  {symbol:<10} {change:>8.1}%");
    }
    Ok(())
}
