use clap::{Parser, Subcommand};
use royalbit_xl2py::cli;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "xl2py")]
#[command(about = "Compile spreadsheet formulas into a vectorised Python program")]
#[command(long_about = "xl2py - Excel workbook to Python compiler

Copied-down and copied-across formulas are detected and emitted as one loop
per run; everything else becomes a single statement, in dependency order.

COMMANDS:
  convert   - Write calculate.py, the external-file manifest and the report
  analyze   - Show what a conversion would find, without writing anything

EXAMPLES:
  xl2py convert model.xlsx -o build/          # Compile
  xl2py convert model.xlsx -c xl2py.yaml      # With a config file
  xl2py analyze model.xlsx --json             # Machine-readable report

Set RUST_LOG=debug for grouping and scheduling detail.")]
#[command(version)]
struct Cli {
    /// Show verbose progress and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Compile a workbook into a Python program.

OUTPUTS (in the output directory):
  calculate.py              - seed(), compute() and a command-line entry point
  input_files_config.json   - external workbook paths (only if referenced)
  analysis_report.json      - groups, schedule, references, problems
  analysis_report.xlsx      - the same report as a workbook

CONFIG FILE (YAML, every key optional):
  delete_unreferenced_hardcoded_values: false
  script_name: calculate.py
  manifest_name: input_files_config.json
  report_name: analysis_report
  write_report_xlsx: true

Fails without writing a program if any formula cannot be parsed, calls an
unsupported function, or takes part in a circular dependency.")]
    /// Compile a workbook into a Python program
    Convert {
        /// Path to Excel file (.xlsx)
        input: PathBuf,

        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory (default: the workbook's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the Excel rendering of the analysis report
        #[arg(long)]
        no_report_xlsx: bool,
    },

    /// Analyse a workbook without writing anything
    Analyze {
        /// Path to Excel file (.xlsx)
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("royalbit_xl2py={}", default).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            input,
            config,
            output,
            no_report_xlsx,
        } => cli::convert(cli::ConvertOptions {
            input,
            config,
            out_dir: output,
            no_report_xlsx,
            verbose: cli.verbose,
        })?,

        Commands::Analyze { input, json } => cli::analyze(input, json)?,
    }
    Ok(())
}
