//! Command-line surface: `clap` derive, three subcommands mirroring the
//! three document shapes this engine runs — `run` (a Test), `suite` (a
//! Suite), `load` (a Load). Mirrors the shape of the original `Commands::Execute`
//! variant, split one-subcommand-per-document-kind instead of one flag-heavy
//! command.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(name = "httpbench")]
#[command(about = "HTTP integration and load testing engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Runs a single Test document.
    Run {
        /// Path to the Test document (permissive-JSON).
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Runs a Suite document (Setup/Main/Teardown).
    Suite {
        /// Path to the Suite document.
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Runs a Load document (weighted scenario dispatch).
    Load {
        /// Path to the Load document.
        #[arg(short, long)]
        file: PathBuf,

        /// Number of weighted scenario picks to run.
        #[arg(short, long, default_value = "100")]
        iterations: u64,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args)]
pub struct CommonArgs {
    /// Path to save the report to (stdout if omitted).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit a plain-text report instead of JSON.
    #[arg(long, default_value = "false")]
    pub text: bool,

    /// Enable OpenTelemetry OTLP trace export.
    #[arg(long, default_value = "false")]
    pub otel: bool,

    /// OTLP collector endpoint (falls back to env var / localhost default).
    #[arg(long)]
    pub otel_endpoint: Option<String>,

    /// Suppress informational logs; only errors reach stderr.
    #[arg(long, short = 's', default_value = "false")]
    pub silent: bool,

    /// Verbose debug-level logs.
    #[arg(long, short = 'v', default_value = "false")]
    pub verbose: bool,
}
