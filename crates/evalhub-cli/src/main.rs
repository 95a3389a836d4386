//! evalhub: run evaluation jobs on Kubernetes from the command line.
//!
//! # Usage
//!
//! ```text
//! evalhub --config evalhub.toml dispatch --evaluation eval.json
//! evalhub teardown --evaluation eval.json
//! evalhub render --evaluation eval.json --benchmark arc_easy
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "evalhub",
    about = "EvalHub: evaluation jobs on Kubernetes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Service configuration file. Defaults to ./evalhub.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create a Job per benchmark and wait until every one is submitted.
    ///
    /// Per-benchmark failures are logged; Ctrl-C stops new submissions.
    Dispatch {
        /// Evaluation request (JSON).
        #[arg(short, long)]
        evaluation: PathBuf,
    },
    /// Delete every Job and ConfigMap belonging to an evaluation.
    Teardown {
        #[arg(short, long)]
        evaluation: PathBuf,
    },
    /// Print the ConfigMap and Job for one benchmark without touching a cluster.
    Render {
        #[arg(short, long)]
        evaluation: PathBuf,
        /// Benchmark id to render.
        #[arg(short, long)]
        benchmark: String,
        /// Provider of the benchmark, when the id alone is ambiguous.
        #[arg(short, long)]
        provider: Option<String>,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,evalhub=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Dispatch { evaluation } => commands::dispatch::dispatch(&config, &evaluation).await,
        Command::Teardown { evaluation } => commands::teardown::teardown(&config, &evaluation).await,
        Command::Render {
            evaluation,
            benchmark,
            provider,
        } => commands::render::render(&config, &evaluation, &benchmark, provider.as_deref()),
    }
}
