//! Life Graph build - turns upstream life records into a privacy-safe graph
//!
//! Usage:
//!   lifegraph build [--config lifegraph.toml] [--records DIR] [--allowlist FILE]
//!                   [--curation FILE] [--output DIR] [--media-root DIR] [--seed N]
//!
//! Exit codes:
//!   0 published, 2 no input records, 3 schema violation, 4 privacy violation, 1 anything else

use clap::{Args, Parser, Subcommand};
use lifegraph_composer::{BuildConfig, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lifegraph")]
#[command(about = "Build the privacy-safe life graph and its helix layout", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one build and publish graph.json and layout.json
    Build(BuildArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Path to lifegraph.toml (defaults to ./lifegraph.toml when present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Directory of *.json record files
    #[arg(long)]
    records: Option<PathBuf>,

    /// Allowlist JSON document
    #[arg(long)]
    allowlist: Option<PathBuf>,

    /// Curation JSON document
    #[arg(long)]
    curation: Option<PathBuf>,

    /// Output directory for the published documents
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Directory that local media paths resolve against
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Layout seed
    #[arg(long)]
    seed: Option<u32>,
}

impl BuildArgs {
    fn apply(self, config: &mut BuildConfig) {
        let paths = &mut config.paths;
        if let Some(records) = self.records {
            paths.records_dir = records;
        }
        if let Some(allowlist) = self.allowlist {
            paths.allowlist = allowlist;
        }
        if let Some(curation) = self.curation {
            paths.curation = curation;
        }
        if let Some(output) = self.output {
            paths.output_dir = output;
        }
        if let Some(media_root) = self.media_root {
            paths.media_root = Some(media_root);
        }
        if let Some(seed) = self.seed {
            config.layout.seed = seed;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Life Graph build v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => build(args).await,
    }
}

async fn build(args: BuildArgs) -> ExitCode {
    let mut config = match BuildConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    args.apply(&mut config);

    match Pipeline::new(config).run().await {
        Ok(stats) => {
            info!(
                "Build succeeded: {} nodes, {} edges",
                stats.nodes_published, stats.edges
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Build blocked: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
