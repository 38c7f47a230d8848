mod factory;

use clap::Parser;
use colored::Colorize;
use factory::PluginProviderFactory;
use std::path::PathBuf;
use std::process::ExitCode;
use terradozer_core::Destroyer;
use terradozer_state::StateSnapshot;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "terradozer", version)]
#[command(about = "Destroy every resource recorded in a Terraform state file", long_about = None)]
struct Cli {
    /// Don't delete anything, only show what would be deleted
    #[arg(long)]
    dry: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to the Terraform state file
    #[arg(long, default_value = "terraform.tfstate")]
    state: PathBuf,

    /// Path to a terradozer config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},h2=warn,hyper_util=warn,tower=warn,rustls=warn", level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // read the state before anything gets installed
    let state = StateSnapshot::load(&cli.state).await?;
    let config = terradozer_config::load_config(cli.config.as_deref())?;

    if cli.dry {
        tracing::info!("dry run: nothing will be deleted");
    }

    let factory = PluginProviderFactory::new(config);
    let mut destroyer = Destroyer::new(factory).with_dry_run(cli.dry);

    let result = destroyer.run(&state).await;
    destroyer.shutdown().await;
    let report = result?;

    tracing::info!("total number of resources deleted: {}", report.deleted);
    tracing::info!("total number of resources attempted: {}", report.attempted);
    tracing::info!("summary: {}", report);
    Ok(())
}
