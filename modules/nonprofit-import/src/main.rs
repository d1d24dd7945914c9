use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nonprofit_import::traits::PersistenceGateway;
use nonprofit_import::{
    Checkpoint, Config, ImportOrchestrator, MemoryOrgStore, NoopObserver, PgOrgStore, RunRequest,
    RunState, SearchCriteria,
};
use propublica_client::{format_ein, ProPublicaClient};

#[derive(Parser)]
#[command(
    name = "nonprofit-import",
    about = "Bulk import of nonprofit organizations from the ProPublica directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Page through search results and import every organization not yet stored
    Run(RunArgs),
    /// Import a single organization by EIN
    Claim { ein: String },
}

#[derive(Args)]
struct RunArgs {
    /// Free-text search term
    #[arg(long)]
    query: Option<String>,
    /// Two-letter state code
    #[arg(long)]
    state: Option<String>,
    /// City name, matched case-insensitively against each result
    #[arg(long)]
    city: Option<String>,
    /// NTEE major group id
    #[arg(long)]
    ntee: Option<String>,
    /// Zero-based page to start at (overrides the checkpoint)
    #[arg(long)]
    start_page: Option<u32>,
    /// Continue from the saved checkpoint; after a completed run this rescans from page 0
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("nonprofit_import=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    let client = Arc::new(ProPublicaClient::with_options(
        &config.propublica_base_url,
        &config.user_agent,
        config.http_timeout,
    )?);
    let store = connect_store(&config).await?;
    let orchestrator =
        ImportOrchestrator::new(client.clone(), client, store.clone(), config.run.clone());

    match cli.command {
        Command::Run(args) => run(&config, &orchestrator, store.as_ref(), args).await,
        Command::Claim { ein } => {
            let ein = format_ein(&ein);
            let id = orchestrator.import_single(&ein).await?;
            info!(%ein, %id, "Claimed organization");
            Ok(())
        }
    }
}

async fn connect_store(config: &Config) -> Result<Arc<dyn PersistenceGateway>> {
    match &config.database_url {
        Some(url) => {
            let store = PgOrgStore::connect(url).await?;
            store.migrate().await?;
            info!("Connected to database, migrations complete");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; imported records live in memory only");
            Ok(Arc::new(MemoryOrgStore::new()))
        }
    }
}

async fn run(
    config: &Config,
    orchestrator: &ImportOrchestrator,
    store: &dyn PersistenceGateway,
    args: RunArgs,
) -> Result<()> {
    let checkpoint = if args.resume {
        Checkpoint::load(&config.checkpoint_path)?
    } else {
        None
    };

    let mut seed = store.known_ids().await?;
    if let Some(cp) = &checkpoint {
        seed.extend(cp.seed());
    }
    let start_page = args
        .start_page
        .or(checkpoint.as_ref().map(|cp| cp.next_page))
        .unwrap_or(0);

    let criteria = SearchCriteria {
        term: args.query,
        region: args.state,
        locality: args.city,
        category: args.ntee,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current item");
            ctrl_c.cancel();
        }
    });

    let request = RunRequest::new(criteria)
        .start_page(start_page)
        .dedup_seed(seed)
        .cancel_token(cancel);
    let handle = orchestrator.start_run(request, NoopObserver)?;
    info!(run_id = %handle.run_id(), start_page, "Import run started");

    let outcome = handle.wait().await?;
    Checkpoint::from_outcome(&outcome).save(&config.checkpoint_path)?;

    info!(state = ?outcome.state, next_page = outcome.next_page, "Import run finished");
    println!("{}", outcome.stats);
    if outcome.state == RunState::Failed {
        bail!("import run failed; resume with --resume to retry from page {}", outcome.next_page);
    }
    Ok(())
}
