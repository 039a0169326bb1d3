use parlaydesk::allowance::AllowanceManager;
use parlaydesk::auth::{ClobApiClient, L2Credentials};
use parlaydesk::collateral::CollateralReader;
use parlaydesk::config::Config;
use parlaydesk::history::ParlayHistory;
use parlaydesk::markets::ClobCatalog;
use parlaydesk::parlay::Parlay;
use parlaydesk::pipeline::{PipelineSettings, SubmissionPipeline};
use parlaydesk::wallet::LocalSigner;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = if Path::new("parlaydesk.toml").exists() {
        Config::load(Path::new("parlaydesk.toml"))?
    } else {
        info!("no parlaydesk.toml found, using env-only config");
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let parlay_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: parlaydesk <parlay.toml>"))?;
    let parlay: Parlay = toml::from_str(&std::fs::read_to_string(&parlay_path)?)?;

    if config.clob.private_key.is_empty() {
        anyhow::bail!("POLY_PRIVATE_KEY is not set");
    }
    if !config.has_credentials() {
        anyhow::bail!("POLY_API_KEY / POLY_API_SECRET / POLY_API_PASSPHRASE are not set");
    }

    let signer = Arc::new(LocalSigner::new(
        &config.clob.private_key,
        config.chain.rpc_url.clone(),
        config.chain.chain_id,
    )?);
    let creds = L2Credentials::from_config(
        &config.clob.api_key,
        &config.clob.api_secret,
        &config.clob.api_passphrase,
    );
    let api = Arc::new(ClobApiClient::new(config.clob.clob_url.clone(), creds));
    let catalog = Arc::new(ClobCatalog::new(config.clob.clob_url.clone()));
    let allowances = Arc::new(AllowanceManager::from_config(
        &config.chain,
        config.trading.allowance_buffer,
        signer.clone(),
    )?);
    let balances = Arc::new(CollateralReader::from_config(&config.chain)?);
    let history = ParlayHistory::new(&config.trading.history_path);

    let pipeline = SubmissionPipeline::new(
        api,
        signer,
        catalog,
        allowances,
        balances,
        Some(history),
        PipelineSettings::from(&config.trading),
    );
    let board = pipeline.board();

    info!(
        legs = parlay.legs.len(),
        stake = %parlay.total_stake,
        odds = %parlay.combined_odds(),
        payout = %parlay.potential_payout(),
        "submitting parlay"
    );

    let outcome = match pipeline.submit(&parlay).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(info) = pipeline.balance_info().await {
                if info.is_unknown() {
                    warn!("wallet balances could not be read");
                } else {
                    info!(
                        bridged = %info.bridged,
                        native = %info.native,
                        required = %info.required,
                        "wallet collateral"
                    );
                }
            }
            for status in board.snapshot().await {
                error!(leg = %status.leg_id, state = %status.state, error = ?status.error, "leg status");
            }
            return Err(e.into());
        }
    };

    info!(
        accepted = outcome.accepted,
        rejected = outcome.rejected,
        "batch accepted, tracking fills"
    );

    // Track fills until every poller reaches a terminal state, or the
    // user interrupts; ctrl-c stops the loops cleanly.
    let pollers = outcome.pollers;
    if !pollers.is_empty() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping fill pollers");
                pollers.shutdown();
            }
            _ = async {
                // join_all consumes the set, so wait on a snapshot loop instead.
                loop {
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    let snapshot = board.snapshot().await;
                    // Only tracked legs (those with an order id) ever
                    // move again; untracked ones stay `signed`.
                    if snapshot
                        .iter()
                        .all(|s| s.order_id.is_none() || s.state.is_terminal())
                    {
                        break;
                    }
                }
            } => {}
        }
    }

    for status in board.snapshot().await {
        info!(
            leg = %status.leg_id,
            state = %status.state,
            order_id = ?status.order_id,
            error = ?status.error,
            "final leg status"
        );
    }

    Ok(())
}
