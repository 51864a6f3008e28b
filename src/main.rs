use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_settlement::{
    chain::{ChainGateway, EvmGateway},
    config::Config,
    constants::COLLABORATOR_TIMEOUT_SECS,
    models::BattleSetup,
    services::{
        BattleSession, ConsumedLedger, HttpInventoryClient, HttpRefreshHook, HttpStakeIndex,
        PreparationService, ResultReconciler, SessionEvent, StepOutcome,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_settlement=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let stake_id: u64 = match std::env::args().nth(1) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("stake id must be a non-negative integer: {}", e))?,
        None => anyhow::bail!("usage: arena-settlement <stake-id>"),
    };

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting arena settlement v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("Chain id: {} via {}", config.chain_id, config.rpc_url);

    let gateway: Arc<dyn ChainGateway> = Arc::new(EvmGateway::from_config(&config)?);
    if gateway.account().is_none() {
        tracing::warn!("ARENA_WALLET_PRIVATE_KEY not set; settlement will fail at preparation");
    }

    let ledger = ConsumedLedger::new();
    let index = Arc::new(HttpStakeIndex::new(config.stake_index_url.clone())?);
    let preparation =
        PreparationService::from_config(&config, gateway.clone(), index, ledger.clone());

    let mut reconciler = ResultReconciler::new(config.settlement_contract_address, ledger);
    if let Some(url) = &config.inventory_api_url {
        reconciler = reconciler.with_inventory(Arc::new(HttpInventoryClient::new(url.clone())?));
    }
    if let Some(url) = &config.profile_refresh_url {
        let hook = HttpRefreshHook::new("profile", url.clone())?;
        reconciler = reconciler.with_refresh_hook(Arc::new(hook));
    }
    if let Some(url) = &config.quest_refresh_url {
        let hook = HttpRefreshHook::new("quest", url.clone())?;
        reconciler = reconciler.with_refresh_hook(Arc::new(hook));
    }

    let session = BattleSession::new(
        gateway,
        preparation,
        reconciler,
        config.orchestrator_settings(),
        config.combat_timing(),
    );

    // Session events are the only presentation surface of the binary
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Error(detail)) => tracing::warn!(
                    "[{}] {} (recovery: {:?})",
                    detail.code,
                    detail.message,
                    detail.recovery
                ),
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!("event {}", json),
                    Err(e) => tracing::debug!("Unserializable session event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event printer lagged by {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let status = session.run_combat(BattleSetup::default()).await?;
    tracing::info!("Battle animation finished: {}", status);

    let outcome = session.settle_stake(stake_id).await;
    // the runtime cancels unfinished collaborator calls on exit
    if !session
        .flush_notifications(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
        .await
    {
        tracing::warn!("Some collaborator notifications for stake {} were not delivered", stake_id);
    }
    drop(session);
    let _ = printer.await;

    match outcome? {
        StepOutcome::Completed(result) => match result.require_verified() {
            Ok(result) => tracing::info!(
                "Stake {} settled: {} (tx {})",
                stake_id,
                if result.won { "victory" } else { "defeat" },
                result.settlement_tx_hash
            ),
            Err(e) => tracing::warn!("Stake {}: {}; recorded as defeat", stake_id, e),
        },
        StepOutcome::InFlight | StepOutcome::AlreadyDone => {
            tracing::info!("Stake {} settlement already handled", stake_id);
        }
    }

    Ok(())
}
