use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Duration};

use super::{
    orchestrator::{StepOutcome, StepTransition, TransactionOrchestrator},
    preparation::PreparationService,
    reconciler::ResultReconciler,
};
use crate::{
    chain::ChainGateway,
    combat::{run_battle, CombatEngine, CombatEvent},
    config::{CombatTiming, OrchestratorSettings},
    constants::SESSION_EVENT_CAPACITY,
    error::{AppError, ErrorDetail, Result},
    models::{AbandonedTransaction, BattleResult, BattleSetup, BattleStatus, CombatState},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Combat(CombatEvent),
    Prepared {
        stake_id: u64,
        has_enough_fee: bool,
        needs_approval: bool,
        consumed_on_chain: bool,
    },
    Step(StepTransition),
    RedirectCountdown {
        remaining: u32,
    },
    Result(BattleResult),
    Error(ErrorDetail),
}

/// One player's battle context: the animated combat plus the settlement
/// pipeline behind it. Sessions share nothing, so several can run side by side.
pub struct BattleSession {
    engine: Mutex<CombatEngine>,
    preparation: PreparationService,
    orchestrator: TransactionOrchestrator,
    timing: CombatTiming,
    events: broadcast::Sender<SessionEvent>,
}

impl BattleSession {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        preparation: PreparationService,
        reconciler: ResultReconciler,
        settings: OrchestratorSettings,
        timing: CombatTiming,
    ) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let step_events = events.clone();
        let orchestrator = TransactionOrchestrator::new(gateway, reconciler, settings)
            .with_observer(Arc::new(move |transition: StepTransition| {
                let _ = step_events.send(SessionEvent::Step(transition));
            }));

        Self {
            engine: Mutex::new(CombatEngine::new()),
            preparation,
            orchestrator,
            timing,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn orchestrator(&self) -> &TransactionOrchestrator {
        &self.orchestrator
    }

    pub async fn combat_state(&self) -> CombatState {
        self.engine.lock().await.state().clone()
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn fail(&self, err: AppError) -> AppError {
        tracing::warn!("Session error [{}]: {}", err.code(), err);
        self.publish(SessionEvent::Error(ErrorDetail::from(&err)));
        err
    }

    /// Plays the cosmetic battle to its end.
    pub async fn run_combat(&self, setup: BattleSetup) -> Result<BattleStatus> {
        let mut engine = self.engine.lock().await;
        run_battle(&mut engine, setup, &self.timing, |event| {
            self.publish(SessionEvent::Combat(event))
        })
        .await
        .map_err(|e| self.fail(e))
    }

    /// Runs preparation, approval, optional mint and settlement for `stake_id`.
    pub async fn settle_stake(&self, stake_id: u64) -> Result<StepOutcome<BattleResult>> {
        let record = self
            .preparation
            .prepare(stake_id)
            .await
            .map_err(|e| self.fail(e))?;
        self.publish(SessionEvent::Prepared {
            stake_id,
            has_enough_fee: record.has_enough_fee,
            needs_approval: record.needs_approval,
            consumed_on_chain: record.consumed_on_chain,
        });

        // our own unverified settlement may be what consumed the stake
        let resuming = self.orchestrator.has_unverified_settlement(stake_id).await;
        if record.consumed_on_chain && !resuming {
            return Err(self.fail(AppError::StakeConsumed(stake_id)));
        }
        if !record.has_enough_fee && !resuming {
            self.redirect_countdown().await;
            return Err(self.fail(AppError::InsufficientBalance(format!(
                "fee token balance {} is below the battle fee {}",
                record.fee_token_balance,
                self.preparation.battle_fee()
            ))));
        }

        let needs_approval = record.needs_approval;
        let needs_mint =
            self.orchestrator.settings().require_auxiliary_mint && !record.auxiliary_minted;
        self.orchestrator
            .load(record)
            .await
            .map_err(|e| self.fail(e))?;

        if needs_approval {
            let outcome = self.orchestrator.approve().await.map_err(|e| self.fail(e))?;
            if outcome == StepOutcome::InFlight {
                return Ok(StepOutcome::InFlight);
            }
        }
        if needs_mint {
            let outcome = self
                .orchestrator
                .mint_auxiliary()
                .await
                .map_err(|e| self.fail(e))?;
            if outcome == StepOutcome::InFlight {
                return Ok(StepOutcome::InFlight);
            }
        }

        let outcome = self.orchestrator.settle().await.map_err(|e| self.fail(e))?;
        if let StepOutcome::Completed(result) = &outcome {
            self.publish(SessionEvent::Result(result.clone()));
        }
        Ok(outcome)
    }

    /// Ticks `n, n-1, .., 0` one second apart before the caller redirects.
    async fn redirect_countdown(&self) {
        let total = self.timing.redirect_countdown_secs;
        for remaining in (0..=total).rev() {
            self.publish(SessionEvent::RedirectCountdown { remaining });
            if remaining > 0 {
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Waits up to `limit` for the collaborator calls queued by settlement.
    pub async fn flush_notifications(&self, limit: Duration) -> bool {
        self.orchestrator.reconciler().flush(limit).await
    }

    /// Returns the combat to loading and abandons local step tracking.
    pub async fn reset(&self) -> Vec<AbandonedTransaction> {
        self.engine.lock().await.reset_battle();
        self.orchestrator.reset().await
    }
}
