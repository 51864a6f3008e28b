//! Sequencing of the wallet-signed steps: approval, optional auxiliary mint,
//! and settlement.
//!
//! Every step owns a [`StepState`] that only changes through
//! [`StepState::apply`], under the orchestrator's write lock. Admission
//! (`Begin`) and the precondition checks happen in the same critical
//! section, so concurrent callers collapse into one submission.
//!
//! A step that failed after broadcast keeps its hash; calling it again
//! resumes confirmation of that hash rather than signing a new transaction.

use ethers::types::{TransactionReceipt, TxHash, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};

use super::reconciler::ResultReconciler;
use crate::{
    chain::{tx_hash_hex, ChainError, ChainGateway},
    config::OrchestratorSettings,
    error::{AppError, Result},
    models::{
        AbandonedTransaction, BattleResult, PreparationRecord, StepEvent, StepState, TxStep,
    },
};

/// What a guarded step call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Completed(T),
    /// Another call already has this step submitting or pending.
    InFlight,
    /// Nothing to submit: the step is confirmed or the record says it is not needed.
    AlreadyDone,
}

impl<T> StepOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            StepOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Published after every applied step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTransition {
    pub step: TxStep,
    pub state: &'static str,
    pub tx_hash: Option<String>,
}

pub type TransitionObserver = Arc<dyn Fn(StepTransition) + Send + Sync>;

struct OrchestratorState {
    steps: HashMap<TxStep, StepState>,
    record: Option<PreparationRecord>,
    last_error: Option<AppError>,
    /// Bumped by `reset`; work admitted under an older epoch is abandoned.
    epoch: u64,
}

impl OrchestratorState {
    fn new() -> Self {
        Self {
            steps: TxStep::ALL.iter().map(|s| (*s, StepState::Idle)).collect(),
            record: None,
            last_error: None,
            epoch: 0,
        }
    }

    fn step(&self, step: TxStep) -> StepState {
        self.steps.get(&step).cloned().unwrap_or(StepState::Idle)
    }
}

#[derive(Debug, Clone)]
struct Ticket {
    epoch: u64,
    record: Option<PreparationRecord>,
    /// Already broadcast; confirm this hash instead of submitting.
    recheck: Option<TxHash>,
}

enum Admission {
    Proceed(Ticket),
    InFlight,
    AlreadyDone,
}

pub struct TransactionOrchestrator {
    gateway: Arc<dyn ChainGateway>,
    reconciler: ResultReconciler,
    settings: OrchestratorSettings,
    state: RwLock<OrchestratorState>,
    observer: Option<TransitionObserver>,
}

impl TransactionOrchestrator {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        reconciler: ResultReconciler,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            settings,
            state: RwLock::new(OrchestratorState::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: TransitionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn reconciler(&self) -> &ResultReconciler {
        &self.reconciler
    }

    /// Makes `record` the active preparation for the next steps.
    ///
    /// Reloading the same stake keeps step progress. A different stake starts
    /// a fresh epoch with every step idle, and is refused while any step
    /// still waits on an unresolved transaction.
    pub async fn load(&self, record: PreparationRecord) -> Result<()> {
        let mut state = self.state.write().await;
        let same_stake = state.record.as_ref().map(|r| r.stake_id) == Some(record.stake_id);
        if same_stake {
            state.record = Some(record);
            return Ok(());
        }

        if let Some(step) = TxStep::ALL
            .iter()
            .copied()
            .find(|step| state.step(*step).is_unresolved())
        {
            tracing::warn!(
                "Refusing to load stake {} while {} is unresolved",
                record.stake_id,
                step
            );
            return Err(AppError::StepInFlight(step));
        }

        tracing::info!("Loaded stake {}; steps start idle", record.stake_id);
        state.epoch += 1;
        state.record = Some(record);
        state.last_error = None;
        for step in TxStep::ALL {
            state.steps.insert(step, StepState::Idle);
        }
        drop(state);

        for step in TxStep::ALL {
            self.notify(step, &StepState::Idle);
        }
        Ok(())
    }

    /// Whether `stake_id`'s settlement was broadcast but never confirmed, so
    /// the next `settle` re-checks it.
    pub async fn has_unverified_settlement(&self, stake_id: u64) -> bool {
        let state = self.state.read().await;
        state.record.as_ref().map(|r| r.stake_id) == Some(stake_id)
            && matches!(
                state.step(TxStep::Settlement),
                StepState::Failed {
                    tx_hash: Some(_),
                    ..
                }
            )
    }

    pub async fn record(&self) -> Option<PreparationRecord> {
        self.state.read().await.record.clone()
    }

    pub async fn last_error(&self) -> Option<AppError> {
        self.state.read().await.last_error.clone()
    }

    pub async fn step_state(&self, step: TxStep) -> StepState {
        self.state.read().await.step(step)
    }

    pub async fn snapshot(&self) -> Vec<(TxStep, StepState)> {
        let state = self.state.read().await;
        TxStep::ALL.iter().map(|s| (*s, state.step(*s))).collect()
    }

    /// Grants the settlement contract an unlimited fee-token allowance.
    pub async fn approve(&self) -> Result<StepOutcome<TxHash>> {
        let ticket = match self
            .admit(TxStep::Approval, |record| {
                Ok(record.map(|r| r.needs_approval).unwrap_or(true))
            })
            .await?
        {
            Admission::Proceed(ticket) => ticket,
            Admission::InFlight => return Ok(StepOutcome::InFlight),
            Admission::AlreadyDone => return Ok(StepOutcome::AlreadyDone),
        };

        let gateway = self.gateway.clone();
        let receipt = self
            .run_step(TxStep::Approval, &ticket, async move {
                gateway.send_approval(U256::MAX).await
            })
            .await?;

        let mut state = self.state.write().await;
        if state.epoch == ticket.epoch {
            if let Some(record) = state.record.take() {
                state.record = Some(record.with_approval_granted(U256::MAX));
            }
        }
        Ok(StepOutcome::Completed(receipt.transaction_hash))
    }

    /// Mints the auxiliary token. Only needed when the deployment requires it.
    pub async fn mint_auxiliary(&self) -> Result<StepOutcome<TxHash>> {
        let ticket = match self
            .admit(TxStep::AuxiliaryMint, |record| {
                Ok(!record.map(|r| r.auxiliary_minted).unwrap_or(false))
            })
            .await?
        {
            Admission::Proceed(ticket) => ticket,
            Admission::InFlight => return Ok(StepOutcome::InFlight),
            Admission::AlreadyDone => return Ok(StepOutcome::AlreadyDone),
        };

        let gateway = self.gateway.clone();
        let receipt = self
            .run_step(TxStep::AuxiliaryMint, &ticket, async move {
                gateway.send_auxiliary_mint().await
            })
            .await?;

        let mut state = self.state.write().await;
        if state.epoch == ticket.epoch {
            if let Some(record) = state.record.take() {
                state.record = Some(record.with_auxiliary_minted());
            }
        }
        Ok(StepOutcome::Completed(receipt.transaction_hash))
    }

    /// Submits the settlement for the active record and decodes its outcome.
    pub async fn settle(&self) -> Result<StepOutcome<BattleResult>> {
        let require_mint = self.settings.require_auxiliary_mint;
        let ticket = match self
            .admit(TxStep::Settlement, |record| {
                let record = record.ok_or(AppError::NotPrepared)?;
                if record.consumed_on_chain {
                    return Err(AppError::StakeConsumed(record.stake_id));
                }
                if !record.has_enough_fee {
                    return Err(AppError::InsufficientBalance(format!(
                        "fee token balance {} is below the battle fee",
                        record.fee_token_balance
                    )));
                }
                if record.needs_approval {
                    return Err(AppError::AllowanceInsufficient);
                }
                if require_mint && !record.auxiliary_minted {
                    return Err(AppError::PreparationFailed(
                        "auxiliary token must be minted before settlement".to_string(),
                    ));
                }
                Ok(true)
            })
            .await?
        {
            Admission::Proceed(ticket) => ticket,
            Admission::InFlight => return Ok(StepOutcome::InFlight),
            Admission::AlreadyDone => return Ok(StepOutcome::AlreadyDone),
        };

        let record = ticket.record.clone().ok_or(AppError::NotPrepared)?;
        let gateway = self.gateway.clone();
        let args = record.clone();
        let receipt = self
            .run_step(TxStep::Settlement, &ticket, async move {
                gateway
                    .send_settlement(args.stake_id, args.stats, &args.eligibility_proof)
                    .await
            })
            .await?;

        let result = self.reconciler.reconcile(&receipt, record.stake_id).await;
        Ok(StepOutcome::Completed(result))
    }

    /// Returns every step to idle and drops the active record.
    ///
    /// Transactions already handed to the wallet cannot be recalled; they are
    /// returned so the caller can surface them.
    pub async fn reset(&self) -> Vec<AbandonedTransaction> {
        let mut state = self.state.write().await;
        let abandoned: Vec<AbandonedTransaction> = TxStep::ALL
            .iter()
            .filter_map(|step| {
                let current = state.step(*step);
                current.is_unresolved().then(|| AbandonedTransaction {
                    step: *step,
                    tx_hash: current.tx_hash(),
                })
            })
            .collect();

        for tx in &abandoned {
            tracing::warn!(
                "Reset abandons in-flight {} transaction {}; it may still land on-chain",
                tx.step,
                tx.tx_hash
                    .map(tx_hash_hex)
                    .unwrap_or_else(|| "<awaiting wallet>".to_string())
            );
        }

        state.epoch += 1;
        state.record = None;
        state.last_error = None;
        for step in TxStep::ALL {
            if let Some(next) = state.step(step).apply(StepEvent::Reset) {
                state.steps.insert(step, next);
            }
        }
        drop(state);

        for step in TxStep::ALL {
            self.notify(step, &StepState::Idle);
        }
        abandoned
    }

    // Internal helper that supports `admit` operations.
    async fn admit<F>(&self, step: TxStep, precondition: F) -> Result<Admission>
    where
        F: FnOnce(Option<&PreparationRecord>) -> Result<bool>,
    {
        let mut state = self.state.write().await;
        let current = state.step(step);
        match &current {
            StepState::Submitting | StepState::Pending { .. } => {
                tracing::debug!("{} already in flight; ignoring duplicate call", step);
                return Ok(Admission::InFlight);
            }
            StepState::Confirmed { .. } => return Ok(Admission::AlreadyDone),
            StepState::Reverted { reason, .. } => {
                return Err(AppError::ContractReverted(reason.clone()))
            }
            StepState::Failed {
                tx_hash: Some(tx_hash),
                ..
            } => {
                let tx_hash = *tx_hash;
                let next = current
                    .apply(StepEvent::Recheck)
                    .ok_or_else(|| AppError::InvalidTransition {
                        from: current.label().to_string(),
                        to: "pending".to_string(),
                    })?;
                state.steps.insert(step, next.clone());
                let ticket = Ticket {
                    epoch: state.epoch,
                    record: state.record.clone(),
                    recheck: Some(tx_hash),
                };
                drop(state);

                tracing::info!("{} -> pending; re-checking {}", step, tx_hash_hex(tx_hash));
                self.notify(step, &next);
                return Ok(Admission::Proceed(ticket));
            }
            StepState::Failed { error, .. } if !error.is_retryable() => return Err(error.clone()),
            StepState::Idle | StepState::Failed { .. } => {}
        }

        let needed = match precondition(state.record.as_ref()) {
            Ok(needed) => needed,
            Err(err) => {
                tracing::warn!("{} blocked: {}", step, err);
                state.last_error = Some(err.clone());
                return Err(err);
            }
        };
        if !needed {
            return Ok(Admission::AlreadyDone);
        }

        let next = current
            .apply(StepEvent::Begin)
            .ok_or_else(|| AppError::InvalidTransition {
                from: current.label().to_string(),
                to: StepState::Submitting.label().to_string(),
            })?;
        state.steps.insert(step, next.clone());
        let ticket = Ticket {
            epoch: state.epoch,
            record: state.record.clone(),
            recheck: None,
        };
        drop(state);

        tracing::info!("{} -> submitting", step);
        self.notify(step, &next);
        Ok(Admission::Proceed(ticket))
    }

    /// Applies `event` if the step still belongs to `epoch`. Returns whether it
    /// was applied.
    async fn transition(&self, step: TxStep, epoch: u64, event: StepEvent) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return false;
        }
        let current = state.step(step);
        let failure = match &event {
            StepEvent::Failed(err) => Some(err.clone()),
            StepEvent::Reverted(reason) => Some(AppError::ContractReverted(reason.clone())),
            _ => None,
        };
        let Some(next) = current.apply(event) else {
            tracing::warn!("Rejected {} transition from {}", step, current.label());
            return false;
        };
        state.steps.insert(step, next.clone());
        if let Some(err) = failure {
            state.last_error = Some(err);
        }
        drop(state);

        match next.tx_hash() {
            Some(hash) => tracing::info!("{} -> {} ({})", step, next.label(), tx_hash_hex(hash)),
            None => tracing::info!("{} -> {}", step, next.label()),
        }
        self.notify(step, &next);
        true
    }

    /// Submits through `submit`, or skips straight to confirmation when the
    /// ticket carries an already broadcast hash.
    async fn run_step<Fut>(
        &self,
        step: TxStep,
        ticket: &Ticket,
        submit: Fut,
    ) -> Result<TransactionReceipt>
    where
        Fut: Future<Output = std::result::Result<TxHash, ChainError>>,
    {
        let epoch = ticket.epoch;
        if let Some(tx_hash) = ticket.recheck {
            return self.finish_step(step, epoch, tx_hash).await;
        }

        let tx_hash = match submit.await {
            Ok(tx_hash) => tx_hash,
            Err(chain_err) => {
                let err = AppError::from(chain_err);
                let event = match &err {
                    AppError::ContractReverted(reason) => StepEvent::Reverted(reason.clone()),
                    _ => StepEvent::Failed(err.clone()),
                };
                self.transition(step, epoch, event).await;
                return Err(err);
            }
        };

        if !self
            .transition(step, epoch, StepEvent::Submitted(tx_hash))
            .await
        {
            return Err(abandoned(step, tx_hash));
        }
        self.finish_step(step, epoch, tx_hash).await
    }

    async fn finish_step(
        &self,
        step: TxStep,
        epoch: u64,
        tx_hash: TxHash,
    ) -> Result<TransactionReceipt> {
        let receipt = match self.confirm(tx_hash).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.transition(step, epoch, StepEvent::Failed(err.clone()))
                    .await;
                return Err(err);
            }
        };

        if receipt.status == Some(0u64.into()) {
            let reason = format!("transaction {} reverted", tx_hash_hex(tx_hash));
            self.transition(step, epoch, StepEvent::Reverted(reason.clone()))
                .await;
            return Err(AppError::ContractReverted(reason));
        }

        if !self
            .transition(step, epoch, StepEvent::Confirmed(tx_hash))
            .await
        {
            return Err(abandoned(step, tx_hash));
        }
        Ok(receipt)
    }

    /// Waits for the receipt, then falls back to polling with backoff.
    async fn confirm(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let tx_hex = tx_hash_hex(tx_hash);
        match timeout(
            self.settings.receipt_timeout,
            self.gateway.wait_for_receipt(tx_hash),
        )
        .await
        {
            Ok(Ok(Some(receipt))) => return Ok(receipt),
            Ok(Ok(None)) => tracing::debug!("Provider dropped {} while waiting", tx_hex),
            Ok(Err(e)) => tracing::debug!("Receipt wait for {} failed: {}", tx_hex, e),
            Err(_) => tracing::warn!(
                "No receipt for {} after {:?}; polling manually",
                tx_hex,
                self.settings.receipt_timeout
            ),
        }

        let mut interval = self.settings.poll_interval;
        for attempt in 1..=self.settings.poll_attempts {
            match self.gateway.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => tracing::debug!(
                    "Receipt for {} not found (attempt {}/{})",
                    tx_hex,
                    attempt,
                    self.settings.poll_attempts
                ),
                Err(e) => tracing::debug!(
                    "Receipt poll for {} failed (attempt {}/{}): {}",
                    tx_hex,
                    attempt,
                    self.settings.poll_attempts,
                    e
                ),
            }
            if attempt < self.settings.poll_attempts {
                sleep(interval).await;
                interval = (interval * 2).min(self.settings.max_poll_interval);
            }
        }

        tracing::warn!("Giving up on receipt for {}", tx_hex);
        Err(AppError::ConfirmationUnverified { tx_hash: tx_hex })
    }

    fn notify(&self, step: TxStep, state: &StepState) {
        if let Some(observer) = &self.observer {
            observer(StepTransition {
                step,
                state: state.label(),
                tx_hash: state.tx_hash().map(tx_hash_hex),
            });
        }
    }
}

fn abandoned(step: TxStep, tx_hash: TxHash) -> AppError {
    tracing::warn!(
        "{} transaction {} finished after reset; tracking was abandoned",
        step,
        tx_hash_hex(tx_hash)
    );
    AppError::Internal(format!(
        "{} tracking abandoned by reset ({})",
        step,
        tx_hash_hex(tx_hash)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockGateway;
    use crate::models::StakeStats;
    use crate::services::consumed_ledger::ConsumedLedger;
    use crate::services::preparation::fixtures;
    use std::sync::Mutex;
    use std::time::Duration;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            receipt_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            max_poll_interval: Duration::from_millis(4),
            poll_attempts: 5,
            require_auxiliary_mint: false,
        }
    }

    fn orchestrator(gateway: Arc<MockGateway>) -> TransactionOrchestrator {
        let reconciler = ResultReconciler::new(gateway.settlement_contract(), ConsumedLedger::new());
        TransactionOrchestrator::new(gateway, reconciler, settings())
    }

    async fn prepared(gateway: &Arc<MockGateway>) -> PreparationRecord {
        fixtures::service(gateway.clone()).prepare(5).await.unwrap()
    }

    #[tokio::test]
    async fn scenario_a_settles_and_decodes_win() {
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let result = orch.settle().await.unwrap().completed().unwrap();
        assert!(result.won);
        assert!(result.verified);
        assert!(result.settlement_tx_hash.starts_with("0x"));

        let settled = gateway.state.lock().unwrap().settled_with.clone();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].0, 5);
        assert_eq!(settled[0].1, StakeStats { hp: 100, attack: 20 });
        assert_eq!(settled[0].2.len(), 2);
        assert!(matches!(
            orch.step_state(TxStep::Settlement).await,
            StepState::Confirmed { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_settle_calls_submit_once() {
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let (first, second) = tokio::join!(orch.settle(), orch.settle());
        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, StepOutcome::Completed(_)))
                .count(),
            1
        );
        assert!(outcomes.contains(&StepOutcome::InFlight));
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);

        assert_eq!(orch.settle().await.unwrap(), StepOutcome::AlreadyDone);
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
    }

    #[tokio::test]
    async fn settle_is_blocked_until_approval_confirms() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.allowance = U256::zero()));
        let orch = orchestrator(gateway.clone());
        let record = prepared(&gateway).await;
        assert!(record.needs_approval);
        orch.load(record).await.unwrap();

        assert_eq!(orch.settle().await.unwrap_err(), AppError::AllowanceInsufficient);
        assert_eq!(orch.last_error().await, Some(AppError::AllowanceInsufficient));
        assert_eq!(gateway.submissions(TxStep::Settlement), 0);

        assert!(matches!(orch.approve().await.unwrap(), StepOutcome::Completed(_)));
        let approved = orch.record().await.unwrap();
        assert!(!approved.needs_approval);
        assert_eq!(approved.current_allowance, U256::MAX);

        assert!(orch.settle().await.unwrap().completed().is_some());
        assert_eq!(gateway.submissions(TxStep::Approval), 1);
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
    }

    #[tokio::test]
    async fn approval_is_skipped_when_allowance_suffices() {
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();
        assert_eq!(orch.approve().await.unwrap(), StepOutcome::AlreadyDone);
        assert_eq!(gateway.submissions(TxStep::Approval), 0);
    }

    #[tokio::test]
    async fn scenario_c_consumed_stake_blocks_every_submission() {
        let gateway = Arc::new(MockGateway::new().with(|c| {
            c.consumed.insert(5);
        }));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert_eq!(orch.settle().await.unwrap_err(), AppError::StakeConsumed(5));
        assert_eq!(gateway.state.lock().unwrap().submissions.len(), 0);
        assert_eq!(orch.step_state(TxStep::Settlement).await, StepState::Idle);
    }

    #[tokio::test]
    async fn short_balance_blocks_settlement() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.fee_balance = U256::zero()));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();
        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::InsufficientBalance(_)
        ));
        assert_eq!(gateway.submissions(TxStep::Settlement), 0);
    }

    #[tokio::test]
    async fn settle_without_record_is_not_prepared() {
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway);
        assert_eq!(orch.settle().await.unwrap_err(), AppError::NotPrepared);
    }

    #[tokio::test]
    async fn scenario_d_missing_event_is_unverified_loss() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.settlement_won = None));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let result = orch.settle().await.unwrap().completed().unwrap();
        assert!(!result.won);
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn user_cancellation_allows_immediate_retry() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_next_send(TxStep::Settlement, ChainError::UserRejected);
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert_eq!(orch.settle().await.unwrap_err(), AppError::UserCancelled);
        assert_eq!(orch.last_error().await, Some(AppError::UserCancelled));
        assert!(matches!(
            orch.step_state(TxStep::Settlement).await,
            StepState::Failed { .. }
        ));

        assert!(orch.settle().await.unwrap().completed().is_some());
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
    }

    #[tokio::test]
    async fn reverted_settlement_is_never_resubmitted() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.settlement_status = 0));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::ContractReverted(_)
        ));
        assert!(matches!(
            orch.step_state(TxStep::Settlement).await,
            StepState::Reverted { tx_hash: Some(_), .. }
        ));
        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::ContractReverted(_)
        ));
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
    }

    #[tokio::test]
    async fn revert_at_submission_has_no_hash() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_next_send(
            TxStep::Settlement,
            ChainError::Reverted {
                reason: "stake already used".to_string(),
            },
        );
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert_eq!(
            orch.settle().await.unwrap_err(),
            AppError::ContractReverted("stake already used".to_string())
        );
        assert_eq!(
            orch.step_state(TxStep::Settlement).await,
            StepState::Reverted {
                tx_hash: None,
                reason: "stake already used".to_string()
            }
        );
    }

    #[tokio::test]
    async fn insufficient_gas_funds_are_terminal() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_next_send(
            TxStep::Settlement,
            ChainError::InsufficientFunds {
                required: U256::from(10u64),
                available: U256::one(),
            },
        );
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::InsufficientBalance(_)
        ));
        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::InsufficientBalance(_)
        ));
        assert_eq!(gateway.submissions(TxStep::Settlement), 0);
    }

    #[tokio::test]
    async fn manual_polling_recovers_a_slow_receipt() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.receipt_hidden_for_polls = 2));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        assert!(orch.settle().await.unwrap().completed().unwrap().won);
        assert_eq!(gateway.state.lock().unwrap().receipt_polls, 3);
    }

    #[tokio::test]
    async fn exhausted_polling_is_unverified_and_keeps_the_hash() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.receipt_hidden_for_polls = 100));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let err = orch.settle().await.unwrap_err();
        let AppError::ConfirmationUnverified { tx_hash } = &err else {
            panic!("expected unverified confirmation, got {:?}", err);
        };
        assert_eq!(gateway.state.lock().unwrap().receipt_polls, 5);
        assert_eq!(
            orch.step_state(TxStep::Settlement).await.tx_hash().map(tx_hash_hex),
            Some(tx_hash.clone())
        );
        assert!(orch.has_unverified_settlement(5).await);
    }

    #[tokio::test]
    async fn unverified_settlement_is_rechecked_not_resent() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.receipt_hidden_for_polls = 100));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let AppError::ConfirmationUnverified { tx_hash: first } = orch.settle().await.unwrap_err()
        else {
            panic!("expected unverified confirmation");
        };

        // the transaction lands after polling gave up
        gateway.state.lock().unwrap().receipt_hidden_for_polls = 0;
        let result = orch.settle().await.unwrap().completed().unwrap();

        assert_eq!(result.settlement_tx_hash, first);
        assert!(result.won);
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
        assert!(!orch.has_unverified_settlement(5).await);
        assert_eq!(orch.settle().await.unwrap(), StepOutcome::AlreadyDone);
        assert_eq!(gateway.submissions(TxStep::Settlement), 1);
    }

    #[tokio::test]
    async fn loading_another_stake_starts_fresh_steps() {
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone());
        let first = prepared(&gateway).await;
        orch.load(first.clone()).await.unwrap();
        let won = orch.settle().await.unwrap().completed().unwrap();

        // same stake again stays done
        orch.load(first.clone()).await.unwrap();
        assert_eq!(orch.settle().await.unwrap(), StepOutcome::AlreadyDone);

        orch.load(PreparationRecord {
            stake_id: 6,
            ..first
        })
        .await
        .unwrap();
        assert_eq!(orch.step_state(TxStep::Settlement).await, StepState::Idle);

        let second = orch.settle().await.unwrap().completed().unwrap();
        assert_ne!(second.settlement_tx_hash, won.settlement_tx_hash);
        assert_eq!(gateway.submissions(TxStep::Settlement), 2);
        assert!(gateway.state.lock().unwrap().consumed.contains(&6));
    }

    #[tokio::test]
    async fn loading_another_stake_is_refused_while_unresolved() {
        let gateway = Arc::new(MockGateway::new().with(|c| c.receipt_hidden_for_polls = 100));
        let orch = orchestrator(gateway.clone());
        let first = prepared(&gateway).await;
        orch.load(first.clone()).await.unwrap();
        assert!(orch.settle().await.is_err());

        assert_eq!(
            orch.load(PreparationRecord {
                stake_id: 6,
                ..first.clone()
            })
            .await
            .unwrap_err(),
            AppError::StepInFlight(TxStep::Settlement)
        );
        assert_eq!(orch.record().await.unwrap().stake_id, 5);
        orch.load(first).await.unwrap();

        let abandoned = orch.reset().await;
        assert_eq!(abandoned.len(), 1);
        assert!(abandoned[0].tx_hash.is_some());
    }

    #[tokio::test]
    async fn required_mint_gates_settlement() {
        let gateway = Arc::new(MockGateway::new());
        let reconciler = ResultReconciler::new(gateway.settlement_contract(), ConsumedLedger::new());
        let orch = TransactionOrchestrator::new(
            gateway.clone(),
            reconciler,
            OrchestratorSettings {
                require_auxiliary_mint: true,
                ..settings()
            },
        );
        orch.load(prepared(&gateway).await).await.unwrap();

        assert!(matches!(
            orch.settle().await.unwrap_err(),
            AppError::PreparationFailed(_)
        ));
        assert!(matches!(
            orch.mint_auxiliary().await.unwrap(),
            StepOutcome::Completed(_)
        ));
        assert!(orch.record().await.unwrap().auxiliary_minted);
        assert_eq!(orch.mint_auxiliary().await.unwrap(), StepOutcome::AlreadyDone);
        assert!(orch.settle().await.unwrap().completed().is_some());
    }

    #[tokio::test]
    async fn reset_reports_abandoned_pending_transaction() {
        let gateway = Arc::new(MockGateway::new().with(|c| {
            c.submit_delay = Duration::from_millis(1);
            c.wait_delay = Duration::from_millis(50);
        }));
        let orch = orchestrator(gateway.clone());
        orch.load(prepared(&gateway).await).await.unwrap();

        let (settled, abandoned) = tokio::join!(orch.settle(), async {
            sleep(Duration::from_millis(15)).await;
            orch.reset().await
        });

        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].step, TxStep::Settlement);
        assert!(abandoned[0].tx_hash.is_some());
        assert!(matches!(settled.unwrap_err(), AppError::Internal(_)));
        assert!(orch
            .snapshot()
            .await
            .iter()
            .all(|(_, state)| *state == StepState::Idle));
        assert!(orch.record().await.is_none());
        // the chain still consumed the stake
        assert!(gateway.state.lock().unwrap().consumed.contains(&5));
    }

    #[tokio::test]
    async fn observer_sees_settlement_lifecycle() {
        let gateway = Arc::new(MockGateway::new());
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let sink = seen.clone();
        let observer: TransitionObserver = Arc::new(move |t: StepTransition| {
            if t.step == TxStep::Settlement {
                sink.lock().unwrap().push(t.state);
            }
        });
        let orch = orchestrator(gateway.clone()).with_observer(observer);
        orch.load(prepared(&gateway).await).await.unwrap();
        orch.settle().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["submitting", "pending", "confirmed"]
        );
    }
}
