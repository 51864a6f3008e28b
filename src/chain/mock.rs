use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash, H256, U256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{events::settlement_log, ChainError, ChainGateway};
use crate::models::{StakeStats, TxStep};

/// Scriptable in-memory chain used by unit tests.
pub(crate) struct MockGateway {
    account: Option<Address>,
    contract: Address,
    pub state: Mutex<MockChain>,
}

pub(crate) struct MockChain {
    pub fee_balance: U256,
    pub allowance: U256,
    pub auxiliary_minted: bool,
    pub consumed: HashSet<u64>,
    /// Outcome written into the settlement log; `None` emits no log at all.
    pub settlement_won: Option<bool>,
    pub settlement_status: u64,
    pub submit_delay: Duration,
    pub wait_delay: Duration,
    /// Receipts only show up after this many `transaction_receipt` lookups.
    pub receipt_hidden_for_polls: u32,
    pub send_errors: HashMap<TxStep, VecDeque<ChainError>>,
    pub read_error: Option<ChainError>,
    pub submissions: Vec<(TxStep, TxHash)>,
    pub settled_with: Vec<(u64, StakeStats, Vec<H256>)>,
    pub receipt_polls: u32,
    receipts: HashMap<TxHash, TransactionReceipt>,
    nonce: u64,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            fee_balance: U256::exp10(21),
            allowance: U256::MAX,
            auxiliary_minted: false,
            consumed: HashSet::new(),
            settlement_won: Some(true),
            settlement_status: 1,
            submit_delay: Duration::from_millis(5),
            wait_delay: Duration::from_millis(1),
            receipt_hidden_for_polls: 0,
            send_errors: HashMap::new(),
            read_error: None,
            submissions: Vec::new(),
            settled_with: Vec::new(),
            receipt_polls: 0,
            receipts: HashMap::new(),
            nonce: 0,
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            account: Some(Address::from_low_u64_be(0xb0b)),
            contract: Address::from_low_u64_be(0xa1),
            state: Mutex::new(MockChain::default()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: None,
            ..Self::new()
        }
    }

    pub fn with<F: FnOnce(&mut MockChain)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn fail_next_send(&self, step: TxStep, error: ChainError) {
        self.state
            .lock()
            .unwrap()
            .send_errors
            .entry(step)
            .or_default()
            .push_back(error);
    }

    pub fn submissions(&self, step: TxStep) -> usize {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|(s, _)| *s == step)
            .count()
    }

    async fn submit(&self, step: TxStep) -> Result<TxHash, ChainError> {
        let delay = self.state.lock().unwrap().submit_delay;
        tokio::time::sleep(delay).await;

        let mut chain = self.state.lock().unwrap();
        if let Some(err) = chain.send_errors.get_mut(&step).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        chain.nonce += 1;
        let tx_hash = H256::from_low_u64_be(0x7000 + chain.nonce);
        chain.submissions.push((step, tx_hash));

        let mut receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            status: Some(chain.settlement_status.into()),
            ..Default::default()
        };
        match step {
            TxStep::Approval => {
                receipt.status = Some(1u64.into());
                chain.allowance = U256::MAX;
            }
            TxStep::AuxiliaryMint => {
                receipt.status = Some(1u64.into());
                chain.auxiliary_minted = true;
            }
            TxStep::Settlement => {
                let (stake_id, _, _) = chain
                    .settled_with
                    .last()
                    .cloned()
                    .expect("settlement args recorded");
                if chain.settlement_status == 1 {
                    chain.consumed.insert(stake_id);
                    if let Some(won) = chain.settlement_won {
                        receipt.logs.push(settlement_log(
                            self.contract,
                            self.account.unwrap_or_default(),
                            stake_id,
                            won,
                        ));
                    }
                }
            }
        }
        chain.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    fn read<T>(&self, f: impl FnOnce(&MockChain) -> T) -> Result<T, ChainError> {
        let chain = self.state.lock().unwrap();
        if let Some(err) = chain.read_error.clone() {
            return Err(err);
        }
        Ok(f(&chain))
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    fn account(&self) -> Option<Address> {
        self.account
    }

    fn settlement_contract(&self) -> Address {
        self.contract
    }

    async fn fee_token_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        self.read(|c| c.fee_balance)
    }

    async fn fee_allowance(&self, _owner: Address) -> Result<U256, ChainError> {
        self.read(|c| c.allowance)
    }

    async fn auxiliary_minted(&self, _owner: Address) -> Result<bool, ChainError> {
        self.read(|c| c.auxiliary_minted)
    }

    async fn is_consumed(&self, stake_id: u64) -> Result<bool, ChainError> {
        self.read(|c| c.consumed.contains(&stake_id))
    }

    async fn send_approval(&self, _amount: U256) -> Result<TxHash, ChainError> {
        self.submit(TxStep::Approval).await
    }

    async fn send_auxiliary_mint(&self) -> Result<TxHash, ChainError> {
        self.submit(TxStep::AuxiliaryMint).await
    }

    async fn send_settlement(
        &self,
        stake_id: u64,
        stats: StakeStats,
        proof: &[H256],
    ) -> Result<TxHash, ChainError> {
        self.state
            .lock()
            .unwrap()
            .settled_with
            .push((stake_id, stats, proof.to_vec()));
        self.submit(TxStep::Settlement).await
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let (delay, hidden) = {
            let chain = self.state.lock().unwrap();
            (chain.wait_delay, chain.receipt_hidden_for_polls > 0)
        };
        tokio::time::sleep(delay).await;
        if hidden {
            return Err(ChainError::Timeout);
        }
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let mut chain = self.state.lock().unwrap();
        chain.receipt_polls += 1;
        if chain.receipt_polls <= chain.receipt_hidden_for_polls {
            return Ok(None);
        }
        Ok(chain.receipts.get(&tx_hash).cloned())
    }
}
