use ethers::{
    abi::RawLog,
    contract::EthEvent,
    types::{Address, TransactionReceipt, TxHash, U256},
};

use super::contracts::SettlementCompletedFilter;
use crate::models::DecodedOutcome;

/// Finds the `SettlementCompleted` event for `stake_id` emitted by
/// `settlement_contract` and returns its outcome.
///
/// Logs from other contracts, with another signature, for another stake, or
/// that fail to decode are skipped. When nothing matches the result is
/// [`DecodedOutcome::Unknown`], never an error.
pub fn decode_settlement_outcome(
    receipt: &TransactionReceipt,
    settlement_contract: Address,
    stake_id: u64,
) -> DecodedOutcome {
    let signature = SettlementCompletedFilter::signature();

    for log in &receipt.logs {
        if log.address != settlement_contract {
            continue;
        }
        if log.topics.first() != Some(&signature) {
            continue;
        }
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let event = match <SettlementCompletedFilter as EthEvent>::decode_log(&raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!("Skipping malformed SettlementCompleted log: {}", err);
                continue;
            }
        };
        if event.stake_id != U256::from(stake_id) {
            continue;
        }
        return if event.won {
            DecodedOutcome::Won
        } else {
            DecodedOutcome::Lost
        };
    }

    DecodedOutcome::Unknown
}

pub fn tx_hash_hex(tx_hash: TxHash) -> String {
    format!("{:#x}", tx_hash)
}

#[cfg(test)]
pub(crate) fn settlement_log(
    contract: Address,
    player: Address,
    stake_id: u64,
    won: bool,
) -> ethers::types::Log {
    use ethers::abi::{encode, Token};
    use ethers::types::H256;

    let mut stake_topic = [0u8; 32];
    U256::from(stake_id).to_big_endian(&mut stake_topic);
    ethers::types::Log {
        address: contract,
        topics: vec![
            SettlementCompletedFilter::signature(),
            H256::from(player),
            H256::from(stake_topic),
        ],
        data: encode(&[Token::Bool(won)]).into(),
        ..Default::default()
    }
}
