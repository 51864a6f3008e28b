use async_trait::async_trait;
use ethers::{
    abi::Detokenize,
    contract::{ContractCall, ContractError},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, MiddlewareError, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, TransactionReceipt, TxHash, H256, U256},
};
use std::sync::Arc;
use std::time::Duration;

use super::{
    contracts::{AuxiliaryToken, BattleArena, FeeToken},
    ChainError, ChainGateway,
};
use crate::{
    config::Config,
    constants::{RPC_CODE_EXECUTION_REVERTED, RPC_CODE_UNAUTHORIZED, RPC_CODE_USER_REJECTED},
    error::{AppError, Result},
    models::StakeStats,
};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// ethers-backed gateway: a plain provider for reads, a signer middleware for
/// wallet-signed writes.
pub struct EvmGateway {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerClient>>,
    settlement_contract: Address,
    fee_token: Address,
    auxiliary_token: Option<Address>,
}

impl EvmGateway {
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?
            .interval(Duration::from_secs(config.receipt_poll_interval_secs.max(1)));

        let signer = match &config.wallet_private_key {
            Some(key) => {
                let wallet = key
                    .trim()
                    .trim_start_matches("0x")
                    .parse::<LocalWallet>()
                    .map_err(|e| AppError::Config(format!("Invalid wallet key: {}", e)))?
                    .with_chain_id(config.chain_id);
                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => None,
        };

        Ok(Self {
            provider: Arc::new(provider),
            signer,
            settlement_contract: config.settlement_contract_address,
            fee_token: config.fee_token_address,
            auxiliary_token: config.auxiliary_token_address,
        })
    }

    fn signer(&self) -> std::result::Result<Arc<SignerClient>, ChainError> {
        self.signer.clone().ok_or(ChainError::WalletNotConnected)
    }

    fn auxiliary_token(&self) -> std::result::Result<Address, ChainError> {
        self.auxiliary_token.ok_or_else(|| ChainError::Reverted {
            reason: "auxiliary token address not configured".to_string(),
        })
    }

    // Estimates gas and checks the native balance can pay for it, so an
    // underfunded wallet fails before any signature prompt.
    async fn preflight<D>(
        &self,
        call: &ContractCall<SignerClient, D>,
        account: Address,
    ) -> std::result::Result<(), ChainError>
    where
        D: Detokenize + Send + Sync,
    {
        let gas = call.estimate_gas().await.map_err(classify_contract_error)?;
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| classify_middleware_error(&e))?;
        let available = self
            .provider
            .get_balance(account, None)
            .await
            .map_err(|e| classify_middleware_error(&e))?;
        let required = gas.saturating_mul(gas_price);
        if available < required {
            return Err(ChainError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    async fn submit<D>(
        &self,
        call: ContractCall<SignerClient, D>,
        account: Address,
    ) -> std::result::Result<TxHash, ChainError>
    where
        D: Detokenize + Send + Sync,
    {
        self.preflight(&call, account).await?;
        let pending = call.send().await.map_err(classify_contract_error)?;
        let tx_hash = *pending;
        tracing::debug!("Submitted transaction {:#x}", tx_hash);
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(|client| client.address())
    }

    fn settlement_contract(&self) -> Address {
        self.settlement_contract
    }

    async fn fee_token_balance(&self, owner: Address) -> std::result::Result<U256, ChainError> {
        let token = FeeToken::new(self.fee_token, Arc::clone(&self.provider));
        token
            .balance_of(owner)
            .call()
            .await
            .map_err(classify_contract_error)
    }

    async fn fee_allowance(&self, owner: Address) -> std::result::Result<U256, ChainError> {
        let token = FeeToken::new(self.fee_token, Arc::clone(&self.provider));
        token
            .allowance(owner, self.settlement_contract)
            .call()
            .await
            .map_err(classify_contract_error)
    }

    async fn auxiliary_minted(&self, owner: Address) -> std::result::Result<bool, ChainError> {
        let Some(address) = self.auxiliary_token else {
            return Ok(false);
        };
        let token = AuxiliaryToken::new(address, Arc::clone(&self.provider));
        token
            .has_minted(owner)
            .call()
            .await
            .map_err(classify_contract_error)
    }

    async fn is_consumed(&self, stake_id: u64) -> std::result::Result<bool, ChainError> {
        let arena = BattleArena::new(self.settlement_contract, Arc::clone(&self.provider));
        arena
            .is_consumed(U256::from(stake_id))
            .call()
            .await
            .map_err(classify_contract_error)
    }

    async fn send_approval(&self, amount: U256) -> std::result::Result<TxHash, ChainError> {
        let client = self.signer()?;
        let account = client.address();
        let token = FeeToken::new(self.fee_token, client);
        let call = token.approve(self.settlement_contract, amount);
        self.submit(call, account).await
    }

    async fn send_auxiliary_mint(&self) -> std::result::Result<TxHash, ChainError> {
        let client = self.signer()?;
        let account = client.address();
        let token = AuxiliaryToken::new(self.auxiliary_token()?, client);
        let call = token.mint();
        self.submit(call, account).await
    }

    async fn send_settlement(
        &self,
        stake_id: u64,
        stats: StakeStats,
        proof: &[H256],
    ) -> std::result::Result<TxHash, ChainError> {
        let client = self.signer()?;
        let account = client.address();
        let arena = BattleArena::new(self.settlement_contract, client);
        let call = arena.settle(
            U256::from(stake_id),
            U256::from(stats.hp),
            U256::from(stats.attack),
            proof.iter().map(|h| h.to_fixed_bytes()).collect(),
        );
        self.submit(call, account).await
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> std::result::Result<Option<TransactionReceipt>, ChainError> {
        PendingTransaction::new(tx_hash, self.provider.as_ref())
            .await
            .map_err(|e| classify_middleware_error(&e))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> std::result::Result<Option<TransactionReceipt>, ChainError> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify_middleware_error(&e))
    }
}

/// Maps a JSON-RPC error code (EIP-1193 / EIP-1474) to a tagged chain error.
pub fn classify_rpc_code(code: i64, message: &str, revert_data: Option<String>) -> ChainError {
    match code {
        RPC_CODE_USER_REJECTED => ChainError::UserRejected,
        RPC_CODE_UNAUTHORIZED => ChainError::WalletNotConnected,
        RPC_CODE_EXECUTION_REVERTED => ChainError::Reverted {
            reason: revert_data.unwrap_or_else(|| message.to_string()),
        },
        _ => ChainError::Rpc {
            code,
            message: message.to_string(),
        },
    }
}

// Internal helper that classifies provider/middleware failures.
fn classify_middleware_error<E: MiddlewareError>(err: &E) -> ChainError {
    match err.as_error_response() {
        Some(response) => classify_rpc_code(
            response.code,
            &response.message,
            response.data.as_ref().map(|data| {
                data.as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string())
            }),
        ),
        None => ChainError::Network(err.to_string()),
    }
}

// Internal helper that classifies contract call failures.
fn classify_contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    match err {
        ContractError::Revert(data) => ChainError::Reverted {
            reason: format!("0x{}", hex::encode(data.as_ref())),
        },
        ContractError::MiddlewareError { e } => classify_middleware_error(&e),
        ContractError::ProviderError { e } => classify_middleware_error(&e),
        other => ChainError::Rpc {
            code: 0,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn rpc_codes_map_to_tagged_errors() {
        assert_eq!(classify_rpc_code(4001, "denied", None), ChainError::UserRejected);
        assert_eq!(
            classify_rpc_code(4100, "unauthorized", None),
            ChainError::WalletNotConnected
        );
        assert_eq!(
            classify_rpc_code(3, "execution reverted", Some("0x08c379a0".to_string())),
            ChainError::Reverted {
                reason: "0x08c379a0".to_string()
            }
        );
        assert_eq!(
            classify_rpc_code(-32603, "internal", None),
            ChainError::Rpc {
                code: -32603,
                message: "internal".to_string()
            }
        );
    }

    #[test]
    fn gateway_without_key_has_no_account() {
        let gateway = EvmGateway::from_config(&test_config()).unwrap();
        assert!(gateway.account().is_none());
        assert_eq!(
            gateway.settlement_contract(),
            Address::from_low_u64_be(0x1001)
        );
    }

    #[test]
    fn gateway_with_key_derives_signer_address() {
        let mut config = test_config();
        // well-known devnet key #0
        config.wallet_private_key = Some(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
        );
        let gateway = EvmGateway::from_config(&config).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(gateway.account(), Some(expected));
    }

    #[tokio::test]
    async fn writes_without_wallet_are_rejected_before_rpc() {
        let gateway = EvmGateway::from_config(&test_config()).unwrap();
        let err = gateway.send_approval(U256::MAX).await.unwrap_err();
        assert_eq!(err, ChainError::WalletNotConnected);
    }

    #[test]
    fn invalid_wallet_key_is_a_config_error() {
        let mut config = test_config();
        config.wallet_private_key = Some("zz".to_string());
        assert!(matches!(
            EvmGateway::from_config(&config),
            Err(AppError::Config(_))
        ));
    }
}
