use ethers::types::{Address, H256, U256};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::constants::{
    CONTRACT_BATTLE_ARENA, DEFAULT_BATTLE_FEE_WEI, DEFAULT_CHAIN_ID, DEFAULT_ENVIRONMENT,
    DEFAULT_RPC_URL, HIT_EFFECT_MS, MAX_COMBAT_TURNS, RECEIPT_POLL_ATTEMPTS,
    RECEIPT_POLL_INTERVAL_SECS, RECEIPT_POLL_MAX_INTERVAL_SECS, RECEIPT_TIMEOUT_SECS,
    REDIRECT_COUNTDOWN_SECS, TOKEN_BATTLE_FEE, TURN_DELAY_MS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,

    // Blockchain
    pub rpc_url: String,
    pub chain_id: u64,
    pub wallet_private_key: Option<String>,

    // Contract Addresses
    pub settlement_contract_address: Address,
    pub fee_token_address: Address,
    pub auxiliary_token_address: Option<Address>,

    // Battle economics
    pub battle_fee: U256,
    pub eligibility_root: Option<H256>,
    pub require_auxiliary_mint: bool,

    // Collaborators
    pub stake_index_url: String,
    pub inventory_api_url: Option<String>,
    pub profile_refresh_url: Option<String>,
    pub quest_refresh_url: Option<String>,

    // Confirmation
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub receipt_poll_max_interval_secs: u64,
    pub receipt_poll_attempts: u32,

    // Presentation pacing
    pub turn_delay_ms: u64,
    pub hit_effect_ms: u64,
    pub max_turns: u32,
    pub redirect_countdown_secs: u32,
}

/// Timing knobs for step confirmation.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub poll_attempts: u32,
    pub require_auxiliary_mint: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            receipt_timeout: Duration::from_secs(RECEIPT_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(RECEIPT_POLL_INTERVAL_SECS),
            max_poll_interval: Duration::from_secs(RECEIPT_POLL_MAX_INTERVAL_SECS),
            poll_attempts: RECEIPT_POLL_ATTEMPTS,
            require_auxiliary_mint: false,
        }
    }
}

/// Pacing of the client-side battle animation.
#[derive(Debug, Clone)]
pub struct CombatTiming {
    pub turn_delay: Duration,
    pub hit_effect: Duration,
    pub max_turns: u32,
    pub redirect_countdown_secs: u32,
}

impl Default for CombatTiming {
    fn default() -> Self {
        Self {
            turn_delay: Duration::from_millis(TURN_DELAY_MS),
            hit_effect: Duration::from_millis(HIT_EFFECT_MS),
            max_turns: MAX_COMBAT_TURNS,
            redirect_countdown_secs: REDIRECT_COUNTDOWN_SECS,
        }
    }
}

// Internal helper that supports `env_non_empty` operations.
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Internal helper that supports `env_flag` operations.
fn env_flag(name: &str, default: bool) -> bool {
    env_non_empty(name)
        .map(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

// Internal helper that parses or transforms values for `env_parse`.
fn env_parse<T: FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_non_empty(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        None => Ok(default),
    }
}

pub fn parse_address(name: &str, raw: &str) -> anyhow::Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| anyhow::anyhow!("{} is not an address: {}", name, e))
}

pub fn parse_h256(name: &str, raw: &str) -> anyhow::Result<H256> {
    H256::from_str(raw.trim()).map_err(|e| anyhow::anyhow!("{} is not a 32-byte hash: {}", name, e))
}

pub fn parse_u256_dec(name: &str, raw: &str) -> anyhow::Result<U256> {
    U256::from_dec_str(raw.trim()).map_err(|e| anyhow::anyhow!("{} is not an integer: {}", name, e))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let settlement_raw = env_non_empty("ARENA_SETTLEMENT_ADDRESS")
            .unwrap_or_else(|| CONTRACT_BATTLE_ARENA.to_string());
        let fee_token_raw = env_non_empty("ARENA_FEE_TOKEN_ADDRESS")
            .unwrap_or_else(|| TOKEN_BATTLE_FEE.to_string());
        let battle_fee = match env_non_empty("ARENA_BATTLE_FEE") {
            Some(raw) => parse_u256_dec("ARENA_BATTLE_FEE", &raw)?,
            None => U256::from(DEFAULT_BATTLE_FEE_WEI),
        };

        Ok(Config {
            environment: env_non_empty("ARENA_ENVIRONMENT")
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),

            rpc_url: env_non_empty("ARENA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            chain_id: env_parse("ARENA_CHAIN_ID", DEFAULT_CHAIN_ID)?,
            wallet_private_key: env_non_empty("ARENA_WALLET_PRIVATE_KEY"),

            settlement_contract_address: parse_address("ARENA_SETTLEMENT_ADDRESS", &settlement_raw)?,
            fee_token_address: parse_address("ARENA_FEE_TOKEN_ADDRESS", &fee_token_raw)?,
            auxiliary_token_address: env_non_empty("ARENA_AUXILIARY_TOKEN_ADDRESS")
                .map(|raw| parse_address("ARENA_AUXILIARY_TOKEN_ADDRESS", &raw))
                .transpose()?,

            battle_fee,
            eligibility_root: env_non_empty("ARENA_ELIGIBILITY_ROOT")
                .map(|raw| parse_h256("ARENA_ELIGIBILITY_ROOT", &raw))
                .transpose()?,
            require_auxiliary_mint: env_flag("ARENA_REQUIRE_AUXILIARY_MINT", false),

            stake_index_url: env::var("ARENA_STAKE_INDEX_URL")?,
            inventory_api_url: env_non_empty("ARENA_INVENTORY_API_URL"),
            profile_refresh_url: env_non_empty("ARENA_PROFILE_REFRESH_URL"),
            quest_refresh_url: env_non_empty("ARENA_QUEST_REFRESH_URL"),

            receipt_timeout_secs: env_parse("ARENA_RECEIPT_TIMEOUT_SECS", RECEIPT_TIMEOUT_SECS)?,
            receipt_poll_interval_secs: env_parse(
                "ARENA_RECEIPT_POLL_INTERVAL_SECS",
                RECEIPT_POLL_INTERVAL_SECS,
            )?,
            receipt_poll_max_interval_secs: env_parse(
                "ARENA_RECEIPT_POLL_MAX_INTERVAL_SECS",
                RECEIPT_POLL_MAX_INTERVAL_SECS,
            )?,
            receipt_poll_attempts: env_parse("ARENA_RECEIPT_POLL_ATTEMPTS", RECEIPT_POLL_ATTEMPTS)?,

            turn_delay_ms: env_parse("ARENA_TURN_DELAY_MS", TURN_DELAY_MS)?,
            hit_effect_ms: env_parse("ARENA_HIT_EFFECT_MS", HIT_EFFECT_MS)?,
            max_turns: env_parse("ARENA_MAX_TURNS", MAX_COMBAT_TURNS)?,
            redirect_countdown_secs: env_parse(
                "ARENA_REDIRECT_COUNTDOWN_SECS",
                REDIRECT_COUNTDOWN_SECS,
            )?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.rpc_url).map_err(|e| anyhow::anyhow!("ARENA_RPC_URL is invalid: {}", e))?;
        Url::parse(&self.stake_index_url)
            .map_err(|e| anyhow::anyhow!("ARENA_STAKE_INDEX_URL is invalid: {}", e))?;
        for (name, value) in [
            ("ARENA_INVENTORY_API_URL", &self.inventory_api_url),
            ("ARENA_PROFILE_REFRESH_URL", &self.profile_refresh_url),
            ("ARENA_QUEST_REFRESH_URL", &self.quest_refresh_url),
        ] {
            if let Some(raw) = value {
                Url::parse(raw).map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e))?;
            }
        }

        if self.receipt_poll_attempts == 0 {
            anyhow::bail!("ARENA_RECEIPT_POLL_ATTEMPTS must be > 0");
        }
        if self.receipt_poll_interval_secs == 0 {
            anyhow::bail!("ARENA_RECEIPT_POLL_INTERVAL_SECS must be > 0");
        }
        if self.require_auxiliary_mint && self.auxiliary_token_address.is_none() {
            anyhow::bail!("ARENA_REQUIRE_AUXILIARY_MINT is set but ARENA_AUXILIARY_TOKEN_ADDRESS is missing");
        }

        if format!("{:#x}", self.settlement_contract_address).starts_with("0x0000") {
            tracing::warn!("Using placeholder settlement contract address");
        }
        if format!("{:#x}", self.fee_token_address).starts_with("0x0000") {
            tracing::warn!("Using placeholder fee token address");
        }
        if self.wallet_private_key.is_none() {
            tracing::warn!("ARENA_WALLET_PRIVATE_KEY not set; wallet-signed steps will fail");
        }
        if self.eligibility_root.is_none() {
            tracing::debug!("No eligibility root configured; proofs are checked on-chain only");
        }

        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_secs(self.receipt_poll_interval_secs),
            max_poll_interval: Duration::from_secs(
                self.receipt_poll_max_interval_secs
                    .max(self.receipt_poll_interval_secs),
            ),
            poll_attempts: self.receipt_poll_attempts,
            require_auxiliary_mint: self.require_auxiliary_mint,
        }
    }

    pub fn combat_timing(&self) -> CombatTiming {
        CombatTiming {
            turn_delay: Duration::from_millis(self.turn_delay_ms),
            hit_effect: Duration::from_millis(self.hit_effect_ms),
            max_turns: self.max_turns,
            redirect_countdown_secs: self.redirect_countdown_secs,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        environment: "development".to_string(),
        rpc_url: "http://localhost:8545".to_string(),
        chain_id: DEFAULT_CHAIN_ID,
        wallet_private_key: None,
        settlement_contract_address: Address::from_low_u64_be(0x1001),
        fee_token_address: Address::from_low_u64_be(0x1002),
        auxiliary_token_address: None,
        battle_fee: U256::from(DEFAULT_BATTLE_FEE_WEI),
        eligibility_root: None,
        require_auxiliary_mint: false,
        stake_index_url: "http://localhost:4000".to_string(),
        inventory_api_url: None,
        profile_refresh_url: None,
        quest_refresh_url: None,
        receipt_timeout_secs: RECEIPT_TIMEOUT_SECS,
        receipt_poll_interval_secs: RECEIPT_POLL_INTERVAL_SECS,
        receipt_poll_max_interval_secs: RECEIPT_POLL_MAX_INTERVAL_SECS,
        receipt_poll_attempts: RECEIPT_POLL_ATTEMPTS,
        turn_delay_ms: TURN_DELAY_MS,
        hit_effect_ms: HIT_EFFECT_MS,
        max_turns: MAX_COMBAT_TURNS,
        redirect_countdown_secs: REDIRECT_COUNTDOWN_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default_test_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_rpc_url() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_mint_requirement_without_token() {
        let mut config = test_config();
        config.require_auxiliary_mint = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn orchestrator_settings_never_cap_below_base_interval() {
        let mut config = test_config();
        config.receipt_poll_interval_secs = 20;
        config.receipt_poll_max_interval_secs = 5;
        let settings = config.orchestrator_settings();
        assert_eq!(settings.max_poll_interval, Duration::from_secs(20));
        assert_eq!(settings.receipt_timeout, Duration::from_secs(45));
    }

    #[test]
    fn parse_u256_dec_reads_large_fee() {
        let fee = parse_u256_dec("FEE", "10000000000000000000").unwrap();
        assert_eq!(fee, U256::from(DEFAULT_BATTLE_FEE_WEI));
        assert!(parse_u256_dec("FEE", "0x10").is_err());
    }
}
