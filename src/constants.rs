/// Application constants

// Environment
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_CHAIN_ID: u64 = 31_337;
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

// Placeholder contract addresses (local devnet)
pub const CONTRACT_BATTLE_ARENA: &str = "0x0000000000000000000000000000000000001001";
pub const TOKEN_BATTLE_FEE: &str = "0x0000000000000000000000000000000000001002";

// Battle fee, in fee-token smallest units (18 decimals)
pub const DEFAULT_BATTLE_FEE_WEI: u128 = 10_000_000_000_000_000_000;

// Combat pacing (presentational only)
pub const TURN_DELAY_MS: u64 = 1_500;
pub const HIT_EFFECT_MS: u64 = 300;
pub const MAX_COMBAT_TURNS: u32 = 500;

// Default combatants
pub const DEFAULT_ATTACKER_NAME: &str = "Challenger";
pub const DEFAULT_ATTACKER_HP: u32 = 100;
pub const DEFAULT_ATTACKER_ATK: u32 = 20;
pub const DEFAULT_DEFENDER_NAME: &str = "Arena Guardian";
pub const DEFAULT_DEFENDER_HP: u32 = 120;
pub const DEFAULT_DEFENDER_ATK: u32 = 15;

// Receipt confirmation
pub const RECEIPT_TIMEOUT_SECS: u64 = 45;
pub const RECEIPT_POLL_INTERVAL_SECS: u64 = 3;
pub const RECEIPT_POLL_MAX_INTERVAL_SECS: u64 = 15;
pub const RECEIPT_POLL_ATTEMPTS: u32 = 10;

// Insufficient-balance redirect
pub const REDIRECT_COUNTDOWN_SECS: u32 = 3;

// Session event channel
pub const SESSION_EVENT_CAPACITY: usize = 256;

// Outbound collaborators
pub const COLLABORATOR_TIMEOUT_SECS: u64 = 10;

// JSON-RPC error codes (EIP-1193 / EIP-1474)
pub const RPC_CODE_USER_REJECTED: i64 = 4001;
pub const RPC_CODE_UNAUTHORIZED: i64 = 4100;
pub const RPC_CODE_EXECUTION_REVERTED: i64 = 3;
