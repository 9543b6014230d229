//! Constants used in the bootstrap scripts

/// The RPC URL used when none is configured
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// The directory searched for compiled contract artifacts when none is configured
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The number of blocks a receipt must be buried under before it is accepted
pub const DEFAULT_CONFIRMATIONS: u64 = 2;

/// The number of blocks to wait for a receipt before giving up on a transaction
pub const DEFAULT_TIMEOUT_BLOCKS: u64 = 200;

/// The number of consecutive polls without a new block after which the chain
/// head is considered stalled, as on a node that only mines on demand
pub const DEFAULT_STALL_POLLS: u64 = 10;

/// The interval, in milliseconds, between polls of the node while awaiting a receipt
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// The file extension of compiled contract artifacts
pub const ARTIFACT_EXTENSION: &str = "json";
