//! System-wide constants for the lockchannel escrow ledger.

/// Depth of both sparse Merkle maps (one level per bit of a 256-bit key).
pub const MERKLE_DEPTH: usize = 256;

/// Default minimum number of blocks a deposit must stay locked.
pub const DEFAULT_MIN_LOCK_MARGIN: u64 = 1000;

/// Default number of superseded roots remembered per map for stale-root detection.
pub const DEFAULT_ROOT_HISTORY_SIZE: usize = 1024;
