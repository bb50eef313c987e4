//! The host chain seam.
//!
//! The ledger only ever asks the chain one question: what is the current
//! block height. Lock arithmetic is height-relative, never wall-clock.

use lockchannel_types::BlockHeight;

/// Source of the current block height. Heights never decrease.
pub trait HostChain {
    fn height(&self) -> BlockHeight;
}

/// In-memory chain whose height is advanced by hand.
#[derive(Debug, Clone, Default)]
pub struct SimulatedChain {
    height: BlockHeight,
}

impl SimulatedChain {
    /// A chain sitting at height `start`.
    #[must_use]
    pub fn new(start: BlockHeight) -> Self {
        Self { height: start }
    }

    /// Mine `blocks` blocks and return the new height.
    pub fn advance(&mut self, blocks: u64) -> BlockHeight {
        self.height = self.height.saturating_add(blocks);
        self.height
    }
}

impl HostChain for SimulatedChain {
    fn height(&self) -> BlockHeight {
        self.height
    }
}
