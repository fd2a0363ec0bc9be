use core::time::Duration;

use types::primitives::{Bytes, ExecutionAddress, Gas};

pub const DEFAULT_GAS_CEIL: Gas = 30_000_000;

// Consensus clients usually wait half a slot for a payload, enough for about 3 rounds.
pub const DEFAULT_RECOMMIT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Receives fees of the pending block.
    pub pending_fee_recipient: ExecutionAddress,
    pub extra_data: Bytes,
    /// Gas limit to move towards on chains where the consensus layer does not set it.
    pub gas_ceil: Gas,
    pub recommit: Duration,
    /// Build the pending block from the transaction pool on rollups instead of serving the head.
    pub rollup_compute_pending_block: bool,
    pub max_da_tx_size: Option<u64>,
    pub max_da_block_size: Option<u64>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            pending_fee_recipient: ExecutionAddress::zero(),
            extra_data: Bytes::new(),
            gas_ceil: DEFAULT_GAS_CEIL,
            recommit: DEFAULT_RECOMMIT,
            rollup_compute_pending_block: false,
            max_da_tx_size: None,
            max_da_block_size: None,
        }
    }
}
