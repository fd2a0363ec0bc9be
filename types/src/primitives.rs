pub use bytes::Bytes;
pub use ethereum_types::{Bloom, H160, H256, H32, H64, U256};

pub type ChainId = u64;
pub type Difficulty = U256;
pub type ExecutionAddress = H160;
pub type ExecutionBlockHash = H256;
pub type ExecutionBlockNumber = u64;
pub type Gas = u64;
pub type Gwei = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;
pub type VersionedHash = H256;
pub type Wei = U256;
pub type WithdrawalIndex = u64;
