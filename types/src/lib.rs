pub mod config;
pub mod execution;
pub mod fork;
pub mod primitives;
pub mod protocol_version;
pub mod transaction;
pub mod witness;

mod rlp;
