//! Interfaces to the parts of an execution client that the Engine API drives but does not own.
//!
//! Block execution, chain storage, peer-to-peer sync, and the transaction pool are consumed
//! through the traits in this crate. [`dev`] provides an in-memory implementation of all of
//! them that is good enough to run a development chain and to test the Engine API.

pub use crate::{
    collaborators::{
        BadBlockMessage, BlockEnv, BlockExecutor, Blockchain, Downloader, ExecutionOutcome,
        ExecutionSession, SetCanonicalError, StatelessOutcome, TxPool,
    },
    sync_mode::SyncMode,
};

pub mod dev;

mod collaborators;
mod sync_mode;
