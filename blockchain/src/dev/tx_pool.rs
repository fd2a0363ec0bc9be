use std::collections::HashMap;

use execution_engine::BlobAndProofV1;
use parking_lot::Mutex;
use types::{
    primitives::{VersionedHash, Wei},
    transaction::Transaction,
};

use crate::TxPool;

/// Transaction pool that hands out transactions in insertion order.
///
/// Transactions are not removed when included. Fees are not modeled, so `base_fee` is ignored.
#[derive(Default)]
pub struct DevTxPool {
    transactions: Mutex<Vec<Transaction>>,
    blobs: Mutex<HashMap<VersionedHash, BlobAndProofV1>>,
}

impl DevTxPool {
    pub fn add(&self, transaction: Transaction) {
        self.transactions.lock().push(transaction);
    }

    pub fn add_blob(&self, versioned_hash: VersionedHash, blob_and_proof: BlobAndProofV1) {
        self.blobs.lock().insert(versioned_hash, blob_and_proof);
    }

    pub fn clear(&self) {
        self.transactions.lock().clear();
    }
}

impl TxPool for DevTxPool {
    fn pending(&self, _base_fee: Option<Wei>) -> Vec<Transaction> {
        self.transactions.lock().clone()
    }

    fn blobs(&self, versioned_hashes: &[VersionedHash]) -> Vec<Option<BlobAndProofV1>> {
        let blobs = self.blobs.lock();

        versioned_hashes
            .iter()
            .map(|versioned_hash| blobs.get(versioned_hash).cloned())
            .collect()
    }
}
