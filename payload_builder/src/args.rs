use execution_engine::{PayloadId, PayloadVersion};
use types::{
    execution::Withdrawal,
    primitives::{
        Bytes, ExecutionAddress, ExecutionBlockHash, Gas, UnixSeconds, H256, H64,
    },
    transaction::Transaction,
};

/// Everything a payload build depends on. Identical arguments produce identical payload IDs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BuildPayloadArgs {
    pub parent: ExecutionBlockHash,
    pub timestamp: UnixSeconds,
    pub fee_recipient: ExecutionAddress,
    pub random: H256,
    pub withdrawals: Option<Vec<Withdrawal>>,
    pub beacon_root: Option<H256>,
    pub version: PayloadVersion,
    pub no_tx_pool: bool,
    pub transactions: Vec<Transaction>,
    pub gas_limit: Option<Gas>,
    pub eip1559_params: Option<Bytes>,
}

impl BuildPayloadArgs {
    #[must_use]
    pub fn id(&self) -> PayloadId {
        let timestamp = self.timestamp.to_be_bytes();
        let withdrawals = self.withdrawals.as_ref().map(alloy_rlp::encode);
        let no_tx_pool = [u8::from(self.no_tx_pool)];
        let transaction_count = (self.transactions.len() as u64).to_be_bytes();
        let transaction_hashes = self
            .transactions
            .iter()
            .map(Transaction::hash)
            .collect::<Vec<_>>();
        let gas_limit = self.gas_limit.map(u64::to_be_bytes);

        let parts = [
            self.parent.as_bytes(),
            timestamp.as_slice(),
            self.random.as_bytes(),
            self.fee_recipient.as_bytes(),
        ]
        .into_iter()
        .chain(withdrawals.as_deref())
        .chain(self.beacon_root.as_ref().map(H256::as_bytes))
        .chain([no_tx_pool.as_slice(), transaction_count.as_slice()])
        .chain(transaction_hashes.iter().map(H256::as_bytes))
        .chain(gas_limit.as_ref().map(<[u8; 8]>::as_slice))
        .chain(self.eip1559_params.as_deref());

        let hash = hashing::keccak256_concat(parts);

        let mut id = H64::from_slice(&hash[..H64::len_bytes()]);
        id.0[0] = self.version.as_byte();

        PayloadId(id)
    }
}
