use alloy_rlp::Encodable as _;
use anyhow::{anyhow, ensure, Result};
use types::{
    execution::{Block, Header, Withdrawal},
    primitives::{Bloom, Bytes, Gas, Wei, H256},
    transaction::{Transaction, LEGACY_TX_TYPE},
    witness::ExecutionWitness,
};

use crate::{BlockEnv, BlockExecutor, ExecutionOutcome, ExecutionSession, StatelessOutcome};

pub const BLOB_GAS_PER_BLOB: Gas = 1 << 17;
pub const MAX_BLOB_GAS_PER_BLOCK: Gas = 6 * BLOB_GAS_PER_BLOB;

const TRANSACTION_BASE_GAS: Gas = 21_000;
const GAS_PER_DATA_BYTE: Gas = 16;

#[derive(Clone, Copy, Default, Debug)]
pub struct DevExecutor;

impl BlockExecutor for DevExecutor {
    fn begin(&self, parent: &Header, env: BlockEnv) -> Result<Box<dyn ExecutionSession>> {
        ensure!(
            env.number == parent.number + 1,
            "block number {} does not follow parent {}",
            env.number,
            parent.number,
        );

        Ok(Box::new(DevSession::new(parent.clone(), env)))
    }

    fn execute_stateless(
        &self,
        block: &Block,
        witness: &ExecutionWitness,
    ) -> Result<StatelessOutcome> {
        let parent = witness
            .headers
            .iter()
            .find(|header| header.hash() == block.parent_hash())
            .ok_or_else(|| anyhow!("missing parent header {:?} in witness", block.parent_hash()))?;

        ensure!(
            witness
                .state
                .iter()
                .any(|node| node.as_ref() == parent.state_root.as_bytes()),
            "missing state node for root {:?} in witness",
            parent.state_root,
        );

        let mut session = self.begin(parent, BlockEnv::from_header(block.header()))?;

        for transaction in block.transactions() {
            session.apply(transaction)?;
        }

        let outcome = session.finish(block.withdrawals().unwrap_or_default(), false)?;

        Ok(StatelessOutcome {
            state_root: outcome.state_root,
            receipts_root: outcome.receipts_root,
        })
    }
}

struct DevSession {
    parent: Header,
    env: BlockEnv,
    gas_used: Gas,
    blob_gas_used: Gas,
    fees: Wei,
    transaction_hashes: Vec<H256>,
    receipts: Vec<Vec<u8>>,
}

impl DevSession {
    const fn new(parent: Header, env: BlockEnv) -> Self {
        Self {
            parent,
            env,
            gas_used: 0,
            blob_gas_used: 0,
            fees: Wei::zero(),
            transaction_hashes: vec![],
            receipts: vec![],
        }
    }

    fn receipt(transaction: &Transaction, cumulative_gas_used: Gas) -> Vec<u8> {
        let mut payload = vec![];
        1_u8.encode(&mut payload);
        cumulative_gas_used.encode(&mut payload);

        let mut receipt = vec![];

        if transaction.tx_type() != LEGACY_TX_TYPE {
            receipt.push(transaction.tx_type());
        }

        alloy_rlp::Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut receipt);

        receipt.extend(payload);
        receipt
    }
}

impl ExecutionSession for DevSession {
    fn apply(&mut self, transaction: &Transaction) -> Result<Gas> {
        let gas = TRANSACTION_BASE_GAS + GAS_PER_DATA_BYTE * transaction.as_bytes().len() as u64;

        ensure!(
            self.gas_used + gas <= self.env.gas_limit,
            "gas limit reached (used: {}, transaction: {gas}, limit: {})",
            self.gas_used,
            self.env.gas_limit,
        );

        let blob_count = transaction.blob_versioned_hashes()?.len() as u64;
        let blob_gas = BLOB_GAS_PER_BLOB * blob_count;

        ensure!(
            self.blob_gas_used + blob_gas <= MAX_BLOB_GAS_PER_BLOCK,
            "max data blobs reached",
        );

        self.gas_used += gas;
        self.blob_gas_used += blob_gas;

        if !transaction.is_deposit() {
            self.fees += Wei::from(gas);
        }

        self.transaction_hashes.push(transaction.hash());
        self.receipts
            .push(Self::receipt(transaction, self.gas_used));

        Ok(gas)
    }

    fn gas_used(&self) -> Gas {
        self.gas_used
    }

    fn blob_gas_used(&self) -> Gas {
        self.blob_gas_used
    }

    fn finish(
        self: Box<Self>,
        withdrawals: &[Withdrawal],
        want_witness: bool,
    ) -> Result<ExecutionOutcome> {
        let encoded_withdrawals = withdrawals
            .iter()
            .map(alloy_rlp::encode)
            .collect::<Vec<_>>();

        let gas_used = self.gas_used.to_be_bytes();

        let state_root = hashing::keccak256_concat(
            [
                self.parent.state_root.as_bytes(),
                self.env.fee_recipient.as_bytes(),
                gas_used.as_slice(),
            ]
            .into_iter()
            .chain(self.transaction_hashes.iter().map(H256::as_bytes))
            .chain(encoded_withdrawals.iter().map(Vec::as_slice)),
        );

        let witness = want_witness.then(|| ExecutionWitness {
            headers: vec![self.parent.clone()],
            codes: vec![],
            state: vec![Bytes::copy_from_slice(self.parent.state_root.as_bytes())],
        });

        Ok(ExecutionOutcome {
            state_root,
            receipts_root: hashing::ordered_trie_root(&self.receipts),
            logs_bloom: Bloom::zero(),
            gas_used: self.gas_used,
            blob_gas_used: self.blob_gas_used,
            fees: self.fees,
            witness,
        })
    }
}
