use alloy_rlp::{BufMut, Decodable, Encodable, Error as RlpError};
use bytes::Bytes;

use crate::{execution::Header, rlp};

/// State needed to execute a block without access to the database.
///
/// `headers` are the ancestors read by `BLOCKHASH` (at least the parent),
/// `codes` are the contract bytecodes touched, and `state` holds the trie nodes
/// on every path read or written during execution.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct ExecutionWitness {
    pub headers: Vec<Header>,
    pub codes: Vec<Bytes>,
    pub state: Vec<Bytes>,
}

impl ExecutionWitness {
    #[must_use]
    pub fn parent_header(&self) -> Option<&Header> {
        self.headers.first()
    }

    #[must_use]
    pub fn to_rlp(&self) -> Bytes {
        alloy_rlp::encode(self).into()
    }

    pub fn from_rlp(mut bytes: &[u8]) -> Result<Self, RlpError> {
        let witness = Self::decode(&mut bytes)?;

        if !bytes.is_empty() {
            return Err(RlpError::Custom("witness is followed by trailing bytes"));
        }

        Ok(witness)
    }
}

impl Encodable for ExecutionWitness {
    fn encode(&self, out: &mut dyn BufMut) {
        rlp::encode_list(out, |payload| {
            self.headers.encode(payload);
            self.codes.encode(payload);
            self.state.encode(payload);
        });
    }
}

impl Decodable for ExecutionWitness {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = rlp::decode_list_payload(buf)?;
        let payload = &mut payload;

        let witness = Self {
            headers: Decodable::decode(payload)?,
            codes: Decodable::decode(payload)?,
            state: Decodable::decode(payload)?,
        };

        if !payload.is_empty() {
            return Err(RlpError::UnexpectedLength);
        }

        Ok(witness)
    }
}
