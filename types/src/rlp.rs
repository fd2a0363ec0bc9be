use alloy_rlp::{BufMut, Decodable as _, Encodable as _, Error, Header};
use bytes::Bytes;
use ethereum_types::U256;

pub fn encode_list(out: &mut dyn BufMut, encode_fields: impl FnOnce(&mut Vec<u8>)) {
    let mut payload = Vec::new();

    encode_fields(&mut payload);

    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(out);

    out.put_slice(&payload);
}

pub fn decode_list_payload<'buffer>(buf: &mut &'buffer [u8]) -> Result<&'buffer [u8], Error> {
    let header = Header::decode(buf)?;

    if !header.list {
        return Err(Error::UnexpectedString);
    }

    if buf.len() < header.payload_length {
        return Err(Error::InputTooShort);
    }

    let (payload, rest) = buf.split_at(header.payload_length);
    *buf = rest;

    Ok(payload)
}

pub fn encode_u256(value: U256, out: &mut dyn BufMut) {
    let mut bytes = [0; 32];
    value.to_big_endian(&mut bytes);

    let leading_zeros = bytes.iter().take_while(|byte| **byte == 0).count();

    bytes[leading_zeros..].encode(out);
}

pub fn decode_u256(buf: &mut &[u8]) -> Result<U256, Error> {
    let bytes = Bytes::decode(buf)?;

    if bytes.len() > 32 {
        return Err(Error::Overflow);
    }

    if bytes.first() == Some(&0) {
        return Err(Error::LeadingZero);
    }

    Ok(U256::from_big_endian(&bytes))
}
