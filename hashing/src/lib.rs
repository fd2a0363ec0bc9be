use alloy_rlp::{BufMut as _, Encodable};
use ethereum_types::H256;
use hex_literal::hex;
use tiny_keccak::{Hasher as _, Keccak};

/// Keccak-256 of the empty string.
pub const KECCAK_EMPTY: H256 = H256(hex!(
    "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
));

/// Root of an empty Merkle-Patricia trie, i.e. Keccak-256 of `rlp("")`.
pub const EMPTY_ROOT_HASH: H256 = H256(hex!(
    "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
));

/// Keccak-256 of `rlp([])`. Post-merge headers always carry it in place of uncles.
pub const EMPTY_OMMERS_HASH: H256 = H256(hex!(
    "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
));

// Nodes whose encoding is shorter than a hash are embedded in their parent.
const MAX_INLINE_NODE_LENGTH: usize = 31;

#[inline]
#[must_use]
pub fn keccak256(bytes: impl AsRef<[u8]>) -> H256 {
    let mut hasher = Keccak::v256();
    let mut output = H256::zero();
    hasher.update(bytes.as_ref());
    hasher.finalize(output.as_bytes_mut());
    output
}

#[must_use]
pub fn keccak256_concat<'part>(parts: impl IntoIterator<Item = &'part [u8]>) -> H256 {
    let mut hasher = Keccak::v256();
    let mut output = H256::zero();

    for part in parts {
        hasher.update(part);
    }

    hasher.finalize(output.as_bytes_mut());
    output
}

#[must_use]
pub fn hash_rlp(value: &impl Encodable) -> H256 {
    keccak256(alloy_rlp::encode(value))
}

/// Computes the root of a Merkle-Patricia trie keyed by `rlp(index)`.
///
/// This is how transaction, receipt, and withdrawal roots are derived from block contents.
/// Items must already be in their consensus encoding.
#[must_use]
pub fn ordered_trie_root<I>(items: I) -> H256
where
    I: IntoIterator<Item: AsRef<[u8]>>,
{
    let items = items.into_iter().collect::<Vec<_>>();

    if items.is_empty() {
        return EMPTY_ROOT_HASH;
    }

    let mut entries = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let key = alloy_rlp::encode(index as u64);
            (to_nibbles(&key), item.as_ref())
        })
        .collect::<Vec<_>>();

    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    keccak256(encode_node(&entries, 0))
}

fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|byte| [byte >> 4, byte & 0x0f])
        .collect()
}

// Hex-prefix encoding from the Yellow Paper, appendix C.
fn hex_prefix(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag = if is_leaf { 2 } else { 0 };
    let is_odd = nibbles.len() % 2 == 1;
    let mut output = Vec::with_capacity(nibbles.len() / 2 + 1);

    let rest = if is_odd {
        output.push(((flag + 1) << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        output.push(flag << 4);
        nibbles
    };

    output.extend(rest.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]));
    output
}

fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length = items.iter().map(Vec::len).sum();
    let mut output = Vec::with_capacity(payload_length + 9);

    alloy_rlp::Header {
        list: true,
        payload_length,
    }
    .encode(&mut output);

    for item in items {
        output.put_slice(item);
    }

    output
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(bytes.len() + 9);
    bytes.encode(&mut output);
    output
}

fn node_reference(encoded_node: Vec<u8>) -> Vec<u8> {
    if encoded_node.len() <= MAX_INLINE_NODE_LENGTH {
        encoded_node
    } else {
        encode_bytes(keccak256(encoded_node).as_bytes())
    }
}

fn common_prefix_length(entries: &[(Vec<u8>, &[u8])], depth: usize) -> usize {
    let (first, _) = &entries[0];
    let (last, _) = &entries[entries.len() - 1];

    // Entries are sorted, so the common prefix of the first and last keys is shared by all.
    first[depth..]
        .iter()
        .zip(&last[depth..])
        .take_while(|(left, right)| left == right)
        .count()
}

fn encode_node(entries: &[(Vec<u8>, &[u8])], depth: usize) -> Vec<u8> {
    if let [(key, value)] = entries {
        return encode_list(&[
            encode_bytes(&hex_prefix(&key[depth..], true)),
            encode_bytes(value),
        ]);
    }

    let prefix_length = common_prefix_length(entries, depth);

    if prefix_length > 0 {
        let (key, _) = &entries[0];
        let child = encode_node(entries, depth + prefix_length);

        return encode_list(&[
            encode_bytes(&hex_prefix(&key[depth..depth + prefix_length], false)),
            node_reference(child),
        ]);
    }

    let mut branch = vec![encode_bytes(&[]); 17];
    let mut remaining = entries;

    if let Some(((key, value), rest)) = remaining.split_first() {
        if key.len() == depth {
            branch[16] = encode_bytes(value);
            remaining = rest;
        }
    }

    for nibble in 0..16 {
        let count = remaining
            .iter()
            .take_while(|(key, _)| key[depth] == nibble)
            .count();

        if count > 0 {
            let (children, rest) = remaining.split_at(count);
            branch[usize::from(nibble)] = node_reference(encode_node(children, depth + 1));
            remaining = rest;
        }
    }

    encode_list(&branch)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn constants_match_their_definitions() {
        assert_eq!(keccak256(b""), KECCAK_EMPTY);
        assert_eq!(keccak256([alloy_rlp::EMPTY_STRING_CODE]), EMPTY_ROOT_HASH);
        assert_eq!(keccak256([alloy_rlp::EMPTY_LIST_CODE]), EMPTY_OMMERS_HASH);
    }

    #[test]
    fn keccak256_concat_matches_keccak256_of_concatenation() {
        assert_eq!(
            keccak256_concat([b"roll".as_slice(), b"up".as_slice()]),
            keccak256(b"rollup"),
        );
    }

    #[test]
    fn ordered_trie_root_of_nothing_is_empty_root() {
        assert_eq!(ordered_trie_root(Vec::<Vec<u8>>::new()), EMPTY_ROOT_HASH);
    }

    #[test]
    fn ordered_trie_root_with_single_short_item_hashes_inline_leaf() {
        // Key `rlp(0) = 0x80` has nibbles [8, 0], so the leaf path is `0x20 0x80`.
        let expected = keccak256([0xc5, 0x82, 0x20, 0x80, 0x81, 0xaa]);
        assert_eq!(ordered_trie_root([[0xaa_u8]]), expected);
    }

    #[test_case(2)]
    #[test_case(17)]
    #[test_case(200)]
    fn ordered_trie_root_depends_on_item_order(count: u8) {
        let items = (0..count).map(|index| vec![index; 40]).collect::<Vec<_>>();
        let mut reversed = items.clone();
        reversed.reverse();

        assert_ne!(ordered_trie_root(&items), ordered_trie_root(&reversed));
        assert_eq!(ordered_trie_root(&items), ordered_trie_root(items.clone()));
    }

    #[test]
    fn hex_prefix_encodes_parity_and_leaf_flag() {
        assert_eq!(hex_prefix(&[1, 2, 3, 4, 5], false), [0x11, 0x23, 0x45]);
        assert_eq!(hex_prefix(&[0, 1, 2, 3, 4, 5], false), [0x00, 0x01, 0x23, 0x45]);
        assert_eq!(hex_prefix(&[0x0f, 1, 0x0c, 0x0b, 8], true), [0x3f, 0x1c, 0xb8]);
        assert_eq!(hex_prefix(&[0, 0x0f, 1, 0x0c, 0x0b, 8], true), [0x20, 0x0f, 0x1c, 0xb8]);
    }
}
