// Used for lists of opaque byte strings such as execution requests.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(bound = "T: From<Vec<u8>>")]
struct Owned<T>(#[serde(with = "crate::prefixed_hex_or_bytes_vec")] T);

struct Borrowed<'item, T>(&'item T);

impl<T: AsRef<[u8]>> Serialize for Borrowed<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::prefixed_hex_or_bytes_vec::serialize(self.0, serializer)
    }
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: From<Vec<u8>>,
    D: Deserializer<'de>,
{
    let items = Vec::<Owned<T>>::deserialize(deserializer)?;
    Ok(items.into_iter().map(|Owned(item)| item).collect())
}

pub fn serialize<T, S>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.collect_seq(items.iter().map(Borrowed))
}
