use serde::{Deserialize as _, Deserializer, Serialize as _, Serializer};

#[derive(serde::Deserialize, serde::Serialize)]
#[serde(bound(deserialize = "T: From<Vec<u8>>", serialize = "T: AsRef<[u8]>"))]
struct Wrapper<T>(#[serde(with = "crate::prefixed_hex_or_bytes_vec")] T);

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: From<Vec<u8>>,
    D: Deserializer<'de>,
{
    let wrapper = Option::<Wrapper<T>>::deserialize(deserializer)?;
    Ok(wrapper.map(|Wrapper(bytes)| bytes))
}

pub fn serialize<T: AsRef<[u8]>, S: Serializer>(
    bytes: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    bytes.as_ref().map(Wrapper).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Result};

    #[derive(serde::Deserialize, serde::Serialize, PartialEq, Eq, Debug)]
    struct Container {
        #[serde(default, with = "crate::prefixed_hex_or_bytes_option")]
        witness: Option<Vec<u8>>,
    }

    #[test]
    fn present_absent_and_null_values() -> Result<()> {
        let present = serde_json::from_value::<Container>(json!({ "witness": "0xc0" }))?;
        let null = serde_json::from_value::<Container>(json!({ "witness": null }))?;
        let absent = serde_json::from_value::<Container>(json!({}))?;

        assert_eq!(present.witness, Some(vec![0xc0]));
        assert_eq!(null.witness, None);
        assert_eq!(absent.witness, None);
        assert_eq!(serde_json::to_value(&present)?, json!({ "witness": "0xc0" }));

        Ok(())
    }
}
