use core::fmt::{Display, LowerHex};

use num_traits::Num;
use serde::{Deserialize as _, Deserializer, Serialize as _, Serializer};

#[derive(serde::Deserialize, serde::Serialize)]
#[serde(bound(
    deserialize = "T: Num<FromStrRadixErr: Display>",
    serialize = "T: LowerHex + Copy",
))]
struct Wrapper<T>(#[serde(with = "crate::prefixed_hex_quantity")] T);

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Num<FromStrRadixErr: Display>,
    D: Deserializer<'de>,
{
    let wrapper = Option::<Wrapper<T>>::deserialize(deserializer)?;
    Ok(wrapper.map(|Wrapper(number)| number))
}

pub fn serialize<T: LowerHex + Copy, S: Serializer>(
    number: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    number.map(Wrapper).serialize(serializer)
}
