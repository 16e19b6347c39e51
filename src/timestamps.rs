//! Serializes timestamps as Unix epoch seconds.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;

pub fn serialize<S>(time: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(time.unix_timestamp())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = i64::deserialize(deserializer)?;

    Ok(OffsetDateTime::from_unix_timestamp(seconds))
}
