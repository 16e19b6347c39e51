use serde::{Deserialize, Deserializer};

/// Normalizes user-supplied text (review titles, display names) by
/// stripping surrounding whitespace and decomposing it into Unicode
/// Normalization Form D, so uniqueness checks compare like with like.
///
/// ```
/// use backend::normalization::normalize;
/// assert_eq!(normalize(" hï "), "hï");
/// ```
pub fn normalize(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfd().to_string()
}

/// Deserializes a `String` after running it through `normalize`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(deserializer)?;
    Ok(normalize(s))
}

/// Deserializes an optional `String` after running it through `normalize`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<&str> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize))
}
