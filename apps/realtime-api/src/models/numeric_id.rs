use serde::Deserialize;

/// A numeric identifier as sent by browser clients and token issuers, which
/// may encode it either as a JSON number or as a decimal string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumericId {
    Number(i64),
    Text(String),
}

impl NumericId {
    /// The parsed value, or `None` if the string form is not an integer.
    pub fn value(&self) -> Option<i64> {
        match self {
            NumericId::Number(n) => Some(*n),
            NumericId::Text(s) => s.trim().parse().ok(),
        }
    }
}
