use getrandom::getrandom;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RUN_SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

/// Identifier of the reservation that owns one infrastructure unit.
///
/// Used as a path segment by the file-backed stores, so it is restricted to
/// ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        validate_identifier_value("reservation id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ReservationId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<'de> Deserialize<'de> for ReservationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .map_err(|err| D::Error::custom(format!("invalid reservation id `{raw}`: {err}")))
    }
}

/// Compact run identifier: `run-<base36 timestamp>-<4 random base36 chars>`.
pub fn generate_run_id(now: i64) -> Result<String, String> {
    let timestamp =
        u64::try_from(now).map_err(|_| "run id requires a non-negative timestamp".to_string())?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes).map_err(|err| format!("failed to generate run id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % RUN_SUFFIX_SPACE;
    Ok(format!(
        "run-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, 4)
    ))
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}
