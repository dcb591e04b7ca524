//! Deserialization helpers for hand-written experiment configs, where ports
//! and option values show up both as JSON strings and as numbers.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

pub fn port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: String = Scalar::deserialize(deserializer)?.into();
    raw.trim()
        .parse()
        .map_err(|_| D::Error::custom(format!("invalid port: {raw:?}")))
}

pub fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

/// Ordered `[["key", value], ...]` pairs; `null` reads as an empty list.
pub fn pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let pairs = Option::<Vec<(String, Scalar)>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(pairs
        .into_iter()
        .map(|(key, value)| (key, value.into()))
        .collect())
}

fn duration_from_secs<E: Error>(secs: f64) -> Result<Duration, E> {
    Duration::try_from_secs_f64(secs).map_err(|_| E::custom(format!("invalid duration: {secs}s")))
}

/// Non-negative seconds, fractions allowed.
pub fn seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    duration_from_secs(f64::deserialize(deserializer)?)
}

pub fn optional_seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(duration_from_secs)
        .transpose()
}
