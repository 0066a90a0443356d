//! Flat string-keyed task payloads.
//!
//! Task inputs and outputs travel as flat string maps at the channel
//! boundary. Handlers declare the fields they expect through [`Payload::require`]
//! and [`Payload::require_parsed`] and fail fast on missing or malformed
//! fields instead of casting implicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload key under which every task carries the saga's business key.
///
/// Handlers key their local side effects on this field so redelivered
/// tasks stay idempotent.
pub const BUSINESS_KEY: &str = "businessKey";

/// Errors raised when a handler reads a payload field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field is present but cannot be parsed into the expected type.
    #[error("malformed field '{field}': cannot parse '{value}' as {expected}")]
    MalformedField {
        field: String,
        value: String,
        expected: &'static str,
    },
}

/// A flat string-keyed data mapping carried by tasks and task results.
///
/// No nested schema is enforced at this layer; domain fields such as
/// `productCodes`, `amount`, or `accountId` are interpreted by handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a payload from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns the value for a field, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns the value for a required field, or a `MissingField` error.
    pub fn require(&self, field: &str) -> Result<&str, PayloadError> {
        self.get(field)
            .ok_or_else(|| PayloadError::MissingField(field.to_string()))
    }

    /// Returns a required field parsed into `T`, failing fast on absence
    /// or parse errors.
    pub fn require_parsed<T: std::str::FromStr>(&self, field: &str) -> Result<T, PayloadError> {
        let value = self.require(field)?;
        value
            .parse()
            .map_err(|_| PayloadError::MalformedField {
                field: field.to_string(),
                value: value.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    /// Merges all fields of `other` into this payload; fields in `other`
    /// win on collision.
    pub fn merge(&mut self, other: &Payload) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns true if the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
