//! Stream and contract record types.
//!
//! [`RawStream`] mirrors what the chain indexer returns for a stream account:
//! every field optional and loosely typed, since indexers disagree on whether
//! big numbers travel as JSON numbers or strings. [`ContractRecord`] is the
//! sanitized shape persisted by the store and served by the API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize;

// =============================================================================
// Provider-side stream
// =============================================================================

/// A stream as reported by the chain indexer.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawStream {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub deposited_amount: Option<Value>,
    #[serde(default)]
    pub withdrawn_amount: Option<Value>,
    #[serde(default)]
    pub amount_per_period: Option<Value>,
    #[serde(default)]
    pub cliff_amount: Option<Value>,
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    #[serde(default)]
    pub cliff: Option<Value>,
    #[serde(default)]
    pub period: Option<Value>,
    #[serde(default)]
    pub withdrawal_frequency: Option<Value>,
    #[serde(default)]
    pub last_withdrawn_at: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub cancelable_by_sender: Option<Value>,
    #[serde(default)]
    pub closed: Option<Value>,
    /// Unix seconds at which the stream was cancelled, 0 or absent if live.
    #[serde(default)]
    pub canceled_at: Option<Value>,
}

impl RawStream {
    /// Whether the stream is denominated in `mint`.
    pub fn has_mint(&self, mint: &str) -> bool {
        self.mint.as_deref() == Some(mint)
    }

    /// Whether the cancellation marker is set.
    pub fn is_cancelled(&self) -> bool {
        sanitize::timestamp(self.canceled_at.as_ref()) != 0
    }
}

// =============================================================================
// Persisted record
// =============================================================================

/// One admitted contract, sanitized and keyed by `address`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct ContractRecord {
    pub address: String,
    pub name: String,
    pub deposited_amount: String,
    pub withdrawn_amount: String,
    pub amount_per_period: String,
    pub cliff_amount: String,
    pub start: i64,
    pub end: i64,
    pub cliff: i64,
    pub period: i64,
    pub withdrawal_frequency: i64,
    pub last_withdrawn_at: i64,
    pub created_at: i64,
    pub cancelable_by_sender: bool,
    pub closed: bool,
    /// Unix seconds at which this service first stored the record.
    pub admitted_at: i64,
}

impl ContractRecord {
    /// Sanitize `stream` into a record for `address`.
    ///
    /// `admitted_at` is left at 0; the store stamps it on insert.
    pub fn from_stream(address: &str, stream: &RawStream) -> Self {
        Self {
            address: address.to_string(),
            name: sanitize::name(stream.name.as_ref()),
            deposited_amount: sanitize::amount(stream.deposited_amount.as_ref()),
            withdrawn_amount: sanitize::amount(stream.withdrawn_amount.as_ref()),
            amount_per_period: sanitize::amount(stream.amount_per_period.as_ref()),
            cliff_amount: sanitize::amount(stream.cliff_amount.as_ref()),
            start: sanitize::timestamp(stream.start.as_ref()),
            end: sanitize::timestamp(stream.end.as_ref()),
            cliff: sanitize::timestamp(stream.cliff.as_ref()),
            period: sanitize::timestamp(stream.period.as_ref()),
            withdrawal_frequency: sanitize::timestamp(stream.withdrawal_frequency.as_ref()),
            last_withdrawn_at: sanitize::timestamp(stream.last_withdrawn_at.as_ref()),
            created_at: sanitize::timestamp(stream.created_at.as_ref()),
            cancelable_by_sender: sanitize::flag(stream.cancelable_by_sender.as_ref()),
            closed: sanitize::flag(stream.closed.as_ref()),
            admitted_at: 0,
        }
    }
}

impl From<&ContractRecord> for RawStream {
    fn from(record: &ContractRecord) -> Self {
        Self {
            name: Some(Value::from(record.name.clone())),
            mint: None,
            deposited_amount: Some(Value::from(record.deposited_amount.clone())),
            withdrawn_amount: Some(Value::from(record.withdrawn_amount.clone())),
            amount_per_period: Some(Value::from(record.amount_per_period.clone())),
            cliff_amount: Some(Value::from(record.cliff_amount.clone())),
            start: Some(Value::from(record.start)),
            end: Some(Value::from(record.end)),
            cliff: Some(Value::from(record.cliff)),
            period: Some(Value::from(record.period)),
            withdrawal_frequency: Some(Value::from(record.withdrawal_frequency)),
            last_withdrawn_at: Some(Value::from(record.last_withdrawn_at)),
            created_at: Some(Value::from(record.created_at)),
            cancelable_by_sender: Some(Value::from(record.cancelable_by_sender)),
            closed: Some(Value::from(record.closed)),
            canceled_at: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
