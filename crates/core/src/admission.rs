//! Admission: validate a candidate stream address and persist it.
//!
//! A candidate is admitted when the indexer knows a stream at that address,
//! the stream is denominated in the expected mint and it has not been
//! cancelled. Addresses already in the store are acknowledged without
//! asking the indexer again.

use std::sync::Arc;

use crate::provider::{ProviderError, StreamSource};
use crate::store::{ContractStore, InsertOutcome, StoreError};
use crate::stream::ContractRecord;

/// Mint every admitted stream must be denominated in, unless configured otherwise.
pub const DEFAULT_EXPECTED_MINT: &str = "3XFiHA2gexzBjqtM5Z7FjJhP6f28D2m79UihBCfkpump";

/// Length in bytes of a decoded account address.
const ADDRESS_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no valid stream found")]
    NoValidStream,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Successful admission outcome, carrying the normalised address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(String),
    AlreadyAdmitted(String),
}

impl Admission {
    pub fn address(&self) -> &str {
        match self {
            Admission::Admitted(a) | Admission::AlreadyAdmitted(a) => a,
        }
    }
}

/// Pull the account address out of user input.
///
/// Accepts a bare address or any URL whose last path segment is the address,
/// such as an explorer link. The result must be base58 for 32 bytes.
pub fn extract_address(input: &str) -> Result<String, AdmissionError> {
    let trimmed = input.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    let candidate = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim();

    if candidate.is_empty() {
        return Err(AdmissionError::InvalidAddress(trimmed.to_string()));
    }

    match bs58::decode(candidate).into_vec() {
        Ok(bytes) if bytes.len() == ADDRESS_LEN => Ok(candidate.to_string()),
        _ => Err(AdmissionError::InvalidAddress(candidate.to_string())),
    }
}

pub struct AdmissionService {
    store: Arc<dyn ContractStore>,
    source: Arc<dyn StreamSource>,
    expected_mint: String,
}

impl AdmissionService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        source: Arc<dyn StreamSource>,
        expected_mint: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            expected_mint: expected_mint.into(),
        }
    }

    pub fn expected_mint(&self) -> &str {
        &self.expected_mint
    }

    /// Admit the stream named by `input`.
    ///
    /// Performs at most one indexer lookup and at most one store insert.
    pub async fn admit(&self, input: &str) -> Result<Admission, AdmissionError> {
        let address = extract_address(input)?;

        if self.store.get(&address).await?.is_some() {
            tracing::debug!(address = %address, "Admission: address already stored");
            return Ok(Admission::AlreadyAdmitted(address));
        }

        let Some(stream) = self.source.get_stream(&address).await? else {
            tracing::info!(address = %address, "Admission: no stream at address");
            return Err(AdmissionError::NoValidStream);
        };

        if !stream.has_mint(&self.expected_mint) {
            tracing::info!(
                address = %address,
                mint = stream.mint.as_deref().unwrap_or("<none>"),
                expected = %self.expected_mint,
                "Admission: stream mint does not match"
            );
            return Err(AdmissionError::NoValidStream);
        }

        if stream.is_cancelled() {
            tracing::info!(address = %address, "Admission: stream was cancelled");
            return Err(AdmissionError::NoValidStream);
        }

        let record = ContractRecord::from_stream(&address, &stream);
        match self.store.insert_if_absent(&record).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    address = %address,
                    name = %record.name,
                    "Admission: contract admitted"
                );
                Ok(Admission::Admitted(address))
            }
            InsertOutcome::Duplicate => {
                tracing::debug!(
                    address = %address,
                    "Admission: lost insert race, address already stored"
                );
                Ok(Admission::AlreadyAdmitted(address))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
