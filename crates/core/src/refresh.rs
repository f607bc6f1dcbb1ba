//! Refresh: re-synchronise every stored contract with the indexer.
//!
//! Lookups fan out with bounded concurrency. A failing address is recorded
//! in the [`RefreshReport`] and does not stop the others; only failing to
//! list the store aborts a run. Updates already written are kept.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;

use crate::provider::StreamSource;
use crate::store::{ContractStore, StoreError};
use crate::stream::ContractRecord;

/// Lookups in flight at once during a refresh.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Stored contracts considered.
    pub total: usize,
    pub updated: usize,
    /// Addresses the indexer no longer knows; their records are left as is.
    pub missing: Vec<String>,
    pub failed: Vec<RefreshFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshFailure {
    pub address: String,
    pub reason: String,
}

enum Outcome {
    Updated,
    Missing,
    Failed(String),
}

pub struct RefreshService {
    store: Arc<dyn ContractStore>,
    source: Arc<dyn StreamSource>,
    concurrency: usize,
}

impl RefreshService {
    /// `concurrency` is clamped to at least 1; 1 refreshes strictly in order.
    pub fn new(
        store: Arc<dyn ContractStore>,
        source: Arc<dyn StreamSource>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn refresh_all(&self) -> Result<RefreshReport, RefreshError> {
        let addresses: Vec<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|record| record.address)
            .collect();

        tracing::info!(
            contracts = addresses.len(),
            concurrency = self.concurrency,
            "Refresh: started"
        );

        let mut report = RefreshReport {
            total: addresses.len(),
            ..Default::default()
        };

        let mut outcomes = futures::stream::iter(addresses)
            .map(|address| async move {
                let outcome = self.refresh_one(&address).await;
                (address, outcome)
            })
            .buffer_unordered(self.concurrency);

        while let Some((address, outcome)) = outcomes.next().await {
            match outcome {
                Outcome::Updated => report.updated += 1,
                Outcome::Missing => report.missing.push(address),
                Outcome::Failed(reason) => report.failed.push(RefreshFailure { address, reason }),
            }
        }

        report.missing.sort();
        report.failed.sort_by(|a, b| a.address.cmp(&b.address));

        tracing::info!(
            total = report.total,
            updated = report.updated,
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Refresh: finished"
        );
        Ok(report)
    }

    async fn refresh_one(&self, address: &str) -> Outcome {
        let stream = match self.source.get_stream(address).await {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                tracing::debug!(address, "Refresh: indexer has no stream, keeping record");
                return Outcome::Missing;
            }
            Err(e) => {
                tracing::warn!(address, error = %e, "Refresh: indexer lookup failed");
                return Outcome::Failed(e.to_string());
            }
        };

        let record = ContractRecord::from_stream(address, &stream);
        match self.store.update(&record).await {
            Ok(()) => Outcome::Updated,
            Err(e) => {
                tracing::warn!(address, error = %e, "Refresh: store update failed");
                Outcome::Failed(e.to_string())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
