//! Drives one aggregation run: fetch, normalize, index, commit.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::index::{IndexCalculator, IndexTable};
use crate::model::{PollutionRecord, SourceId, SourceMeta, Snapshot};
use crate::normalize::{CityTable, Normalizer, RecordCandidate};
use crate::plugin::{SourcePlugin, SourceRegistry};
use crate::ports::{FetchError, FetchErrorKind, RawExtraction};
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// Stage an orchestrator is in.
pub enum RunPhase {
    /// No run in progress.
    Idle,
    /// Sources are being fetched.
    Fetching,
    /// Rows are being mapped onto candidates.
    Normalizing,
    /// Indices are being computed.
    Indexing,
    /// The snapshot is being replaced.
    Committing,
    /// The run produced nothing and the previous snapshot is kept.
    Degraded,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Normalizing => "normalizing",
            RunPhase::Indexing => "indexing",
            RunPhase::Committing => "committing",
            RunPhase::Degraded => "degraded",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
/// Terminal result of a run.
pub enum RunOutcome {
    /// A new snapshot was committed.
    Fresh,
    /// No valid records; the previous snapshot is served as stale.
    StaleFallback,
}

#[derive(Debug, Clone, Serialize)]
/// A source excluded from a run.
pub struct SourceFailure {
    /// Failing source.
    pub source: SourceId,
    /// Failure class.
    pub kind: FetchErrorKind,
    /// Error message.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
/// A row or candidate dropped from a run.
pub struct Rejection {
    /// Provenance of the dropped row.
    pub source_name: String,
    /// City as normalized, empty when the row had none.
    pub city: String,
    /// Why it was dropped.
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
/// Summary of a finished run.
pub struct RunReport {
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Version of the snapshot served after the run.
    pub snapshot_version: u64,
    /// Records committed by this run.
    pub committed: usize,
    /// Sources that produced nothing.
    pub failed_sources: Vec<SourceFailure>,
    /// Rows and candidates left out.
    pub rejected: Vec<Rejection>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that prevent a run from starting.
pub enum RunError {
    /// Another run holds the orchestrator.
    #[error("An aggregation run is already in progress")]
    AlreadyRunning,
}

/// Runs the pipeline against a registry and commits into a snapshot store.
///
/// At most one run executes at a time; sources within a run are fetched
/// concurrently, each under its own deadline.
pub struct AggregationOrchestrator {
    registry: Arc<SourceRegistry>,
    normalizer: Normalizer,
    calculator: IndexCalculator,
    store: Arc<SnapshotStore>,
    fetch_timeout: Duration,
    run_guard: tokio::sync::Mutex<()>,
    phase: Mutex<RunPhase>,
}

impl AggregationOrchestrator {
    /// Create an orchestrator using the built-in city table.
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        table: Arc<IndexTable>,
        store: Arc<SnapshotStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            normalizer: Normalizer::new(CityTable::default(), Arc::clone(&table)),
            calculator: IndexCalculator::new(table),
            store,
            fetch_timeout: config.fetch_timeout,
            run_guard: tokio::sync::Mutex::new(()),
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    /// Replace the city table used for normalization.
    #[must_use]
    pub fn with_city_table(mut self, cities: CityTable) -> Self {
        self.normalizer = Normalizer::new(cities, Arc::clone(self.calculator.table()));
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot store the orchestrator commits into.
    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Execute one full refresh.
    ///
    /// Failing sources and invalid rows are excluded and reported; when no
    /// valid record remains the previous snapshot is kept and marked stale.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::AlreadyRunning`] if another run is in flight.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("refresh requested while a run is in progress");
            return Err(RunError::AlreadyRunning);
        };

        info!(sources = self.registry.len(), "starting aggregation run");

        self.set_phase(RunPhase::Fetching);
        let (extractions, failed_sources) = self.fetch_all().await;

        self.set_phase(RunPhase::Normalizing);
        let mut rejected = Vec::new();
        let mut candidates = Vec::new();
        for (meta, extraction) in &extractions {
            let normalized = self.normalizer.normalize(extraction, meta.pollution_type);
            for err in normalized.rejected {
                warn!(source = %meta.id, %err, "dropping row");
                rejected.push(Rejection {
                    source_name: extraction.source_name.clone(),
                    city: String::new(),
                    reason: err.to_string(),
                });
            }
            candidates.extend(normalized.candidates);
        }

        self.set_phase(RunPhase::Indexing);
        let records = self.index_candidates(candidates, &mut rejected);

        self.set_phase(RunPhase::Committing);
        let committed = records.len();
        let (outcome, snapshot) = if records.is_empty() {
            warn!(
                failed_sources = failed_sources.len(),
                rejected = rejected.len(),
                "run produced no valid records"
            );
            (RunOutcome::StaleFallback, self.degrade().await)
        } else {
            let store = Arc::clone(&self.store);
            match spawn_blocking(move || store.commit(records)).await {
                Ok(Ok(snapshot)) => (RunOutcome::Fresh, snapshot),
                Ok(Err(err)) => {
                    warn!(%err, "snapshot commit failed");
                    (RunOutcome::StaleFallback, self.degrade().await)
                }
                Err(err) => {
                    warn!(%err, "snapshot commit task failed");
                    (RunOutcome::StaleFallback, self.degrade().await)
                }
            }
        };
        self.set_phase(RunPhase::Idle);

        let report = RunReport {
            outcome,
            snapshot_version: snapshot.version,
            committed: if outcome == RunOutcome::Fresh { committed } else { 0 },
            failed_sources,
            rejected,
        };
        info!(
            outcome = ?report.outcome,
            version = report.snapshot_version,
            committed = report.committed,
            failed_sources = report.failed_sources.len(),
            rejected = report.rejected.len(),
            "aggregation run finished"
        );
        Ok(report)
    }

    async fn fetch_all(&self) -> (Vec<(SourceMeta, RawExtraction)>, Vec<SourceFailure>) {
        let fetches = self.registry.plugins().map(|plugin| self.fetch_one(plugin));
        let results = join_all(fetches).await;

        let mut extractions = Vec::new();
        let mut failures = Vec::new();
        for (meta, result) in results {
            match result {
                Ok(extraction) => {
                    info!(source = %meta.id, rows = extraction.rows.len(), "fetched source");
                    extractions.push((meta, extraction));
                }
                Err(err) => {
                    warn!(source = %meta.id, kind = %err.kind(), %err, "excluding source from this run");
                    failures.push(SourceFailure {
                        source: meta.id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }
        (extractions, failures)
    }

    async fn fetch_one(&self, plugin: &SourcePlugin) -> (SourceMeta, Result<RawExtraction, FetchError>) {
        let meta = plugin.port.source();
        debug!(source = %meta.id, origin = %meta.origin, "fetching source");
        let result = timeout(self.fetch_timeout, plugin.port.fetch())
            .await
            .unwrap_or(Err(FetchError::Timeout));
        (meta.clone(), result)
    }

    fn index_candidates(
        &self,
        candidates: Vec<RecordCandidate>,
        rejected: &mut Vec<Rejection>,
    ) -> Vec<PollutionRecord> {
        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.calculator.compute_index(&candidate) {
                Ok(composite_index) => records.push(candidate.into_record(composite_index)),
                Err(err) => {
                    warn!(source = %candidate.source_name, city = %candidate.city, %err, "dropping candidate");
                    rejected.push(Rejection {
                        source_name: candidate.source_name,
                        city: candidate.city.0,
                        reason: err.to_string(),
                    });
                }
            }
        }
        records
    }

    async fn degrade(&self) -> Arc<Snapshot> {
        self.set_phase(RunPhase::Degraded);
        let store = Arc::clone(&self.store);
        match spawn_blocking(move || store.mark_stale_fallback()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "stale-fallback task failed");
                self.store.current()
            }
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        debug!(%phase, "run phase");
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}
