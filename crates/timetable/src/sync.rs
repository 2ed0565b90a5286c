//! One fetch-parse-save run of the ingestion pipeline.
//!
//! Steps, in order:
//! 1. Download the spreadsheet
//! 2. Fingerprint it and stop early if it matches the active snapshot
//! 3. Parse it on the blocking pool
//! 4. Save it, which diffs against the previous snapshot
//! 5. Summarise the changes and notify
//!
//! The timeout bounds steps 1-3 only. Once a save starts it runs to
//! completion, and a committed snapshot is always reported and notified.
//! A failed or timed-out run leaves the active snapshot untouched and is
//! reported as `stale` when cached data exists.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::db::{ScheduleStore, StoreError};
use crate::fingerprint::fingerprint;
use crate::model::ParsedSchedule;
use crate::notify::{NotificationSink, SCHEDULE_UPDATE};
use crate::parser::{parse_workbook, ParseError, ParseOptions, ParseStats, SheetLayout};
use crate::report::ChangeSummary;
use crate::source::{FetchError, ScheduleSource};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Sync timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {message}")]
    Task { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// A new snapshot was saved
    Updated,
    /// The file matched the active snapshot; nothing was saved
    Unchanged,
    /// The run failed and the cached snapshot is still served
    Stale,
    /// The run failed and there is nothing cached
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncStatus,
    pub correlation_id: String,
    /// Snapshot served after the run
    pub schedule_id: Option<i64>,
    pub file_hash: Option<String>,
    pub summary: Option<ChangeSummary>,
    pub stats: Option<ParseStats>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    /// Whether readers are being served data older than the last attempt.
    pub fn is_stale(&self) -> bool {
        matches!(self.status, SyncStatus::Stale | SyncStatus::Failed)
    }
}

/// Where a run stands once fetching and parsing are over.
enum Prepared {
    /// The fingerprint matched; nothing to save
    Unchanged(RunOutcome),
    Parsed {
        schedule: ParsedSchedule,
        stats: ParseStats,
    },
}

/// Result of the pipeline before timing and fallback are applied.
struct RunOutcome {
    status: SyncStatus,
    schedule_id: Option<i64>,
    file_hash: String,
    summary: Option<ChangeSummary>,
    stats: Option<ParseStats>,
}

pub struct ScheduleSync {
    store: Arc<ScheduleStore>,
    source: Arc<dyn ScheduleSource>,
    sink: Arc<dyn NotificationSink>,
    layout: SheetLayout,
    default_filter: Option<String>,
    timeout: Duration,
    notify_on_change: bool,
    /// Per-filter locks so overlapping runs for the same file don't interleave
    locks: DashMap<String, Arc<Mutex<()>>>,
    last_report: RwLock<Option<SyncReport>>,
}

impl ScheduleSync {
    pub fn new(
        store: Arc<ScheduleStore>,
        source: Arc<dyn ScheduleSource>,
        sink: Arc<dyn NotificationSink>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            layout: config.layout.clone(),
            default_filter: config.source.filter.clone(),
            timeout: Duration::from_secs(config.sync.timeout_secs),
            notify_on_change: config.sync.notify_on_change,
            locks: DashMap::new(),
            last_report: RwLock::new(None),
        }
    }

    /// Report of the most recent finished run.
    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    /// Runs the pipeline with the configured filter. `force` re-parses and
    /// saves even when the fingerprint is unchanged.
    pub async fn run(&self, force: bool) -> SyncReport {
        let filter = self.default_filter.clone();
        self.run_with_filter(filter.as_deref(), force).await
    }

    pub async fn run_with_filter(&self, filter: Option<&str>, force: bool) -> SyncReport {
        let correlation_id = generate_correlation_id();
        let lock = self.filter_lock(filter);
        let _guard = lock.lock().await;

        let start = Instant::now();
        info!(
            correlation_id = %correlation_id,
            filter = ?filter,
            force,
            "Starting schedule sync"
        );

        let prepared = match tokio::time::timeout(self.timeout, self.prepare(filter, force, &correlation_id)).await {
            Ok(prepared) => prepared,
            Err(_) => Err(SyncError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        };
        let result = match prepared {
            Ok(Prepared::Unchanged(outcome)) => Ok(outcome),
            Ok(Prepared::Parsed { schedule, stats }) => {
                self.commit(schedule, stats, &correlation_id).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let report = match result {
            Ok(outcome) => {
                info!(
                    correlation_id = %correlation_id,
                    status = ?outcome.status,
                    schedule_id = ?outcome.schedule_id,
                    duration_ms,
                    "Schedule sync finished"
                );
                SyncReport {
                    status: outcome.status,
                    correlation_id,
                    schedule_id: outcome.schedule_id,
                    file_hash: Some(outcome.file_hash),
                    summary: outcome.summary,
                    stats: outcome.stats,
                    error: None,
                    duration_ms,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => self.fallback(e, correlation_id, duration_ms).await,
        };

        *self.last_report.write().await = Some(report.clone());
        report
    }

    fn filter_lock(&self, filter: Option<&str>) -> Arc<Mutex<()>> {
        let key = filter.unwrap_or_default().trim().to_lowercase();
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch, fingerprint and parse. Nothing here writes to the store.
    async fn prepare(
        &self,
        filter: Option<&str>,
        force: bool,
        correlation_id: &str,
    ) -> Result<Prepared, SyncError> {
        let raw = self.source.fetch(filter).await?;
        let file_hash = fingerprint(&raw.buffer);
        info!(
            correlation_id = %correlation_id,
            file = %raw.filename,
            bytes = raw.buffer.len(),
            file_hash = %file_hash,
            "Fetched schedule file"
        );

        let store = self.store.clone();
        let (latest_hash, active_id) =
            blocking(move || Ok((store.latest_hash()?, store.active_id()?))).await?;
        if !force && latest_hash.as_deref() == Some(file_hash.as_str()) {
            info!(
                correlation_id = %correlation_id,
                schedule_id = ?active_id,
                "Schedule file unchanged, keeping active snapshot"
            );
            return Ok(Prepared::Unchanged(RunOutcome {
                status: SyncStatus::Unchanged,
                schedule_id: active_id,
                file_hash,
                summary: None,
                stats: None,
            }));
        }

        let store = self.store.clone();
        let layout = self.layout.clone();
        let buffer = raw.buffer;
        let parse_start = Instant::now();
        let outcome = blocking(move || {
            let directory = store.directory_index()?;
            let options = ParseOptions {
                layout: &layout,
                directory: Some(&directory),
            };
            Ok(parse_workbook(&buffer, options)?)
        })
        .await?;
        info!(
            correlation_id = %correlation_id,
            sections = outcome.sections.len(),
            entries = outcome.stats.total_entries,
            duplicate_keys = outcome.stats.duplicate_keys,
            duration_ms = parse_start.elapsed().as_millis() as u64,
            "Parsed schedule"
        );

        let schedule = ParsedSchedule {
            sections: outcome.sections,
            last_updated: Utc::now(),
            file_hash,
            file_name: Some(raw.filename),
        };
        Ok(Prepared::Parsed {
            schedule,
            stats: outcome.stats,
        })
    }

    /// Saves the parsed snapshot and notifies about its changes. Not subject
    /// to the run timeout.
    async fn commit(
        &self,
        schedule: ParsedSchedule,
        stats: ParseStats,
        correlation_id: &str,
    ) -> Result<RunOutcome, SyncError> {
        let file_hash = schedule.file_hash.clone();
        let store = self.store.clone();
        let saved = blocking(move || Ok(store.save(&schedule)?)).await?;
        info!(
            correlation_id = %correlation_id,
            schedule_id = saved.schedule_id,
            changes = saved.changes.len(),
            "Saved schedule snapshot"
        );

        let summary = ChangeSummary::from_changes(saved.schedule_id, &saved.changes, false);
        if self.notify_on_change && saved.previous_id.is_some() && summary.has_changes() {
            let sink = self.sink.clone();
            let message = summary.notification_message();
            // The sink logs its own delivery failures
            let delivered = blocking(move || {
                sink.notify(SCHEDULE_UPDATE, "Schedule updated", &message);
                Ok(())
            })
            .await;
            if let Err(e) = delivered {
                warn!(
                    correlation_id = %correlation_id,
                    schedule_id = saved.schedule_id,
                    error = %e,
                    "Notification task failed"
                );
            }
        }

        Ok(RunOutcome {
            status: SyncStatus::Updated,
            schedule_id: Some(saved.schedule_id),
            file_hash,
            summary: Some(summary),
            stats: Some(stats),
        })
    }

    /// Builds the report for a failed run, pointing at cached data if any.
    async fn fallback(&self, err: SyncError, correlation_id: String, duration_ms: u64) -> SyncReport {
        let store = self.store.clone();
        let cached = blocking(move || Ok((store.active_id()?, store.latest_hash()?)))
            .await
            .unwrap_or_else(|e| {
                warn!(correlation_id = %correlation_id, error = %e, "Could not read cached snapshot");
                (None, None)
            });

        let (status, message) = match cached.0 {
            Some(_) => (SyncStatus::Stale, err.to_string()),
            None => (SyncStatus::Failed, format!("no data available: {}", err)),
        };
        error!(
            correlation_id = %correlation_id,
            status = ?status,
            duration_ms,
            error = %err,
            "Schedule sync failed"
        );

        SyncReport {
            status,
            correlation_id,
            schedule_id: cached.0,
            file_hash: cached.1,
            summary: None,
            stats: None,
            error: Some(message),
            duration_ms,
            finished_at: Utc::now(),
        }
    }
}

/// Runs store or parser work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Task {
            message: e.to_string(),
        })?
}

/// Generates a short correlation ID for log tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
