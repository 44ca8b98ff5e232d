//! Periodic tombstone maintenance
//!
//! Each tick walks every registered folder. A folder whose top sequence
//! matches the watermark persisted after its last successful collection is
//! skipped; anything else gets a full chunked pass. `run_maintenance_once`
//! ignores the watermark and collects every folder unconditionally.
//!
//! All store access for a folder happens on the blocking pool, one
//! `spawn_blocking` call per folder.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::BackgroundService;
use crate::config::MaintenanceConfig;
use crate::db::{
    Database, FolderDb, MetadataRepository, TypedMetadata, LAST_SUCCESSFUL_GC_SEQ_KEY,
    LAST_SUCCESSFUL_GC_TIME_KEY,
};
use crate::error::{Error, Result};
use crate::gc::TombstoneCollector;
use crate::state::ServiceState;

/// Scheduler driving tombstone collection for one store
pub struct MaintenanceService {
    shared: Arc<Shared>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

struct Shared {
    db: Database,
    config: MaintenanceConfig,
    collector: Arc<TombstoneCollector>,
    active_passes: AtomicUsize,
}

/// Whether a pass may skip folders that have not changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassMode {
    ChangedOnly,
    Forced,
}

impl MaintenanceService {
    /// Build the scheduler for `db`.
    ///
    /// Fails when the store's `gc_fanout` cannot be partitioned.
    pub fn new(db: Database, config: MaintenanceConfig) -> Result<Self> {
        let collector = TombstoneCollector::new(db.options().gc_fanout)?;
        Ok(Self {
            shared: Arc::new(Shared {
                db,
                config,
                collector: Arc::new(collector),
                active_passes: AtomicUsize::new(0),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.shared.config
    }

    /// `Running` while any pass is in flight, background or on demand
    pub fn state(&self) -> ServiceState {
        self.shared.state()
    }

    /// Whether the background loop is currently spawned
    pub fn is_started(&self) -> bool {
        self.task
            .lock()
            .is_ok_and(|task| task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()))
    }

    /// Collect every folder regardless of whether it changed since the last
    /// successful pass.
    ///
    /// Folders are processed in registry order and the first error aborts
    /// the remaining folders.
    pub async fn run_maintenance_once(&self, cancel: &CancellationToken) -> Result<()> {
        self.shared.run_pass(PassMode::Forced, cancel).await
    }

    /// One scheduler tick: collect only folders that changed
    pub(crate) async fn periodic(&self, cancel: &CancellationToken) -> Result<()> {
        self.shared.run_pass(PassMode::ChangedOnly, cancel).await
    }

    /// Watermark persisted after the last successful pass over `folder_id`
    pub fn last_successful_gc_seq(&self, folder_id: &str) -> Result<Option<i64>> {
        match self.shared.db.folder(folder_id)? {
            Some(folder) => TypedMetadata::internal(&folder).int64(LAST_SUCCESSFUL_GC_SEQ_KEY),
            None => Ok(None),
        }
    }
}

impl BackgroundService for MaintenanceService {
    fn start(&self) -> Result<()> {
        self.shared.config.validate()?;

        let mut task = self
            .task
            .lock()
            .map_err(|_| Error::Database("maintenance task handle poisoned".into()))?;
        if task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return Err(Error::InvalidInput(
                "maintenance service already started".into(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|error| Error::InvalidInput(format!("no tokio runtime: {error}")))?;
        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let loop_token = token.clone();
        let handle = runtime.spawn(async move { shared.run_loop(loop_token).await });

        tracing::info!(interval = ?self.shared.config.interval, "Started maintenance service");
        *task = Some((token, handle));
        Ok(())
    }

    fn stop(&self) -> Option<JoinHandle<()>> {
        let (token, handle) = self.task.lock().ok()?.take()?;
        token.cancel();
        tracing::info!("Stopping maintenance service");
        Some(handle)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MaintenanceService {
    fn drop(&mut self) {
        drop(self.stop());
    }
}

/// Counts a pass as active for as long as it lives
struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(active: &'a AtomicUsize) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    fn state(&self) -> ServiceState {
        if self.active_passes.load(Ordering::SeqCst) > 0 {
            ServiceState::Running
        } else {
            ServiceState::Idle
        }
    }

    fn folder_pass(&self, mode: PassMode, retention: Duration) -> FolderPass {
        FolderPass {
            collector: Arc::clone(&self.collector),
            retention,
            mode,
            max_skip: self.config.max_skip,
        }
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => match self.run_pass(PassMode::ChangedOnly, &cancel).await {
                    Ok(()) | Err(Error::Cancelled) => {}
                    Err(error) => tracing::warn!(%error, "Periodic maintenance failed"),
                },
            }
        }
    }

    async fn run_pass(&self, mode: PassMode, cancel: &CancellationToken) -> Result<()> {
        let retention = self.db.delete_retention();
        if retention.is_zero() {
            tracing::debug!("Tombstone collection disabled, skipping maintenance");
            return Ok(());
        }

        let _guard = RunningGuard::enter(&self.active_passes);

        let db = self.db.clone();
        let folders = blocking(move || db.list_folders()).await?;

        for folder_id in folders {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let db = self.db.clone();
            let pass = self.folder_pass(mode, retention);
            let cancel = cancel.clone();
            blocking(move || match db.folder(&folder_id)? {
                Some(folder) => pass.run(&folder, Utc::now(), &cancel),
                None => Ok(()),
            })
            .await?;
        }
        Ok(())
    }
}

/// Everything one folder's pass needs, detached from the service
struct FolderPass {
    collector: Arc<TombstoneCollector>,
    retention: Duration,
    mode: PassMode,
    max_skip: Option<Duration>,
}

impl FolderPass {
    fn run(&self, folder: &FolderDb, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<()> {
        if self.mode == PassMode::ChangedOnly && self.is_unchanged(folder, now)? {
            tracing::debug!(folder = folder.folder_id(), "Folder unchanged since last collection");
            return Ok(());
        }

        let outcome = self.collector.collect(folder, self.retention, now, cancel)?;

        if outcome.deleted > 0 {
            folder.tidy()?;
            tracing::info!(
                folder = folder.folder_id(),
                deleted = outcome.deleted,
                "Collected expired tombstones"
            );
        }

        let meta = TypedMetadata::internal(folder);
        meta.set_int64(LAST_SUCCESSFUL_GC_SEQ_KEY, outcome.high_sequence)?;
        meta.set_int64(LAST_SUCCESSFUL_GC_TIME_KEY, now.timestamp())?;
        Ok(())
    }

    /// Whether `folder` can be skipped: nothing written since the last
    /// successful pass and, when configured, that pass is recent enough
    fn is_unchanged(&self, folder: &FolderDb, now: DateTime<Utc>) -> Result<bool> {
        let meta = TypedMetadata::internal(folder);
        let Some(watermark) = meta.int64(LAST_SUCCESSFUL_GC_SEQ_KEY)? else {
            return Ok(false);
        };
        if watermark != folder.top_sequence()? {
            return Ok(false);
        }

        let Some(max_skip) = self.max_skip else {
            return Ok(true);
        };
        let last_run = meta.int64(LAST_SUCCESSFUL_GC_TIME_KEY)?.unwrap_or(i64::MIN);
        let max_skip = i64::try_from(max_skip.as_secs()).unwrap_or(i64::MAX);
        Ok(now.timestamp().saturating_sub(last_run) < max_skip)
    }
}

/// Run store work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| Error::Database(format!("maintenance task failed: {error}")))?
}
