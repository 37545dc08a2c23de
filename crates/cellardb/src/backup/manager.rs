//! The backup scheduler.
//!
//! A [`BackupManager`] writes full and delta backups of one [`Database`]
//! into a directory, on a timer, on demand, or when told that data changed.
//!
//! ```text
//! ┌──────────┐ notify_change ┌──────────────┐  capture (read lock, per table)
//! │  Tables  │──────────────▶│ BackupManager│─────────────────────────────┐
//! └──────────┘               │  scheduler   │                             ▼
//!                            └──────┬───────┘        temp file ─▶ fsync ─▶ rename
//!                                   │ acknowledge dirty keys once renamed
//!                                   ▼
//!                         backup-<micros>-<full|delta>.<ext>
//! ```
//!
//! # Backup policy
//!
//! 1. The first backup of a manager is always full
//! 2. With `incremental` off, every backup is full
//! 3. After `max_deltas_before_full` deltas the next backup is full
//! 4. Otherwise a delta holds every key changed since the previous backup
//! 5. A delta with nothing in it writes no file
//!
//! Failures never escape the scheduler thread: they are logged, counted in
//! [`BackupManager::consecutive_failures`] and passed to the failure
//! callback. The dirty state they would have cleared is kept for the next
//! attempt.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use cellardb_storage::{
    current_timestamp_micros, list_backup_files, BackupFileName, BackupStatistics, SnapshotKind,
    TableHeader,
};
use tracing::{debug, error, info, trace, warn, Span};

use super::error::{BackupError, BackupResult};
use crate::config::BackupConfig;
use crate::database::Database;
use crate::snapshot;
use crate::table::{DeltaCapture, FullCapture};

/// Callback run after a failed backup with the error and the number of
/// consecutive failures so far.
pub type FailureCallback = Arc<dyn Fn(&BackupError, u32) + Send + Sync>;

/// What a successful backup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Full or delta.
    pub kind: SnapshotKind,
    /// The file written, or `None` for a delta with nothing to write.
    pub path: Option<PathBuf>,
    /// The backup timestamp, in microseconds since the Unix epoch.
    pub created_at: u64,
    /// What the file holds.
    pub statistics: BackupStatistics,
}

impl BackupReport {
    /// Returns `true` if a file was written.
    #[must_use]
    pub const fn wrote_file(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Auto,
    Full,
    Delta,
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Full,
    Delta { base: u64 },
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Scheduled,
    Change,
}

#[derive(Debug, Default)]
struct BackupState {
    deltas_since_full: u32,
    consecutive_failures: u32,
    last_attempt: Option<Instant>,
    last_backup_time: Option<SystemTime>,
    /// Timestamp of the full backup new deltas build on.
    last_full: Option<u64>,
    last_stamp: u64,
    /// Table headers as of the previous backup, to notice index changes.
    last_headers: BTreeMap<String, TableHeader>,
}

impl BackupState {
    /// A timestamp later than every one handed out before.
    fn next_stamp(&mut self) -> u64 {
        let stamp = current_timestamp_micros().max(self.last_stamp.saturating_add(1));
        self.last_stamp = stamp;
        stamp
    }
}

#[derive(Debug, Default)]
struct Signal {
    running: bool,
    stop: bool,
    change_pending: bool,
}

struct Inner {
    config: BackupConfig,
    db: Arc<Database>,
    on_failure: Mutex<Option<FailureCallback>>,
    state: Mutex<BackupState>,
    /// Serializes backups; held for a whole capture and write.
    backup_lock: Mutex<()>,
    signal: Mutex<Signal>,
    wake: Condvar,
    span: Span,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn run(&self, request: Request) -> BackupResult<BackupReport> {
        let _serial = lock(&self.backup_lock);
        self.run_locked(request)
    }

    /// Runs a backup unless one was attempted within `min_interval`.
    fn run_debounced(&self) -> Option<BackupResult<BackupReport>> {
        let _serial = lock(&self.backup_lock);
        let last = lock(&self.state).last_attempt;
        if last.is_some_and(|at| at.elapsed() < self.config.min_interval) {
            trace!(parent: &self.span, "change notification debounced");
            return None;
        }
        Some(self.run_locked(Request::Auto))
    }

    fn run_locked(&self, request: Request) -> BackupResult<BackupReport> {
        let (plan, stamp) = {
            let mut state = lock(&self.state);
            let full_due = !self.config.incremental
                || state.deltas_since_full >= self.config.max_deltas_before_full;
            let plan = match (request, state.last_full) {
                (Request::Delta, None) => {
                    warn!(parent: &self.span, "no full backup yet, writing full instead of delta");
                    Plan::Full
                }
                (_, None) | (Request::Full, _) => Plan::Full,
                (Request::Delta, Some(base)) => Plan::Delta { base },
                (Request::Auto, Some(base)) => {
                    if full_due {
                        Plan::Full
                    } else {
                        Plan::Delta { base }
                    }
                }
            };
            (plan, state.next_stamp())
        };

        let started = Instant::now();
        let result = match plan {
            Plan::Full => self.write_full(stamp),
            Plan::Delta { base } => self.write_delta(stamp, base),
        };
        self.record(result, started)
    }

    fn write_full(&self, stamp: u64) -> BackupResult<BackupReport> {
        let dir = &self.config.backup_dir;
        fs::create_dir_all(dir)?;
        let path = BackupFileName::new(stamp, SnapshotKind::Full, self.config.format).path_in(dir);

        let (captures, dropped) = self.db.capture_full();
        let refs: Vec<&FullCapture> = captures.iter().map(|(_, capture)| capture).collect();
        let statistics = snapshot::write_full(&path, self.config.format, stamp, &refs)?;

        for (table, capture) in &captures {
            table.acknowledge(capture.seq);
        }
        self.db.acknowledge_drops(dropped);
        lock(&self.state).last_headers =
            captures.iter().map(|(_, c)| (c.header.name.clone(), c.header.clone())).collect();

        Ok(BackupReport { kind: SnapshotKind::Full, path: Some(path), created_at: stamp, statistics })
    }

    fn write_delta(&self, stamp: u64, base: u64) -> BackupResult<BackupReport> {
        let (captures, dropped) = self.db.capture_delta();
        let headers: BTreeMap<String, TableHeader> =
            captures.iter().map(|(_, c)| (c.header.name.clone(), c.header.clone())).collect();

        // A table dropped and recreated under the same name needs its header
        // even when empty and unchanged, or replaying the drop loses it.
        let changed: Vec<&DeltaCapture> = {
            let state = lock(&self.state);
            captures
                .iter()
                .map(|(_, capture)| capture)
                .filter(|c| {
                    !c.is_empty()
                        || dropped.contains(&c.header.name)
                        || state.last_headers.get(&c.header.name) != Some(&c.header)
                })
                .collect()
        };

        let path = if changed.is_empty() && dropped.is_empty() {
            None
        } else {
            let dir = &self.config.backup_dir;
            fs::create_dir_all(dir)?;
            let name = BackupFileName::new(stamp, SnapshotKind::Delta, self.config.format);
            Some(name.path_in(dir))
        };

        let statistics = match &path {
            Some(path) => {
                snapshot::write_delta(path, self.config.format, stamp, base, &dropped, &changed)?
            }
            None => BackupStatistics::default(),
        };

        for (table, capture) in &captures {
            table.acknowledge(capture.seq);
        }
        self.db.acknowledge_drops(dropped.len());
        lock(&self.state).last_headers = headers;

        Ok(BackupReport { kind: SnapshotKind::Delta, path, created_at: stamp, statistics })
    }

    /// Updates counters, logs the outcome and runs the failure callback.
    fn record(
        &self,
        result: BackupResult<BackupReport>,
        started: Instant,
    ) -> BackupResult<BackupReport> {
        let mut state = lock(&self.state);
        state.last_attempt = Some(Instant::now());

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                let failures = state.consecutive_failures;
                drop(state);
                error!(
                    parent: &self.span,
                    error = %err,
                    consecutive_failures = failures,
                    "backup failed"
                );
                self.report_failure(&err, failures);
                return Err(err);
            }
        };

        state.consecutive_failures = 0;
        state.last_backup_time = Some(SystemTime::now());
        match report.kind {
            SnapshotKind::Full => {
                state.deltas_since_full = 0;
                state.last_full = Some(report.created_at);
            }
            SnapshotKind::Delta if report.wrote_file() => {
                state.deltas_since_full = state.deltas_since_full.saturating_add(1);
            }
            SnapshotKind::Delta => {}
        }
        let deltas_since_full = state.deltas_since_full;
        drop(state);

        match &report.path {
            Some(path) => info!(
                parent: &self.span,
                kind = %report.kind,
                path = %path.display(),
                upserts = report.statistics.upserts,
                deletes = report.statistics.deletes,
                deltas_since_full,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "backup written"
            ),
            None => debug!(parent: &self.span, "no changes since the last backup"),
        }

        if report.kind == SnapshotKind::Full {
            if let Some(keep) = self.config.retain_full_backups {
                if let Err(err) = self.prune(keep) {
                    warn!(parent: &self.span, error = %err, "failed to prune old backups");
                }
            }
        }
        Ok(report)
    }

    fn report_failure(&self, err: &BackupError, failures: u32) {
        let Some(callback) = lock(&self.on_failure).clone() else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(err, failures))).is_err() {
            error!(parent: &self.span, "backup failure callback panicked");
        }
    }

    /// Deletes backups older than the newest `keep` full backups.
    fn prune(&self, keep: usize) -> BackupResult<usize> {
        let files = list_backup_files(&self.config.backup_dir)?;
        let fulls: Vec<u64> = files
            .iter()
            .filter(|(_, name)| name.kind == SnapshotKind::Full)
            .map(|(_, name)| name.stamp)
            .collect();
        let keep = keep.max(1);
        if fulls.len() <= keep {
            return Ok(0);
        }
        let cutoff = fulls[fulls.len() - keep];

        let mut removed = 0;
        for (path, _) in files.iter().filter(|(_, name)| name.stamp < cutoff) {
            fs::remove_file(path)?;
            removed += 1;
        }
        debug!(parent: &self.span, removed, "pruned old backups");
        Ok(removed)
    }

    /// Tells the scheduler to exit. Notifications from here on run on the
    /// caller's thread, so none land on a scheduler that is going away.
    fn request_stop(&self) {
        let mut signal = lock(&self.signal);
        signal.stop = true;
        signal.running = false;
        self.wake.notify_one();
    }

    fn on_change(&self) {
        let mut signal = lock(&self.signal);
        if signal.running {
            signal.change_pending = true;
            self.wake.notify_one();
            return;
        }
        drop(signal);
        // Failures are counted and reported by `record`.
        let _ = self.run_debounced();
    }
}

fn run_scheduler(inner: &Inner) {
    let mut next_due = Instant::now() + inner.config.interval;
    loop {
        let trigger = {
            let mut signal = lock(&inner.signal);
            loop {
                if signal.change_pending {
                    signal.change_pending = false;
                    break Trigger::Change;
                }
                if signal.stop {
                    return;
                }
                let now = Instant::now();
                if now >= next_due {
                    break Trigger::Scheduled;
                }
                signal = inner
                    .wake
                    .wait_timeout(signal, next_due - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        };

        // Failures are counted and reported by `record`.
        match trigger {
            Trigger::Scheduled => {
                let _ = inner.run(Request::Auto);
                next_due = Instant::now() + inner.config.interval;
            }
            Trigger::Change => {
                let _ = inner.run_debounced();
            }
        }
    }
}

/// Writes full and delta backups of a [`Database`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use cellardb::{BackupConfig, BackupManager, Database};
///
/// let db = Arc::new(Database::new());
/// let backups = BackupManager::new(Arc::clone(&db), BackupConfig::new("backups").interval(Duration::from_secs(60)));
/// backups.set_failure_callback(|err, failures| eprintln!("backup failed ({failures}): {err}"));
/// backups.attach();
/// backups.start()?;
///
/// // ... use db ...
///
/// backups.stop();
/// backups.backup_full()?;
/// # Ok::<(), cellardb::BackupError>(())
/// ```
pub struct BackupManager {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackupManager {
    /// Creates a stopped manager for `db`.
    ///
    /// Timestamps continue after the newest backup already in the
    /// directory, so file names never collide with an earlier run.
    pub fn new(db: Arc<Database>, config: BackupConfig) -> Self {
        let span = tracing::info_span!(parent: db.span(), "backup", dir = %config.backup_dir.display());
        let last_stamp = list_backup_files(&config.backup_dir)
            .ok()
            .and_then(|files| files.last().map(|(_, name)| name.stamp))
            .unwrap_or(0);

        Self {
            inner: Arc::new(Inner {
                config,
                db,
                on_failure: Mutex::new(None),
                state: Mutex::new(BackupState { last_stamp, ..BackupState::default() }),
                backup_lock: Mutex::new(()),
                signal: Mutex::new(Signal::default()),
                wake: Condvar::new(),
                span,
            }),
            worker: Mutex::new(None),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.inner.config
    }

    /// Installs the callback run after each failed backup.
    pub fn set_failure_callback(&self, callback: impl Fn(&BackupError, u32) + Send + Sync + 'static) {
        *lock(&self.inner.on_failure) = Some(Arc::new(callback));
    }

    /// Calls [`BackupManager::notify_change`] after every mutation of the
    /// database, replacing the database's change listener.
    pub fn attach(&self) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.db.set_change_listener(move |_| {
            if let Some(inner) = inner.upgrade() {
                inner.on_change();
            }
        });
    }

    /// Removes the database's change listener.
    pub fn detach(&self) {
        self.inner.db.clear_change_listener();
    }

    /// Starts the scheduler thread. Does nothing if it is already running.
    pub fn start(&self) -> BackupResult<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        {
            let mut signal = lock(&self.inner.signal);
            signal.stop = false;
            signal.running = true;
        }
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("cellardb-backup".to_owned())
            .spawn(move || run_scheduler(&inner));
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(err) => {
                lock(&self.inner.signal).running = false;
                return Err(err.into());
            }
        }
        info!(
            parent: &self.inner.span,
            interval_secs = self.inner.config.interval.as_secs(),
            "backup scheduler started"
        );
        Ok(())
    }

    /// Stops the scheduler, letting an in-flight or pending backup finish
    /// first. Does nothing if it is not running.
    pub fn stop(&self) {
        // Held until the join so a concurrent `start` waits for the old thread.
        let mut worker = lock(&self.worker);
        let Some(handle) = worker.take() else {
            return;
        };
        self.inner.request_stop();
        if handle.join().is_err() {
            error!(parent: &self.inner.span, "backup scheduler thread panicked");
        }
        info!(parent: &self.inner.span, "backup scheduler stopped");
    }

    /// Returns `true` while the scheduler thread runs.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.signal).running
    }

    /// Reports that data changed.
    ///
    /// Runs a backup unless one was attempted within `min_interval`; calls
    /// inside that window are dropped. With the scheduler running the
    /// backup happens on its thread, otherwise on the caller's.
    pub fn notify_change(&self) {
        self.inner.on_change();
    }

    /// Runs a backup now, full or delta per the backup policy.
    pub fn backup_now(&self) -> BackupResult<BackupReport> {
        self.inner.run(Request::Auto)
    }

    /// Writes a full backup now.
    pub fn backup_full(&self) -> BackupResult<BackupReport> {
        self.inner.run(Request::Full)
    }

    /// Writes a delta now. Without a previous full backup from this manager,
    /// writes a full backup instead.
    pub fn backup_delta(&self) -> BackupResult<BackupReport> {
        self.inner.run(Request::Delta)
    }

    /// Failed backups since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.inner.state).consecutive_failures
    }

    /// Deltas written since the last full backup.
    pub fn deltas_since_full(&self) -> u32 {
        lock(&self.inner.state).deltas_since_full
    }

    /// Wall-clock time of the last successful backup.
    pub fn last_backup_time(&self) -> Option<SystemTime> {
        lock(&self.inner.state).last_backup_time
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .field("deltas_since_full", &self.deltas_since_full())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish_non_exhaustive()
    }
}
