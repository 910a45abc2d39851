// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named, persistent background task scheduler.
//!
//! A background task is a named recurring operation: at most one task per
//! name may be `running`, ids carry a monotonically increasing numeric
//! prefix, and every state transition is persisted to `tasks.json` plus the
//! task's own folder before control returns. Each registry entry pairs its
//! record with a `tokio::sync::watch` stop channel; `stop` flips the signal
//! synchronously, the worker wakes out of its interval sleep, and an
//! operation already in flight finishes with its result discarded.

#![deny(unsafe_code)]

pub mod adapter;
pub mod persist;

use c64b_backend::Backend;
use c64b_error::BridgeError;
use chrono::{DateTime, Utc};
use persist::TaskPaths;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Scheduled and firing.
    Running,
    /// Reached its iteration budget.
    Completed,
    /// Stopped by request (or normalised on reload).
    Stopped,
    /// Terminated by an operation failure.
    Error,
}

impl TaskStatus {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// A background task as persisted and listed.
///
/// This is both the runtime record and the wire shape; the worker handle
/// lives next to it in the scheduler map, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// `NNNN_<name>` with a monotonically increasing numeric prefix.
    pub id: String,
    /// Unique task name.
    pub name: String,
    /// Operation dispatched by the [`adapter`].
    pub operation: String,
    /// Operation arguments (open object).
    #[serde(default)]
    pub args: Value,
    /// Firing interval in milliseconds.
    pub interval_ms: u64,
    /// Iteration budget; the task completes when it is reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    /// Successful iterations so far.
    pub iterations: u64,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// When the task was (re)started.
    pub started_at: DateTime<Utc>,
    /// Last successful mutation.
    pub updated_at: DateTime<Utc>,
    /// When the task left the running state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Message of the failure that ended the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Next scheduled firing instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    /// Folder relative to the tasks home.
    pub folder: String,
}

/// Options for starting a task.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Unique task name.
    pub name: String,
    /// Operation name, dispatched by the [`adapter`].
    pub operation: String,
    /// Operation arguments.
    pub args: Value,
    /// Firing interval in milliseconds (≥ 1).
    pub interval_ms: u64,
    /// Optional iteration budget (≥ 1).
    pub max_iterations: Option<u64>,
}

impl StartOptions {
    /// Options with the default one-second interval and no budget.
    pub fn new(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: operation.into(),
            args: json!({}),
            interval_ms: 1000,
            max_iterations: None,
        }
    }
}

/// Result of a `stop` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    /// Whether the task is now out of the running state.
    pub stopped: bool,
    /// The name was not present at all.
    pub not_found: bool,
    /// Status after the call, when the task exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Entry {
    record: TaskRecord,
    /// Stop signal for the task's worker; `None` once the worker is gone.
    stop_tx: Option<watch::Sender<bool>>,
}

/// True when the worker should wind down: either a stop was signalled or
/// the registry dropped the sender (the entry was replaced).
fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}

struct State {
    loaded: bool,
    tasks: BTreeMap<String, Entry>,
}

struct Inner {
    paths: TaskPaths,
    state: Mutex<State>,
}

/// The background task scheduler.
///
/// Cloning shares the underlying registry; all mutations go through a
/// single mutex, and persistence runs before the lock is released so a
/// crash can never observe a transition that was acknowledged but not
/// written.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// A scheduler persisting under the given locations.
    pub fn new(paths: TaskPaths) -> Self {
        Self {
            inner: Arc::new(Inner {
                paths,
                state: Mutex::new(State {
                    loaded: false,
                    tasks: BTreeMap::new(),
                }),
            }),
        }
    }

    /// A scheduler persisting under the environment-resolved home.
    pub fn from_env() -> Self {
        Self::new(TaskPaths::from_env())
    }

    /// The resolved persistence locations.
    pub fn paths(&self) -> &TaskPaths {
        &self.inner.paths
    }

    /// Start (or restart) a named task.
    pub fn start(
        &self,
        backend: Arc<dyn Backend>,
        options: StartOptions,
    ) -> Result<TaskRecord, BridgeError> {
        if options.name.trim().is_empty() {
            return Err(BridgeError::validation("name must not be empty", "$.name"));
        }
        if options.operation.trim().is_empty() {
            return Err(BridgeError::validation(
                "operation must not be empty",
                "$.operation",
            ));
        }
        if options.interval_ms < 1 {
            return Err(BridgeError::validation(
                "intervalMs must be at least 1",
                "$.intervalMs",
            )
            .with_details(json!(options.interval_ms)));
        }
        if let Some(max) = options.max_iterations {
            if max < 1 {
                return Err(BridgeError::validation(
                    "maxIterations must be at least 1",
                    "$.maxIterations",
                )
                .with_details(json!(max)));
            }
        }

        let mut state = self.lock();
        self.ensure_loaded(&mut state)?;

        if let Some(existing) = state.tasks.get(&options.name) {
            if existing.record.status == TaskStatus::Running {
                return Err(BridgeError::validation(
                    format!("task '{}' is already running", options.name),
                    "$.name",
                )
                .with_details(json!({"id": existing.record.id})));
            }
        }

        let now = Utc::now();
        let id = match state.tasks.get(&options.name) {
            // A known, non-running name restarts under its existing id.
            Some(existing) => existing.record.id.clone(),
            None => {
                let next = state
                    .tasks
                    .values()
                    .filter_map(|e| id_prefix(&e.record.id))
                    .max()
                    .unwrap_or(0)
                    + 1;
                format!("{next:04}_{}", options.name)
            }
        };

        let record = TaskRecord {
            folder: format!("tasks/background/{id}"),
            id,
            name: options.name.clone(),
            operation: options.operation,
            args: options.args,
            interval_ms: options.interval_ms,
            max_iterations: options.max_iterations,
            iterations: 0,
            status: TaskStatus::Running,
            started_at: now,
            updated_at: now,
            stopped_at: None,
            last_error: None,
            next_run_at: Some(now + chrono::Duration::milliseconds(options.interval_ms as i64)),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let log_line = format!(
            "started operation={} intervalMs={}",
            record.operation, record.interval_ms
        );
        if let Err(e) = persist::append_log(&self.inner.paths, &record, &log_line) {
            warn!(task = %record.name, error = %e, "failed to append task log");
        }
        state.tasks.insert(
            options.name.clone(),
            Entry {
                record: record.clone(),
                stop_tx: Some(stop_tx),
            },
        );
        self.persist(&state);
        drop(state);

        self.spawn_worker(backend, record.clone(), stop_rx);
        Ok(record)
    }

    /// Stop a named task. Idempotent; unknown names are a soft success.
    pub fn stop(&self, name: &str) -> Result<StopOutcome, BridgeError> {
        let mut state = self.lock();
        self.ensure_loaded(&mut state)?;

        let Some(entry) = state.tasks.get_mut(name) else {
            return Ok(StopOutcome {
                stopped: false,
                not_found: true,
                status: None,
            });
        };

        if let Some(stop_tx) = entry.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        // Completed tasks keep their status; everything else becomes stopped.
        let mutated = matches!(
            entry.record.status,
            TaskStatus::Running | TaskStatus::Error
        );
        if mutated {
            entry.record.status = TaskStatus::Stopped;
            entry.record.stopped_at = Some(Utc::now());
            entry.record.next_run_at = None;
            let record = entry.record.clone();
            if let Err(e) = persist::append_log(&self.inner.paths, &record, "stopped") {
                warn!(task = name, error = %e, "failed to append task log");
            }
        }
        let status = entry.record.status;
        if mutated {
            self.persist(&state);
        }
        Ok(StopOutcome {
            stopped: true,
            not_found: false,
            status: Some(status),
        })
    }

    /// Snapshot every known task, ordered by id.
    pub fn list(&self) -> Result<Vec<TaskRecord>, BridgeError> {
        let mut state = self.lock();
        self.ensure_loaded(&mut state)?;
        let mut records: Vec<TaskRecord> =
            state.tasks.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Stop every task. Returns how many left the running state.
    pub fn stop_all(&self) -> Result<usize, BridgeError> {
        let mut state = self.lock();
        self.ensure_loaded(&mut state)?;
        let mut stopped = 0;
        for entry in state.tasks.values_mut() {
            if let Some(stop_tx) = entry.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            if entry.record.status == TaskStatus::Running {
                entry.record.status = TaskStatus::Stopped;
                entry.record.stopped_at = Some(Utc::now());
                entry.record.next_run_at = None;
                stopped += 1;
                let record = entry.record.clone();
                if let Err(e) = persist::append_log(&self.inner.paths, &record, "stopped") {
                    warn!(task = %record.name, error = %e, "failed to append task log");
                }
            }
        }
        self.persist(&state);
        Ok(stopped)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("task map lock poisoned")
    }

    /// Load `tasks.json` on first use. Reloaded `running` records are
    /// normalised to `stopped`: scheduling does not survive the process.
    fn ensure_loaded(&self, state: &mut State) -> Result<(), BridgeError> {
        if state.loaded {
            return Ok(());
        }
        let file = persist::load_tasks(&self.inner.paths)
            .map_err(|e| BridgeError::execution(format!("failed to load task state: {e:#}")))?;
        for mut record in file.tasks {
            if record.status == TaskStatus::Running {
                record.status = TaskStatus::Stopped;
                record.stopped_at = Some(Utc::now());
                record.next_run_at = None;
                if let Err(e) =
                    persist::append_log(&self.inner.paths, &record, "reloaded as stopped")
                {
                    warn!(task = %record.name, error = %e, "failed to append task log");
                }
            }
            state.tasks.insert(
                record.name.clone(),
                Entry {
                    record,
                    stop_tx: None,
                },
            );
        }
        state.loaded = true;
        Ok(())
    }

    fn persist(&self, state: &State) {
        let mut records: Vec<TaskRecord> =
            state.tasks.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        if let Err(e) = persist::save_all(&self.inner.paths, &records) {
            warn!(error = %e, "failed to persist task state");
        }
    }

    fn spawn_worker(
        &self,
        backend: Arc<dyn Backend>,
        record: TaskRecord,
        stop_rx: watch::Receiver<bool>,
    ) {
        let inner = Arc::clone(&self.inner);
        let scheduler = Scheduler { inner };
        tokio::spawn(async move {
            worker_loop(scheduler, backend, record, stop_rx).await;
        });
    }
}

fn id_prefix(id: &str) -> Option<u64> {
    id.split('_').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn worker_loop(
    scheduler: Scheduler,
    backend: Arc<dyn Backend>,
    spawned: TaskRecord,
    mut stop_rx: watch::Receiver<bool>,
) {
    let name = spawned.name.clone();
    debug!(task = %name, id = %spawned.id, "worker started");
    loop {
        // Schedule the next firing.
        let delay = {
            let mut state = scheduler.lock();
            let Some(entry) = state.tasks.get_mut(&name) else {
                break;
            };
            if stop_requested(&stop_rx) || entry.record.status != TaskStatus::Running {
                break;
            }
            let interval = entry.record.interval_ms;
            entry.record.next_run_at =
                Some(Utc::now() + chrono::Duration::milliseconds(interval as i64));
            scheduler.persist(&state);
            Duration::from_millis(interval)
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }

        // Re-check after the wait; a stop may have landed meanwhile.
        {
            let state = scheduler.lock();
            match state.tasks.get(&name) {
                Some(entry)
                    if !stop_requested(&stop_rx)
                        && entry.record.status == TaskStatus::Running => {}
                _ => break,
            }
        }

        let outcome =
            adapter::run_operation(backend.as_ref(), &spawned.operation, &spawned.args).await;

        let finished = {
            let mut state = scheduler.lock();
            let Some(entry) = state.tasks.get_mut(&name) else {
                break;
            };
            if stop_requested(&stop_rx) || entry.record.status != TaskStatus::Running {
                // Stopped while the operation was in flight; discard.
                break;
            }
            let finished = match outcome {
                Ok(()) => {
                    entry.record.iterations += 1;
                    entry.record.updated_at = Utc::now();
                    let n = entry.record.iterations;
                    log_quietly(&scheduler, &entry.record, &format!("iteration={n}"));
                    let done = entry.record.max_iterations.is_some_and(|max| n >= max);
                    if done {
                        entry.record.status = TaskStatus::Completed;
                        entry.record.stopped_at = Some(Utc::now());
                        entry.record.next_run_at = None;
                        entry.stop_tx = None;
                        log_quietly(
                            &scheduler,
                            &entry.record,
                            &format!("completed iterations={n}"),
                        );
                    }
                    done
                }
                Err(err) => {
                    entry.record.status = TaskStatus::Error;
                    entry.record.last_error = Some(err.to_string());
                    entry.record.stopped_at = Some(Utc::now());
                    entry.record.next_run_at = None;
                    entry.stop_tx = None;
                    log_quietly(&scheduler, &entry.record, &format!("error: {err}"));
                    true
                }
            };
            scheduler.persist(&state);
            finished
        };

        if finished {
            break;
        }
    }
    debug!(task = %name, "worker exited");
}

fn log_quietly(scheduler: &Scheduler, record: &TaskRecord, message: &str) {
    if let Err(e) = persist::append_log(&scheduler.inner.paths, record, message) {
        warn!(task = %record.name, error = %e, "failed to append task log");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use c64b_backend_mock::MockBackend;
    use c64b_error::ErrorKind;
    use std::time::Instant;

    fn scheduler_in(dir: &tempfile::TempDir) -> Scheduler {
        Scheduler::new(TaskPaths::in_home(dir.path()))
    }

    async fn wait_for<F: Fn(&[TaskRecord]) -> bool>(scheduler: &Scheduler, pred: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let records = scheduler.list().unwrap();
            if pred(&records) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for scheduler");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn completes_after_max_iterations_with_log_trail() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend = Arc::new(MockBackend::new());

        let mut options = StartOptions::new("poll", "read");
        options.interval_ms = 5;
        options.max_iterations = Some(2);
        let record = scheduler.start(backend, options).unwrap();
        assert_eq!(record.id, "0001_poll");
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.next_run_at.is_some());

        wait_for(&scheduler, |records| {
            records[0].status == TaskStatus::Completed
        })
        .await;

        let records = scheduler.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].iterations, 2);
        assert!(records[0].next_run_at.is_none());

        let log = std::fs::read_to_string(
            dir.path().join("tasks/background/0001_poll/log.txt"),
        )
        .unwrap();
        assert!(log.contains("iteration=1"));
        assert!(log.contains("iteration=2"));
        assert!(log.contains("completed iterations=2"));
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected_at_name() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend: Arc<MockBackend> = Arc::new(MockBackend::new());

        let mut options = StartOptions::new("t1", "read");
        options.interval_ms = 60_000;
        scheduler.start(backend.clone(), options.clone()).unwrap();
        let err = scheduler.start(backend, options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.metadata()["path"], "$.name");
    }

    #[tokio::test]
    async fn empty_name_and_operation_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend: Arc<MockBackend> = Arc::new(MockBackend::new());

        let err = scheduler
            .start(backend.clone(), StartOptions::new("", "read"))
            .unwrap_err();
        assert_eq!(err.metadata()["path"], "$.name");
        let err = scheduler
            .start(backend, StartOptions::new("x", " "))
            .unwrap_err();
        assert_eq!(err.metadata()["path"], "$.operation");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_soft_on_missing() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend = Arc::new(MockBackend::new());

        let missing = scheduler.stop("ghost").unwrap();
        assert_eq!(
            missing,
            StopOutcome {
                stopped: false,
                not_found: true,
                status: None
            }
        );

        let mut options = StartOptions::new("t1", "read");
        options.interval_ms = 60_000;
        scheduler.start(backend, options).unwrap();

        let first = scheduler.stop("t1").unwrap();
        assert!(first.stopped);
        assert_eq!(first.status, Some(TaskStatus::Stopped));
        let stopped_at = scheduler.list().unwrap()[0].stopped_at;

        let second = scheduler.stop("t1").unwrap();
        assert_eq!(second.status, Some(TaskStatus::Stopped));
        // State unchanged by the second call.
        assert_eq!(scheduler.list().unwrap()[0].stopped_at, stopped_at);
    }

    #[tokio::test]
    async fn restart_reuses_the_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend: Arc<MockBackend> = Arc::new(MockBackend::new());

        let mut options = StartOptions::new("t1", "read");
        options.interval_ms = 60_000;
        let first = scheduler.start(backend.clone(), options.clone()).unwrap();
        scheduler.stop("t1").unwrap();
        let second = scheduler.start(backend.clone(), options).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, TaskStatus::Running);

        // A fresh name continues the prefix sequence.
        let mut other = StartOptions::new("t2", "read");
        other.interval_ms = 60_000;
        let third = scheduler.start(backend, other).unwrap();
        assert_eq!(third.id, "0002_t2");
    }

    #[tokio::test]
    async fn operation_failure_ends_the_task_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend = Arc::new(MockBackend::new());
        backend.fail_op("menu_button");

        let mut options = StartOptions::new("presser", "menu_button");
        options.interval_ms = 5;
        scheduler.start(backend, options).unwrap();

        wait_for(&scheduler, |records| records[0].status == TaskStatus::Error).await;

        let records = scheduler.list().unwrap();
        assert_eq!(records[0].iterations, 0);
        assert!(records[0].last_error.as_ref().unwrap().contains("menu"));
        let log = std::fs::read_to_string(
            dir.path().join("tasks/background/0001_presser/log.txt"),
        )
        .unwrap();
        assert!(log.contains("error:"));

        // An explicit stop moves the errored task to stopped; the error
        // message itself is retained.
        let outcome = scheduler.stop("presser").unwrap();
        assert_eq!(outcome.status, Some(TaskStatus::Stopped));
        assert!(scheduler.list().unwrap()[0].last_error.is_some());
    }

    #[tokio::test]
    async fn stop_leaves_completed_tasks_completed() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend = Arc::new(MockBackend::new());
        let mut options = StartOptions::new("once", "read");
        options.interval_ms = 5;
        options.max_iterations = Some(1);
        scheduler.start(backend, options).unwrap();
        wait_for(&scheduler, |records| {
            records[0].status == TaskStatus::Completed
        })
        .await;
        let outcome = scheduler.stop("once").unwrap();
        assert_eq!(outcome.status, Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn stop_all_stops_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend: Arc<MockBackend> = Arc::new(MockBackend::new());

        for name in ["a", "b"] {
            let mut options = StartOptions::new(name, "read");
            options.interval_ms = 60_000;
            scheduler.start(backend.clone(), options).unwrap();
        }
        assert_eq!(scheduler.stop_all().unwrap(), 2);
        assert_eq!(scheduler.stop_all().unwrap(), 0);
        assert!(
            scheduler
                .list()
                .unwrap()
                .iter()
                .all(|r| r.status == TaskStatus::Stopped)
        );
    }

    #[tokio::test]
    async fn reload_normalises_running_tasks_and_keeps_ids() {
        let dir = tempfile::tempdir().unwrap();
        {
            let scheduler = scheduler_in(&dir);
            let backend = Arc::new(MockBackend::new());
            let mut options = StartOptions::new("t1", "read");
            options.interval_ms = 60_000;
            scheduler.start(backend, options).unwrap();
            // Simulate a crash: drop without stopping. tasks.json now
            // carries a running record.
        }

        let reborn = scheduler_in(&dir);
        let records = reborn.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "0001_t1");
        assert_eq!(records[0].status, TaskStatus::Stopped);
        assert!(records[0].next_run_at.is_none());

        // The id survives the next explicit start.
        let backend = Arc::new(MockBackend::new());
        let mut options = StartOptions::new("t1", "read");
        options.interval_ms = 60_000;
        let restarted = reborn.start(backend, options).unwrap();
        assert_eq!(restarted.id, "0001_t1");
    }

    #[tokio::test]
    async fn cancelled_in_flight_result_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_in(&dir);
        let backend = Arc::new(MockBackend::new());

        let mut options = StartOptions::new("t1", "read");
        options.interval_ms = 5;
        scheduler.start(backend, options).unwrap();
        // Let at least one firing happen, then stop.
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.stop("t1").unwrap();
        let after_stop = scheduler.list().unwrap()[0].iterations;
        tokio::time::sleep(Duration::from_millis(30)).await;
        // No further iterations are applied after the stop returned.
        assert_eq!(scheduler.list().unwrap()[0].iterations, after_stop);
    }
}
