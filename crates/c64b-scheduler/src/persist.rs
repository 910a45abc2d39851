// SPDX-License-Identifier: MIT OR Apache-2.0
//! On-disk layout of the task registry.
//!
//! The canonical record set lives in `tasks.json` under the tasks home.
//! Each task additionally mirrors itself into
//! `tasks/background/<id>/task.json` with a `resultPath` pointer, next to a
//! seeded `result.json` and a line-oriented `log.txt`. The mirror is
//! derived state: reload reads only `tasks.json`.

use crate::TaskRecord;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable naming the canonical tasks file directly.
pub const ENV_TASK_STATE_FILE: &str = "TASK_STATE_FILE";

/// Directory name used under `$HOME` when no override is set.
pub const DEFAULT_HOME_DIR: &str = ".c64bridge";

/// Resolved locations of the persistent task state.
#[derive(Debug, Clone)]
pub struct TaskPaths {
    /// Root under which task folders and `meta/` live.
    pub home: PathBuf,
    /// The canonical tasks file.
    pub tasks_file: PathBuf,
}

impl TaskPaths {
    /// Resolve from the environment: `TASK_STATE_FILE` names the file and
    /// its parent becomes the home; otherwise `<$HOME>/.c64bridge`.
    pub fn from_env() -> Self {
        if let Ok(file) = std::env::var(ENV_TASK_STATE_FILE) {
            let tasks_file = PathBuf::from(file);
            let home = tasks_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            return Self { home, tasks_file };
        }
        let home = std::env::var_os("HOME")
            .map(|h| Path::new(&h).join(DEFAULT_HOME_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME_DIR));
        let tasks_file = home.join("tasks.json");
        Self { home, tasks_file }
    }

    /// Locations rooted at an explicit home directory.
    pub fn in_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let tasks_file = home.join("tasks.json");
        Self { home, tasks_file }
    }
}

/// Shape of the canonical `tasks.json` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksFile {
    /// All known tasks.
    pub tasks: Vec<TaskRecord>,
}

/// Load the canonical file, creating `{tasks: []}` when missing.
///
/// A malformed file is treated as empty and rewritten on the next save.
pub fn load_tasks(paths: &TaskPaths) -> Result<TasksFile> {
    match std::fs::read_to_string(&paths.tasks_file) {
        Ok(content) => match serde_json::from_str::<TasksFile>(&content) {
            Ok(file) => Ok(file),
            Err(err) => {
                tracing::warn!(
                    path = %paths.tasks_file.display(),
                    error = %err,
                    "malformed tasks file, starting empty"
                );
                Ok(TasksFile::default())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let file = TasksFile::default();
            save_tasks_file(paths, &file)?;
            Ok(file)
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("read tasks file {}", paths.tasks_file.display()))),
    }
}

/// Write the canonical file.
pub fn save_tasks_file(paths: &TaskPaths, file: &TasksFile) -> Result<()> {
    if let Some(parent) = paths.tasks_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create tasks home {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(file)?;
    std::fs::write(&paths.tasks_file, json)
        .with_context(|| format!("write tasks file {}", paths.tasks_file.display()))
}

/// Persist the full registry: the canonical file plus every task folder.
pub fn save_all(paths: &TaskPaths, records: &[TaskRecord]) -> Result<()> {
    let file = TasksFile {
        tasks: records.to_vec(),
    };
    save_tasks_file(paths, &file)?;
    for record in records {
        write_task_folder(paths, record)?;
    }
    Ok(())
}

/// Write a task's folder mirror, seeding `result.json` and `log.txt` when
/// absent.
pub fn write_task_folder(paths: &TaskPaths, record: &TaskRecord) -> Result<()> {
    let folder = paths.home.join(&record.folder);
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("create task folder {}", folder.display()))?;

    let result_path = folder.join("result.json");
    let mut mirror = serde_json::to_value(record)?;
    mirror["resultPath"] = json!(result_path.display().to_string());
    std::fs::write(
        folder.join("task.json"),
        serde_json::to_string_pretty(&mirror)?,
    )
    .with_context(|| format!("write task mirror in {}", folder.display()))?;

    if !result_path.exists() {
        let seed = json!({
            "id": record.id,
            "type": "task",
            "name": record.operation,
            "created": Utc::now().to_rfc3339(),
            "status": record.status,
            "iterations": record.iterations,
        });
        std::fs::write(&result_path, serde_json::to_string_pretty(&seed)?)
            .with_context(|| format!("seed {}", result_path.display()))?;
    }

    let log_path = folder.join("log.txt");
    if !log_path.exists() {
        std::fs::write(&log_path, "")
            .with_context(|| format!("seed {}", log_path.display()))?;
    }
    Ok(())
}

/// Append a timestamped line to a task's `log.txt`.
pub fn append_log(paths: &TaskPaths, record: &TaskRecord, message: &str) -> Result<()> {
    let folder = paths.home.join(&record.folder);
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("create task folder {}", folder.display()))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(folder.join("log.txt"))
        .with_context(|| format!("open log in {}", folder.display()))?;
    writeln!(file, "[{}] {message}", Utc::now().to_rfc3339())
        .context("append task log line")
}
