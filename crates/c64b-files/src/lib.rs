// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filesystem search over the device, and find-and-run with search memory.
//!
//! Listings come from the facade and arrive either as a bare path array or
//! wrapped as `{paths: […]}`; both shapes are accepted. The find-and-run
//! tool remembers its last run and recent searches in a small state file
//! under `<tasks-home>/meta/`; a malformed state file is ignored and
//! overwritten on the next run.

#![deny(unsafe_code)]

use c64b_backend::Backend;
use c64b_error::BridgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// State file name under the tasks home's `meta/` directory.
pub const STATE_FILE_NAME: &str = "find_and_run_program_by_name.json";

/// Recent searches kept in the state file.
const RECENT_SEARCH_CAP: usize = 20;

// ---------------------------------------------------------------------------
// find_paths
// ---------------------------------------------------------------------------

/// Options for a path search.
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Case-insensitive substring matched against the file name.
    pub pattern: String,
    /// Directory to list recursively.
    pub root: String,
    /// Extension allow-list (with or without leading dots); empty allows
    /// everything.
    pub extensions: Vec<String>,
    /// Result cap.
    pub max_results: usize,
}

impl FindOptions {
    /// Search the whole filesystem for `pattern` with default caps.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            root: "/".to_string(),
            extensions: Vec::new(),
            max_results: 50,
        }
    }
}

/// Find paths by name through the facade's recursive listing.
pub async fn find_paths(
    backend: &dyn Backend,
    options: &FindOptions,
) -> Result<Vec<String>, BridgeError> {
    let listing = backend.list_files(&options.root).await?;
    let all = extract_paths(&listing)?;
    let needle = options.pattern.to_lowercase();
    let extensions: Vec<String> = options
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let matches: Vec<String> = all
        .into_iter()
        .filter(|path| {
            file_name(path).to_lowercase().contains(&needle)
                && (extensions.is_empty()
                    || extensions.iter().any(|ext| has_extension(path, ext)))
        })
        .take(options.max_results)
        .collect();
    debug!(pattern = %options.pattern, found = matches.len(), "path search");
    Ok(matches)
}

/// Accept both list-shaped and `{paths: […]}` listing payloads.
fn extract_paths(listing: &Value) -> Result<Vec<String>, BridgeError> {
    let entries = match listing {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("paths")
            .and_then(Value::as_array)
            .ok_or_else(|| BridgeError::execution("file listing has no 'paths' array"))?,
        _ => return Err(BridgeError::execution("unexpected file listing shape")),
    };
    Ok(entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(path) => Some(path.clone()),
            Value::Object(map) => map
                .get("path")
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        })
        .collect())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn has_extension(path: &str, ext: &str) -> bool {
    path.to_lowercase().ends_with(&format!(".{ext}"))
}

// ---------------------------------------------------------------------------
// find_and_run
// ---------------------------------------------------------------------------

/// Match ordering for find-and-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Keep the firmware's listing order.
    Firmware,
    /// Sort matches alphabetically.
    Alphabetical,
}

/// Options for find-and-run.
#[derive(Debug, Clone)]
pub struct RunSearchOptions {
    /// Case-insensitive substring matched against the file name.
    pub pattern: String,
    /// Directory to list recursively.
    pub root: String,
    /// Extensions in priority order; the first extension with any match
    /// wins.
    pub extensions: Vec<String>,
    /// Ordering applied within the winning extension's matches.
    pub order: SortOrder,
}

impl RunSearchOptions {
    /// Search for `pattern` with the default PRG-then-CRT priority.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            root: "/".to_string(),
            extensions: vec!["prg".to_string(), "crt".to_string()],
            order: SortOrder::Firmware,
        }
    }
}

/// What find-and-run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// The program that was started.
    pub path: String,
    /// Extension the match was made under.
    pub kind: String,
}

/// Search for a program and run the first match.
pub async fn find_and_run(
    backend: &dyn Backend,
    tasks_home: &Path,
    options: &RunSearchOptions,
) -> Result<RunOutcome, BridgeError> {
    let mut find = FindOptions::new(options.pattern.clone());
    find.root = options.root.clone();
    find.max_results = usize::MAX;

    for extension in &options.extensions {
        let ext = extension.trim_start_matches('.').to_lowercase();
        find.extensions = vec![ext.clone()];
        let mut matches = find_paths(backend, &find).await?;
        if matches.is_empty() {
            continue;
        }
        if options.order == SortOrder::Alphabetical {
            matches.sort();
        }
        let path = matches.remove(0);

        let response = if ext == "crt" {
            backend.run_crt_file(&path).await?
        } else {
            backend.run_prg_file(&path).await?
        };
        response.require(&format!("failure while running '{path}'"))?;

        remember_run(tasks_home, options, &path).await;
        return Ok(RunOutcome { path, kind: ext });
    }

    Err(
        BridgeError::execution("no matching program found").with_details(json!({
            "pattern": options.pattern,
            "root": options.root,
            "extensions": options.extensions,
        })),
    )
}

// ---------------------------------------------------------------------------
// Search memory
// ---------------------------------------------------------------------------

/// One remembered search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSearch {
    /// The pattern searched for.
    pub pattern: String,
    /// The root the search ran under.
    pub root: String,
    /// When the search ran.
    pub when: DateTime<Utc>,
}

/// Persistent find-and-run state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Path of the last program started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_path: Option<String>,
    /// Recent searches, newest first, deduped by pattern and root.
    #[serde(default)]
    pub recent_searches: Vec<RecentSearch>,
}

/// Location of the state file under the tasks home.
pub fn state_file_path(tasks_home: &Path) -> PathBuf {
    tasks_home.join("meta").join(STATE_FILE_NAME)
}

/// Load the state file, treating a missing or malformed file as empty.
pub async fn load_state(tasks_home: &Path) -> RunState {
    let path = state_file_path(tasks_home);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "malformed run state, starting empty");
            RunState::default()
        }),
        Err(_) => RunState::default(),
    }
}

async fn remember_run(tasks_home: &Path, options: &RunSearchOptions, path: &str) {
    let mut state = load_state(tasks_home).await;
    state.last_run_path = Some(path.to_string());
    state
        .recent_searches
        .retain(|s| !(s.pattern == options.pattern && s.root == options.root));
    state.recent_searches.insert(
        0,
        RecentSearch {
            pattern: options.pattern.clone(),
            root: options.root.clone(),
            when: Utc::now(),
        },
    );
    state.recent_searches.truncate(RECENT_SEARCH_CAP);

    if let Err(err) = save_state(tasks_home, &state).await {
        warn!(error = %err, "failed to persist run state");
    }
}

async fn save_state(tasks_home: &Path, state: &RunState) -> Result<(), BridgeError> {
    let path = state_file_path(tasks_home);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, serde_json::to_string_pretty(state)?).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use c64b_backend_mock::MockBackend;

    fn mock_with_files() -> MockBackend {
        let mock = MockBackend::new();
        mock.set_files(&[
            "/games/Pitfall.prg",
            "/games/pitfall-ii.crt",
            "/demos/PITFALL-intro.PRG",
            "/music/pitfall.sid",
            "/games/elite.prg",
        ]);
        mock
    }

    #[tokio::test]
    async fn find_paths_filters_case_insensitively() {
        let mock = mock_with_files();
        let found = find_paths(&mock, &FindOptions::new("pitfall")).await.unwrap();
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn extension_allow_list_narrows_matches() {
        let mock = mock_with_files();
        let mut options = FindOptions::new("pitfall");
        options.extensions = vec![".prg".to_string()];
        let found = find_paths(&mock, &options).await.unwrap();
        assert_eq!(
            found,
            vec!["/games/Pitfall.prg", "/demos/PITFALL-intro.PRG"]
        );
    }

    #[tokio::test]
    async fn max_results_caps_the_listing() {
        let mock = mock_with_files();
        let mut options = FindOptions::new("pitfall");
        options.max_results = 2;
        let found = find_paths(&mock, &options).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn listings_accept_both_shapes() {
        let bare = json!(["/a.prg", "/b.prg"]);
        assert_eq!(extract_paths(&bare).unwrap().len(), 2);
        let wrapped = json!({"paths": [{"path": "/a.prg"}, "/b.prg"]});
        assert_eq!(extract_paths(&wrapped).unwrap(), vec!["/a.prg", "/b.prg"]);
        assert!(extract_paths(&json!("nope")).is_err());
    }

    #[tokio::test]
    async fn prg_wins_over_crt_by_priority() {
        let mock = mock_with_files();
        let dir = tempfile::tempdir().unwrap();
        let outcome = find_and_run(&mock, dir.path(), &RunSearchOptions::new("pitfall"))
            .await
            .unwrap();
        assert_eq!(outcome.kind, "prg");
        assert_eq!(outcome.path, "/games/Pitfall.prg");
        assert_eq!(mock.count("run_prg_file"), 1);
        assert_eq!(mock.count("run_crt_file"), 0);
    }

    #[tokio::test]
    async fn crt_priority_falls_back_when_no_prg_matches() {
        let mock = MockBackend::new();
        mock.set_files(&["/games/pitfall-ii.crt"]);
        let dir = tempfile::tempdir().unwrap();
        let outcome = find_and_run(&mock, dir.path(), &RunSearchOptions::new("pitfall"))
            .await
            .unwrap();
        assert_eq!(outcome.kind, "crt");
        assert_eq!(mock.count("run_crt_file"), 1);
    }

    #[tokio::test]
    async fn alphabetical_order_changes_the_winner() {
        let mock = mock_with_files();
        let dir = tempfile::tempdir().unwrap();
        let mut options = RunSearchOptions::new("pitfall");
        options.order = SortOrder::Alphabetical;
        let outcome = find_and_run(&mock, dir.path(), &options).await.unwrap();
        assert_eq!(outcome.path, "/demos/PITFALL-intro.PRG");
    }

    #[tokio::test]
    async fn no_match_is_an_execution_error() {
        let mock = mock_with_files();
        let dir = tempfile::tempdir().unwrap();
        let err = find_and_run(&mock, dir.path(), &RunSearchOptions::new("zork"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no matching program"));
        assert_eq!(err.metadata()["details"]["pattern"], "zork");
    }

    #[tokio::test]
    async fn run_failure_surfaces_with_path() {
        let mock = mock_with_files();
        mock.fail_op("run_prg_file");
        let dir = tempfile::tempdir().unwrap();
        let err = find_and_run(&mock, dir.path(), &RunSearchOptions::new("elite"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/games/elite.prg"));
    }

    #[tokio::test]
    async fn state_file_records_and_dedupes_searches() {
        let mock = mock_with_files();
        let dir = tempfile::tempdir().unwrap();
        let options = RunSearchOptions::new("pitfall");
        find_and_run(&mock, dir.path(), &options).await.unwrap();
        find_and_run(&mock, dir.path(), &RunSearchOptions::new("elite"))
            .await
            .unwrap();
        find_and_run(&mock, dir.path(), &options).await.unwrap();

        let state = load_state(dir.path()).await;
        assert_eq!(state.last_run_path.as_deref(), Some("/games/Pitfall.prg"));
        assert_eq!(state.recent_searches.len(), 2);
        // The repeat search moved to the front without duplicating.
        assert_eq!(state.recent_searches[0].pattern, "pitfall");
        assert_eq!(state.recent_searches[1].pattern, "elite");
    }

    #[tokio::test]
    async fn malformed_state_is_ignored_and_overwritten() {
        let mock = mock_with_files();
        let dir = tempfile::tempdir().unwrap();
        let path = state_file_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "][ not json").unwrap();

        assert_eq!(load_state(dir.path()).await, RunState::default());
        find_and_run(&mock, dir.path(), &RunSearchOptions::new("elite"))
            .await
            .unwrap();
        let state = load_state(dir.path()).await;
        assert_eq!(state.recent_searches.len(), 1);
    }

    #[tokio::test]
    async fn recent_searches_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mock = mock_with_files();
        for i in 0..25 {
            let mut options = RunSearchOptions::new("elite");
            options.root = format!("/root{i}");
            find_and_run(&mock, dir.path(), &options).await.unwrap();
        }
        let state = load_state(dir.path()).await;
        assert_eq!(state.recent_searches.len(), RECENT_SEARCH_CAP);
        assert_eq!(state.recent_searches[0].root, "/root24");
    }
}
