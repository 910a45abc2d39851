// SPDX-License-Identifier: MIT OR Apache-2.0
//! Full-device configuration snapshot, restore, and structural diff.
//!
//! A snapshot captures version, identity, and every configuration category
//! the device reports at capture time. Categories that fail to fetch are
//! recorded as `{_error: <message>}` placeholders so one flaky category
//! never sinks the whole export. Diffing compares categories by canonical
//! JSON serialisation.

#![deny(unsafe_code)]

use c64b_backend::Backend;
use c64b_error::BridgeError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// A point-in-time export of the device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Capture time.
    pub created_at: DateTime<Utc>,
    /// Firmware version descriptor.
    pub version: Value,
    /// Device identity descriptor.
    pub info: Value,
    /// Category name → item map (or `{_error: …}` placeholder).
    pub categories: BTreeMap<String, Value>,
}

/// Outcome of a restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    /// Number of categories pushed to the device.
    pub categories_applied: usize,
    /// Whether the configuration was additionally saved to flash.
    pub flashed: bool,
}

/// Outcome of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Category name → `{_changed: {expected, actual}}`.
    pub changes: BTreeMap<String, Value>,
    /// Number of changed categories.
    pub count: usize,
}

/// Capture a snapshot and write it to `path` as pretty-printed JSON.
pub async fn snapshot(backend: &dyn Backend, path: &Path) -> Result<ConfigSnapshot, BridgeError> {
    let (version, info, category_names) = futures::join!(
        backend.version(),
        backend.info(),
        backend.list_config_categories()
    );
    let version = version?;
    let info = info?;
    let category_names = category_names?;

    let fetches = category_names.iter().map(|name| async move {
        let value = backend.get_config_category(name).await;
        (name.clone(), value)
    });
    let mut categories = BTreeMap::new();
    for (name, value) in join_all(fetches).await {
        match value {
            Ok(items) => {
                categories.insert(name, items);
            }
            Err(err) => {
                warn!(category = %name, error = %err, "category fetch failed, recording placeholder");
                categories.insert(name, json!({"_error": err.to_string()}));
            }
        }
    }

    let snapshot = ConfigSnapshot {
        created_at: Utc::now(),
        version,
        info,
        categories,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, serde_json::to_string_pretty(&snapshot)?).await?;
    debug!(path = %path.display(), categories = snapshot.categories.len(), "wrote config snapshot");
    Ok(snapshot)
}

/// Read a snapshot file back.
///
/// The file must be a JSON object with an object-valued `categories` key.
pub async fn read_snapshot(path: &Path) -> Result<Value, BridgeError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        BridgeError::execution(format!("failed to read snapshot {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        BridgeError::execution(format!("snapshot {} is not valid JSON: {e}", path.display()))
    })?;
    let is_valid = value.is_object()
        && value
            .get("categories")
            .is_some_and(Value::is_object);
    if !is_valid {
        return Err(BridgeError::execution(format!(
            "snapshot {} has no 'categories' object",
            path.display()
        )));
    }
    Ok(value)
}

/// Push a snapshot's categories back to the device.
pub async fn restore(
    backend: &dyn Backend,
    path: &Path,
    apply_to_flash: bool,
) -> Result<RestoreOutcome, BridgeError> {
    let snapshot = read_snapshot(path).await?;
    let categories = snapshot
        .get("categories")
        .cloned()
        .expect("validated by read_snapshot");
    let count = categories.as_object().map_or(0, |m| m.len());

    backend
        .update_config_batch(&categories)
        .await?
        .require("failure while applying configuration batch")?;

    if apply_to_flash {
        backend
            .save_to_flash()
            .await?
            .require("failure while saving configuration to flash")?;
    }

    Ok(RestoreOutcome {
        categories_applied: count,
        flashed: apply_to_flash,
    })
}

/// Diff a snapshot against the device's current configuration.
pub async fn diff(backend: &dyn Backend, path: &Path) -> Result<DiffReport, BridgeError> {
    let snapshot = read_snapshot(path).await?;
    let expected = snapshot
        .get("categories")
        .and_then(Value::as_object)
        .expect("validated by read_snapshot")
        .clone();

    let mut changes = BTreeMap::new();
    for (category, expected_items) in &expected {
        let actual = match backend.get_config_category(category).await {
            Ok(items) => items,
            Err(err) => json!({"_error": err.to_string()}),
        };
        if canonical(expected_items) != canonical(&actual) {
            changes.insert(
                category.clone(),
                json!({"_changed": {"expected": expected_items, "actual": actual}}),
            );
        }
    }

    let count = changes.len();
    Ok(DiffReport { changes, count })
}

/// Canonical serialisation used for structural comparison. `serde_json`
/// object keys are ordered, so equal structures serialise identically.
fn canonical(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
