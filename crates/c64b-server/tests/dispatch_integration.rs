// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests exercising the registry, envelope, and verified
//! operations together over the mock backend.

use c64b_backend::{Platform, PlatformHandle, PlatformStatus};
use c64b_backend_mock::MockBackend;
use c64b_error::ErrorKind;
use c64b_scheduler::{Scheduler, persist::TaskPaths};
use c64b_server::build_registry;
use c64b_tools::{ToolContext, ToolRegistry};
use serde_json::{Value, json};
use std::sync::Arc;

struct Harness {
    dir: tempfile::TempDir,
    registry: ToolRegistry,
    backend: Arc<MockBackend>,
    ctx: ToolContext,
}

fn harness_on(platform: Platform) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(TaskPaths::in_home(dir.path()));
    let registry = build_registry(scheduler).unwrap();
    let backend = Arc::new(MockBackend::new().with_platform(platform));
    let ctx = ToolContext::new(
        backend.clone(),
        PlatformHandle::new(PlatformStatus::new(platform, json!({}))),
    );
    Harness {
        dir,
        registry,
        backend,
        ctx,
    }
}

fn harness() -> Harness {
    harness_on(Platform::Device)
}

async fn call(h: &Harness, name: &str, arguments: Value) -> c64b_error::ToolResult {
    h.registry.invoke(name, arguments, &h.ctx).await
}

// ---------------------------------------------------------------------------
// Verified write scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verify_and_write_happy_path_through_the_registry() {
    let h = harness();
    let result = call(
        &h,
        "verify_and_write",
        json!({"address": "$0400", "bytes": "$AA55", "expected": "$0000"}),
    )
    .await;

    assert!(!result.is_error, "unexpected error: {}", result.text_content());
    let meta = result.metadata.unwrap();
    assert_eq!(meta["wrote"], "$AA55");
    assert_eq!(meta["preRead"], "$0000");
    assert!(meta["postRead"].as_str().unwrap().starts_with("$AA55"));
    assert_eq!(h.backend.count("pause"), 1);
    assert_eq!(h.backend.count("resume"), 1);
}

#[tokio::test]
async fn verify_and_write_mismatch_through_the_registry() {
    let h = harness();
    h.backend.set_memory(0x0400, &[0x01, 0x02]);
    let result = call(
        &h,
        "verify_and_write",
        json!({"address": "$0400", "bytes": "$AA55", "expected": "$0000"}),
    )
    .await;

    assert!(result.is_error);
    assert_eq!(result.error_kind(), Some(ErrorKind::Execution));
    let meta = result.metadata.unwrap();
    let mismatch = &meta["error"]["details"]["mismatches"][0];
    assert_eq!(mismatch["offset"], 0);
    assert_eq!(mismatch["expected"], "$00");
    assert_eq!(mismatch["actual"], "$01");
    assert_eq!(h.backend.count("resume"), 1);
}

#[tokio::test]
async fn memory_dump_through_the_registry_writes_manifest() {
    let h = harness();
    let data: Vec<u8> = (0u8..32).collect();
    h.backend.set_memory(0x2000, &data);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("dump.hex");

    let result = call(
        &h,
        "memory_dump",
        json!({
            "address": "$2000",
            "length": 32,
            "chunkSize": 8,
            "outputPath": out.display().to_string(),
        }),
    )
    .await;
    assert!(!result.is_error, "unexpected error: {}", result.text_content());

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.len(), 64);

    let manifest: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("dump.hex.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["length"], 32);
    assert_eq!(manifest["chunkSize"], 8);
    assert_eq!(manifest["format"], "hex");
    let meta = result.metadata.unwrap();
    assert_eq!(meta["checksum"], manifest["checksum"]);
    assert_eq!(h.backend.count("read_memory"), 4);
}

// ---------------------------------------------------------------------------
// Validation and platform gating
// ---------------------------------------------------------------------------

#[tokio::test]
async fn grouped_tool_missing_op_reports_dollar_op() {
    let h = harness();
    let result = call(&h, "machine_control", json!({})).await;
    assert!(result.is_error);
    let meta = result.metadata.unwrap();
    assert_eq!(meta["error"]["kind"], "validation");
    assert_eq!(meta["error"]["path"], "$.op");
}

#[tokio::test]
async fn grouped_tool_unknown_op_lists_sorted_ops() {
    let h = harness();
    let result = call(&h, "machine_control", json!({"op": "no_such_op"})).await;
    assert!(result.is_error);
    let meta = result.metadata.unwrap();
    let allowed: Vec<String> = meta["error"]["details"]["allowed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let mut sorted = allowed.clone();
    sorted.sort();
    assert_eq!(allowed, sorted);
    assert!(allowed.contains(&"pause".to_string()));
}

#[tokio::test]
async fn device_only_tools_are_gated_on_the_emulator() {
    let h = harness_on(Platform::Emulator);
    let result = call(&h, "memory_read", json!({"address": "$0400"})).await;
    assert!(result.is_error);
    assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedPlatform));
    let meta = result.metadata.unwrap();
    assert_eq!(meta["error"]["details"]["tool"], "memory_read");
    assert_eq!(meta["error"]["details"]["supported"], json!(["device"]));
}

#[tokio::test]
async fn run_program_is_available_on_both_platforms() {
    let h = harness_on(Platform::Emulator);
    let result = call(&h, "run_program", json!({"op": "prg", "data": "$0108"})).await;
    assert!(!result.is_error, "unexpected error: {}", result.text_content());
    assert_eq!(h.backend.count("run_prg"), 1);
}

#[tokio::test]
async fn schema_violations_surface_with_field_paths() {
    let h = harness();
    let result = call(&h, "memory_dump", json!({"address": "$2000"})).await;
    assert!(result.is_error);
    let meta = result.metadata.unwrap();
    assert_eq!(meta["error"]["kind"], "validation");
    assert_eq!(meta["error"]["path"], "$.length");

    let result = call(
        &h,
        "memory_read",
        json!({"address": "$0400", "length": "many"}),
    )
    .await;
    assert!(result.is_error);
    assert_eq!(
        result.metadata.unwrap()["error"]["path"],
        "$.length"
    );
}

#[tokio::test]
async fn unknown_extra_fields_are_rejected() {
    let h = harness();
    let result = call(
        &h,
        "memory_read",
        json!({"address": "$0400", "bytes": "$AA"}),
    )
    .await;
    assert!(result.is_error);
    assert!(result.text_content().contains("unknown field 'bytes'"));
}

// ---------------------------------------------------------------------------
// Config and files, end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_snapshot_and_diff_roundtrip() {
    let h = harness();
    h.backend.set_config("Audio", json!({"volume": 7}));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.json").display().to_string();

    let result = call(&h, "config_snapshot", json!({"path": path})).await;
    assert!(!result.is_error);

    let diff = call(&h, "config_diff", json!({"path": path})).await;
    assert!(!diff.is_error);
    assert_eq!(diff.metadata.unwrap()["count"], 0);

    h.backend.set_config("Audio", json!({"volume": 2}));
    let diff = call(&h, "config_diff", json!({"path": path})).await;
    assert_eq!(diff.metadata.unwrap()["count"], 1);
}

#[tokio::test]
async fn find_and_run_updates_search_memory() {
    let h = harness();
    h.backend.set_files(&["/games/elite.prg"]);
    let result = call(
        &h,
        "find_and_run_program_by_name",
        json!({"pattern": "elite"}),
    )
    .await;
    assert!(!result.is_error, "unexpected error: {}", result.text_content());
    assert_eq!(h.backend.count("run_prg_file"), 1);

    let state = c64b_files::load_state(h.dir.path()).await;
    assert_eq!(state.last_run_path.as_deref(), Some("/games/elite.prg"));
}
