// SPDX-License-Identifier: MIT OR Apache-2.0
//! Emulator backend: spawn-and-control over a local VICE binary.
//!
//! The only capability this backend really has is running a PRG: the
//! payload is written to a scratch file and the emulator is spawned with
//! `-silent -warp -autostart`, then killed once the run timeout expires.
//! Every other facade operation fails with a typed `execution` error
//! carrying `code = "unsupported"` so callers can render a uniform message.

#![deny(unsafe_code)]

use async_trait::async_trait;
use c64b_backend::{
    Backend, BackendResponse, BackendResult, DiskImageKind, Platform, unsupported_operation,
};
use c64b_error::BridgeError;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variable overriding the PRG run timeout, in milliseconds.
pub const ENV_RUN_TIMEOUT_MS: &str = "EMULATOR_RUN_TIMEOUT_MS";

/// Default time the spawned emulator is allowed to run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lower bound on the run timeout.
pub const MIN_RUN_TIMEOUT: Duration = Duration::from_secs(1);

/// Executable names tried when the config names none.
const DEFAULT_CANDIDATES: &[&str] = &["x64sc", "x64"];

/// Resolve the emulator executable from an optional config override.
///
/// A configured value with a path separator must point at an existing file;
/// a bare name is searched on `PATH`. Without a configured value the VICE
/// candidate names are tried on `PATH` in order.
pub fn resolve_executable(configured: Option<&str>) -> Result<PathBuf, BridgeError> {
    match configured {
        Some(exe) => {
            let candidate = Path::new(exe);
            if candidate.is_absolute() || exe.contains(std::path::MAIN_SEPARATOR) {
                if candidate.is_file() {
                    return Ok(candidate.to_path_buf());
                }
            } else if let Some(found) = search_path(exe) {
                return Ok(found);
            }
            Err(
                BridgeError::execution(format!("emulator executable '{exe}' not found"))
                    .with_details(json!({"exe": exe})),
            )
        }
        None => {
            for name in DEFAULT_CANDIDATES {
                if let Some(found) = search_path(name) {
                    return Ok(found);
                }
            }
            Err(BridgeError::execution("no emulator executable found on PATH")
                .with_details(json!({"candidates": DEFAULT_CANDIDATES})))
        }
    }
}

/// Walk the `PATH` directories looking for a file named `name`.
fn search_path(name: &str) -> Option<PathBuf> {
    let dirs = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&dirs) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Read the run timeout from the environment, clamped to the minimum.
pub fn run_timeout_from_env() -> Duration {
    let Some(raw) = std::env::var(ENV_RUN_TIMEOUT_MS).ok() else {
        return DEFAULT_RUN_TIMEOUT;
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms).max(MIN_RUN_TIMEOUT),
        Err(_) => {
            warn!(value = %raw, "ignoring unparseable {ENV_RUN_TIMEOUT_MS}");
            DEFAULT_RUN_TIMEOUT
        }
    }
}

/// The emulator backend.
pub struct EmulatorBackend {
    executable: PathBuf,
    run_timeout: Duration,
}

impl EmulatorBackend {
    /// Create a backend for a resolved executable, reading the run timeout
    /// from the environment.
    pub fn new(executable: PathBuf) -> Self {
        Self::with_timeout(executable, run_timeout_from_env())
    }

    /// Create a backend with an explicit run timeout.
    pub fn with_timeout(executable: PathBuf, run_timeout: Duration) -> Self {
        Self {
            executable,
            run_timeout: run_timeout.max(MIN_RUN_TIMEOUT),
        }
    }

    /// The resolved executable path.
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl Backend for EmulatorBackend {
    fn platform(&self) -> Platform {
        Platform::Emulator
    }

    async fn pause(&self) -> BackendResult {
        Err(unsupported_operation("pause"))
    }

    async fn resume(&self) -> BackendResult {
        Err(unsupported_operation("resume"))
    }

    async fn reset(&self) -> BackendResult {
        Err(unsupported_operation("reset"))
    }

    async fn reboot(&self) -> BackendResult {
        Err(unsupported_operation("reboot"))
    }

    async fn poweroff(&self) -> BackendResult {
        Err(unsupported_operation("poweroff"))
    }

    async fn menu_button(&self) -> BackendResult {
        Err(unsupported_operation("menu_button"))
    }

    async fn read_memory(&self, _address: u16, _length: u32) -> BackendResult<Vec<u8>> {
        Err(unsupported_operation("read_memory"))
    }

    async fn write_memory(&self, _address: u16, _data: &[u8]) -> BackendResult {
        Err(unsupported_operation("write_memory"))
    }

    async fn read_screen(&self) -> BackendResult<String> {
        Err(unsupported_operation("read_screen"))
    }

    async fn read_debug_reg(&self) -> BackendResult {
        Err(unsupported_operation("read_debug_reg"))
    }

    async fn write_debug_reg(&self, _value: u8) -> BackendResult {
        Err(unsupported_operation("write_debug_reg"))
    }

    async fn load_prg(&self, _data: &[u8]) -> BackendResult {
        Err(unsupported_operation("load_prg"))
    }

    async fn run_prg(&self, data: &[u8]) -> BackendResult {
        let scratch = tempfile::Builder::new()
            .prefix("c64bridge-")
            .suffix(".prg")
            .tempfile()
            .map_err(|e| BridgeError::execution(format!("failed to stage PRG: {e}")))?;
        tokio::fs::write(scratch.path(), data)
            .await
            .map_err(|e| BridgeError::execution(format!("failed to stage PRG: {e}")))?;

        debug!(exe = %self.executable.display(), bytes = data.len(), "spawning emulator");
        let mut child = Command::new(&self.executable)
            .arg("-silent")
            .arg("-warp")
            .arg("-autostart")
            .arg(scratch.path())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::execution(format!(
                    "failed to spawn '{}': {e}",
                    self.executable.display()
                ))
            })?;

        // The emulator runs forever once the program autostarts; a timeout
        // expiry is the normal, successful outcome.
        match tokio::time::timeout(self.run_timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(BackendResponse::ok().with_data(json!({
                "exited": true,
                "code": status.code(),
            }))),
            Ok(Err(e)) => Err(BridgeError::execution(format!("emulator wait failed: {e}"))),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill emulator after timeout");
                }
                Ok(BackendResponse::ok().with_data(json!({
                    "exited": false,
                    "ranForMs": self.run_timeout.as_millis() as u64,
                })))
            }
        }
    }

    async fn run_prg_file(&self, _path: &str) -> BackendResult {
        Err(unsupported_operation("run_prg_file"))
    }

    async fn run_crt(&self, _data: &[u8]) -> BackendResult {
        Err(unsupported_operation("run_crt"))
    }

    async fn run_crt_file(&self, _path: &str) -> BackendResult {
        Err(unsupported_operation("run_crt_file"))
    }

    async fn sidplay_file(&self, _path: &str, _song: Option<u8>) -> BackendResult {
        Err(unsupported_operation("sidplay_file"))
    }

    async fn sidplay_attachment(&self, _data: &[u8], _song: Option<u8>) -> BackendResult {
        Err(unsupported_operation("sidplay_attachment"))
    }

    async fn modplay_file(&self, _path: &str) -> BackendResult {
        Err(unsupported_operation("modplay_file"))
    }

    async fn list_drives(&self) -> BackendResult<Value> {
        Err(unsupported_operation("list_drives"))
    }

    async fn mount_disk(&self, _drive: &str, _path: &str, _mode: Option<&str>) -> BackendResult {
        Err(unsupported_operation("mount_disk"))
    }

    async fn remove_disk(&self, _drive: &str) -> BackendResult {
        Err(unsupported_operation("remove_disk"))
    }

    async fn reset_drive(&self, _drive: &str) -> BackendResult {
        Err(unsupported_operation("reset_drive"))
    }

    async fn drive_on(&self, _drive: &str) -> BackendResult {
        Err(unsupported_operation("drive_on"))
    }

    async fn drive_off(&self, _drive: &str) -> BackendResult {
        Err(unsupported_operation("drive_off"))
    }

    async fn set_drive_mode(&self, _drive: &str, _mode: &str) -> BackendResult {
        Err(unsupported_operation("set_drive_mode"))
    }

    async fn load_drive_rom(&self, _drive: &str, _path: &str) -> BackendResult {
        Err(unsupported_operation("load_drive_rom"))
    }

    async fn start_stream(&self, _kind: &str, _destination: Option<&str>) -> BackendResult {
        Err(unsupported_operation("start_stream"))
    }

    async fn stop_stream(&self, _kind: &str) -> BackendResult {
        Err(unsupported_operation("stop_stream"))
    }

    async fn list_config_categories(&self) -> BackendResult<Vec<String>> {
        Err(unsupported_operation("list_config_categories"))
    }

    async fn get_config_category(&self, _category: &str) -> BackendResult<Value> {
        Err(unsupported_operation("get_config_category"))
    }

    async fn set_config_item(&self, _category: &str, _item: &str, _value: &Value) -> BackendResult {
        Err(unsupported_operation("set_config_item"))
    }

    async fn update_config_batch(&self, _categories: &Value) -> BackendResult {
        Err(unsupported_operation("update_config_batch"))
    }

    async fn load_from_flash(&self) -> BackendResult {
        Err(unsupported_operation("load_from_flash"))
    }

    async fn save_to_flash(&self) -> BackendResult {
        Err(unsupported_operation("save_to_flash"))
    }

    async fn reset_config_defaults(&self) -> BackendResult {
        Err(unsupported_operation("reset_config_defaults"))
    }

    async fn file_info(&self, _path: &str) -> BackendResult<Value> {
        Err(unsupported_operation("file_info"))
    }

    async fn list_files(&self, _root: &str) -> BackendResult<Value> {
        Err(unsupported_operation("list_files"))
    }

    async fn create_disk_image(
        &self,
        _kind: DiskImageKind,
        _path: &str,
        _label: Option<&str>,
        _tracks: Option<u32>,
    ) -> BackendResult {
        Err(unsupported_operation("create_disk_image"))
    }

    async fn version(&self) -> BackendResult<Value> {
        Ok(json!({
            "version": "emulator",
            "executable": self.executable.display().to_string(),
        }))
    }

    async fn info(&self) -> BackendResult<Value> {
        Ok(json!({
            "product": "VICE emulator",
            "executable": self.executable.display().to_string(),
            "runTimeoutMs": self.run_timeout.as_millis() as u64,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn resolve_accepts_an_existing_explicit_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved =
            resolve_executable(Some(&file.path().display().to_string())).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn resolve_rejects_a_missing_explicit_path() {
        let err = resolve_executable(Some("/no/such/dir/x64sc")).unwrap_err();
        assert!(err.to_string().contains("/no/such/dir/x64sc"));
    }

    #[test]
    #[serial]
    fn resolve_reports_configured_name_when_missing() {
        let err = resolve_executable(Some("no-such-emulator")).unwrap_err();
        assert!(err.to_string().contains("no-such-emulator"));
        assert_eq!(err.metadata()["details"]["exe"], "no-such-emulator");
    }

    #[test]
    #[serial]
    fn resolve_finds_bare_names_on_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake-x64"), "").unwrap();
        let joined = std::env::join_paths([dir.path().to_path_buf()]).unwrap();
        let original = std::env::var_os("PATH");
        unsafe { std::env::set_var("PATH", &joined) };
        let resolved = resolve_executable(Some("fake-x64"));
        match original {
            Some(path) => unsafe { std::env::set_var("PATH", path) },
            None => unsafe { std::env::remove_var("PATH") },
        }
        assert_eq!(resolved.unwrap(), dir.path().join("fake-x64"));
    }

    #[test]
    #[serial]
    fn run_timeout_honours_env_and_minimum() {
        unsafe { std::env::set_var(ENV_RUN_TIMEOUT_MS, "2500") };
        assert_eq!(run_timeout_from_env(), Duration::from_millis(2500));
        unsafe { std::env::set_var(ENV_RUN_TIMEOUT_MS, "10") };
        assert_eq!(run_timeout_from_env(), MIN_RUN_TIMEOUT);
        unsafe { std::env::set_var(ENV_RUN_TIMEOUT_MS, "soon") };
        assert_eq!(run_timeout_from_env(), DEFAULT_RUN_TIMEOUT);
        unsafe { std::env::remove_var(ENV_RUN_TIMEOUT_MS) };
        assert_eq!(run_timeout_from_env(), DEFAULT_RUN_TIMEOUT);
    }

    #[tokio::test]
    async fn unsupported_operations_carry_the_code() {
        let backend = EmulatorBackend::with_timeout(PathBuf::from("/bin/true"), MIN_RUN_TIMEOUT);
        let err = backend.read_memory(0x0400, 16).await.unwrap_err();
        let meta = err.metadata();
        assert_eq!(meta["code"], "unsupported");
        assert_eq!(meta["details"]["operation"], "read_memory");
    }

    #[tokio::test]
    async fn the_whole_device_surface_is_rejected_uniformly() {
        let b = EmulatorBackend::with_timeout(PathBuf::from("/bin/true"), MIN_RUN_TIMEOUT);
        let errors = [
            b.pause().await.unwrap_err(),
            b.load_prg(&[0x01]).await.unwrap_err(),
            b.run_prg_file("/x.prg").await.unwrap_err(),
            b.sidplay_file("/x.sid", None).await.unwrap_err(),
            b.sidplay_attachment(&[0x50], Some(1)).await.unwrap_err(),
            b.modplay_file("/x.mod").await.unwrap_err(),
            b.start_stream("video", None).await.unwrap_err(),
            b.stop_stream("video").await.unwrap_err(),
            b.mount_disk("a", "/x.d64", None).await.unwrap_err(),
            b.save_to_flash().await.unwrap_err(),
            b.file_info("/x").await.unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.metadata()["code"], "unsupported", "{err}");
        }
    }

    #[tokio::test]
    async fn version_and_info_are_canned() {
        let backend = EmulatorBackend::with_timeout(PathBuf::from("/bin/true"), MIN_RUN_TIMEOUT);
        let info = backend.info().await.unwrap();
        assert_eq!(info["product"], "VICE emulator");
        let version = backend.version().await.unwrap();
        assert_eq!(version["executable"], "/bin/true");
    }

    #[tokio::test]
    async fn run_prg_survives_a_fast_exiting_binary() {
        // `true` exits immediately, standing in for an emulator that quits.
        let backend =
            EmulatorBackend::with_timeout(PathBuf::from("/bin/true"), MIN_RUN_TIMEOUT);
        let resp = backend.run_prg(&[0x01, 0x08]).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["exited"], true);
    }
}
