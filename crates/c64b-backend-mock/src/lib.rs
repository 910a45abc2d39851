//! Mock backend implementation used for local testing.
//!
//! Backs the facade with a 64 KiB byte array and records every call so
//! tests can assert pause/resume bracketing and operation ordering.
//! Failures are injected per operation name, either as `success = false`
//! responses or as transient read errors for retry tests.

use async_trait::async_trait;
use c64b_backend::{Backend, BackendResponse, BackendResult, DiskImageKind, Platform};
use c64b_error::BridgeError;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// A scripted in-memory backend.
pub struct MockBackend {
    platform: Platform,
    state: Mutex<MockState>,
}

struct MockState {
    memory: Vec<u8>,
    calls: Vec<String>,
    failing_ops: HashSet<String>,
    reads_to_fail: u32,
    files: Vec<String>,
    configs: BTreeMap<String, Value>,
    screen: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A device-flavoured mock with zeroed memory.
    pub fn new() -> Self {
        Self {
            platform: Platform::Device,
            state: Mutex::new(MockState {
                memory: vec![0; 0x10000],
                calls: Vec::new(),
                failing_ops: HashSet::new(),
                reads_to_fail: 0,
                files: Vec::new(),
                configs: BTreeMap::new(),
                screen: "READY.".to_string(),
            }),
        }
    }

    /// Override the advertised platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Preload memory starting at `address`.
    pub fn set_memory(&self, address: u16, bytes: &[u8]) {
        let mut state = self.lock();
        let start = address as usize;
        state.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Read memory directly, bypassing the facade.
    pub fn peek(&self, address: u16, length: usize) -> Vec<u8> {
        let state = self.lock();
        let start = address as usize;
        state.memory[start..start + length].to_vec()
    }

    /// Make the named operation respond `success = false`.
    pub fn fail_op(&self, operation: &str) {
        self.lock().failing_ops.insert(operation.to_string());
    }

    /// Make the next `n` memory reads return an error.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().reads_to_fail = n;
    }

    /// Script the device filesystem listing.
    pub fn set_files(&self, paths: &[&str]) {
        self.lock().files = paths.iter().map(|p| p.to_string()).collect();
    }

    /// Script a configuration category.
    pub fn set_config(&self, category: &str, items: Value) {
        self.lock().configs.insert(category.to_string(), items);
    }

    /// Script the screen contents.
    pub fn set_screen(&self, text: &str) {
        self.lock().screen = text.to_string();
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// How many times the named operation was invoked.
    pub fn count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation || c.starts_with(&format!("{operation}(")))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    fn simple(&self, operation: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(operation.to_string());
        if state.failing_ops.contains(operation) {
            Ok(BackendResponse::failure(
                json!({"errors": [format!("{operation} refused")]}),
            ))
        } else {
            Ok(BackendResponse::ok())
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn pause(&self) -> BackendResult {
        self.simple("pause")
    }

    async fn resume(&self) -> BackendResult {
        self.simple("resume")
    }

    async fn reset(&self) -> BackendResult {
        self.simple("reset")
    }

    async fn reboot(&self) -> BackendResult {
        self.simple("reboot")
    }

    async fn poweroff(&self) -> BackendResult {
        self.simple("poweroff")
    }

    async fn menu_button(&self) -> BackendResult {
        self.simple("menu_button")
    }

    async fn read_memory(&self, address: u16, length: u32) -> BackendResult<Vec<u8>> {
        let mut state = self.lock();
        state.calls.push(format!("read_memory({address:#06X},{length})"));
        if state.reads_to_fail > 0 {
            state.reads_to_fail -= 1;
            return Err(BridgeError::execution("simulated read failure"));
        }
        let start = address as usize;
        let end = (start + length as usize).min(state.memory.len());
        Ok(state.memory[start..end].to_vec())
    }

    async fn write_memory(&self, address: u16, data: &[u8]) -> BackendResult {
        let mut state = self.lock();
        state
            .calls
            .push(format!("write_memory({address:#06X},{})", data.len()));
        if state.failing_ops.contains("write_memory") {
            return Ok(BackendResponse::failure(json!({"errors": ["write refused"]})));
        }
        let start = address as usize;
        let end = start + data.len();
        state.memory[start..end].copy_from_slice(data);
        Ok(BackendResponse::ok())
    }

    async fn read_screen(&self) -> BackendResult<String> {
        let mut state = self.lock();
        state.calls.push("read_screen".to_string());
        Ok(state.screen.clone())
    }

    async fn read_debug_reg(&self) -> BackendResult {
        Ok(self
            .simple("read_debug_reg")?
            .with_data(json!({"value": "00"})))
    }

    async fn write_debug_reg(&self, value: u8) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("write_debug_reg({value:#04X})"));
        Ok(BackendResponse::ok())
    }

    async fn load_prg(&self, data: &[u8]) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("load_prg({})", data.len()));
        Ok(BackendResponse::ok())
    }

    async fn run_prg(&self, data: &[u8]) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("run_prg({})", data.len()));
        Ok(BackendResponse::ok())
    }

    async fn run_prg_file(&self, path: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("run_prg_file({path})"));
        if state.failing_ops.contains("run_prg_file") {
            return Ok(BackendResponse::failure(json!({"errors": ["no such file"]})));
        }
        Ok(BackendResponse::ok())
    }

    async fn run_crt(&self, data: &[u8]) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("run_crt({})", data.len()));
        Ok(BackendResponse::ok())
    }

    async fn run_crt_file(&self, path: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("run_crt_file({path})"));
        Ok(BackendResponse::ok())
    }

    async fn sidplay_file(&self, path: &str, song: Option<u8>) -> BackendResult {
        let mut state = self.lock();
        state
            .calls
            .push(format!("sidplay_file({path},{})", song.unwrap_or(0)));
        Ok(BackendResponse::ok())
    }

    async fn sidplay_attachment(&self, data: &[u8], song: Option<u8>) -> BackendResult {
        let mut state = self.lock();
        state
            .calls
            .push(format!("sidplay_attachment({},{})", data.len(), song.unwrap_or(0)));
        Ok(BackendResponse::ok())
    }

    async fn modplay_file(&self, path: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("modplay_file({path})"));
        Ok(BackendResponse::ok())
    }

    async fn list_drives(&self) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push("list_drives".to_string());
        Ok(json!({"drives": [{"id": "a", "enabled": true}]}))
    }

    async fn mount_disk(&self, drive: &str, path: &str, mode: Option<&str>) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!(
            "mount_disk({drive},{path},{})",
            mode.unwrap_or("readwrite")
        ));
        Ok(BackendResponse::ok())
    }

    async fn remove_disk(&self, drive: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("remove_disk({drive})"));
        Ok(BackendResponse::ok())
    }

    async fn reset_drive(&self, drive: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("reset_drive({drive})"));
        Ok(BackendResponse::ok())
    }

    async fn drive_on(&self, drive: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("drive_on({drive})"));
        Ok(BackendResponse::ok())
    }

    async fn drive_off(&self, drive: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("drive_off({drive})"));
        Ok(BackendResponse::ok())
    }

    async fn set_drive_mode(&self, drive: &str, mode: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("set_drive_mode({drive},{mode})"));
        Ok(BackendResponse::ok())
    }

    async fn load_drive_rom(&self, drive: &str, path: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("load_drive_rom({drive},{path})"));
        Ok(BackendResponse::ok())
    }

    async fn start_stream(&self, kind: &str, destination: Option<&str>) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!(
            "start_stream({kind},{})",
            destination.unwrap_or("-")
        ));
        Ok(BackendResponse::ok())
    }

    async fn stop_stream(&self, kind: &str) -> BackendResult {
        let mut state = self.lock();
        state.calls.push(format!("stop_stream({kind})"));
        Ok(BackendResponse::ok())
    }

    async fn list_config_categories(&self) -> BackendResult<Vec<String>> {
        let mut state = self.lock();
        state.calls.push("list_config_categories".to_string());
        if state.failing_ops.contains("list_config_categories") {
            return Err(BridgeError::execution("config service unavailable"));
        }
        Ok(state.configs.keys().cloned().collect())
    }

    async fn get_config_category(&self, category: &str) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push(format!("get_config_category({category})"));
        if state.failing_ops.contains("get_config_category") {
            return Err(BridgeError::execution(format!(
                "category '{category}' unavailable"
            )));
        }
        state
            .configs
            .get(category)
            .cloned()
            .ok_or_else(|| BridgeError::execution(format!("unknown category '{category}'")))
    }

    async fn set_config_item(&self, category: &str, item: &str, value: &Value) -> BackendResult {
        let mut state = self.lock();
        state
            .calls
            .push(format!("set_config_item({category},{item})"));
        if let Some(Value::Object(map)) = state.configs.get_mut(category) {
            map.insert(item.to_string(), value.clone());
        }
        Ok(BackendResponse::ok())
    }

    async fn update_config_batch(&self, categories: &Value) -> BackendResult {
        let mut state = self.lock();
        state.calls.push("update_config_batch".to_string());
        if state.failing_ops.contains("update_config_batch") {
            return Ok(BackendResponse::failure(json!({"errors": ["flash busy"]})));
        }
        if let Value::Object(cats) = categories {
            for (category, items) in cats {
                state.configs.insert(category.clone(), items.clone());
            }
        }
        Ok(BackendResponse::ok())
    }

    async fn load_from_flash(&self) -> BackendResult {
        self.simple("load_from_flash")
    }

    async fn save_to_flash(&self) -> BackendResult {
        self.simple("save_to_flash")
    }

    async fn reset_config_defaults(&self) -> BackendResult {
        self.simple("reset_config_defaults")
    }

    async fn file_info(&self, path: &str) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push(format!("file_info({path})"));
        Ok(json!({"path": path, "size": 174848}))
    }

    async fn list_files(&self, root: &str) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push(format!("list_files({root})"));
        Ok(json!(state.files))
    }

    async fn create_disk_image(
        &self,
        kind: DiskImageKind,
        path: &str,
        _label: Option<&str>,
        _tracks: Option<u32>,
    ) -> BackendResult {
        let mut state = self.lock();
        state
            .calls
            .push(format!("create_disk_image({},{path})", kind.as_str()));
        Ok(BackendResponse::ok())
    }

    async fn version(&self) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push("version".to_string());
        Ok(json!({"version": "mock 1.0"}))
    }

    async fn info(&self) -> BackendResult<Value> {
        let mut state = self.lock();
        state.calls.push("info".to_string());
        Ok(json!({"product": "mock", "hostname": "mock"}))
    }
}
