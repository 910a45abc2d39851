// SPDX-License-Identifier: MIT OR Apache-2.0
//! The backend capability interface and process-wide platform status.
//!
//! [`Backend`] is the uniform facade over the two concrete targets: the
//! real device (REST) and the emulator (spawn-and-control). Operations a
//! backend cannot perform fail with a typed `execution` error carrying
//! `code = "unsupported"` rather than being absent from the interface.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use c64b_error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The kind of target currently selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// A real C64 Ultimate device reachable over HTTP.
    Device,
    /// A locally spawned emulator.
    Emulator,
}

impl Platform {
    /// Stable string id (`"device"` / `"emulator"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Emulator => "emulator",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` iff `set` is empty or contains `platform`.
pub fn is_platform_supported(platform: Platform, set: &[Platform]) -> bool {
    set.is_empty() || set.contains(&platform)
}

/// The current platform plus opaque selection details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformStatus {
    /// Selected platform.
    pub id: Platform,
    /// Opaque details recorded at selection time (base URL, exe path, …).
    pub details: Value,
}

impl PlatformStatus {
    /// Create a status with the given id and details.
    pub fn new(id: Platform, details: Value) -> Self {
        Self { id, details }
    }
}

/// Shared handle to the process-wide platform status.
///
/// One value lives for the server's lifetime; it is initialised from
/// backend selection and mutated only through [`PlatformHandle::set`].
/// Executors receive the handle through their context so tests can inject
/// a fake.
#[derive(Debug, Clone)]
pub struct PlatformHandle {
    inner: Arc<Mutex<PlatformStatus>>,
}

impl PlatformHandle {
    /// Create a handle holding the given initial status.
    pub fn new(status: PlatformStatus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(status)),
        }
    }

    /// Snapshot the current status.
    pub fn get(&self) -> PlatformStatus {
        self.inner.lock().expect("platform lock poisoned").clone()
    }

    /// Replace the current status.
    pub fn set(&self, status: PlatformStatus) {
        *self.inner.lock().expect("platform lock poisoned") = status;
    }

    /// Shorthand for the current platform id.
    pub fn platform(&self) -> Platform {
        self.get().id
    }
}

// ---------------------------------------------------------------------------
// BackendResponse
// ---------------------------------------------------------------------------

/// Uniform result of a backend operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation payload, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Firmware response or other diagnostic context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl BackendResponse {
    /// A bare success.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            details: None,
        }
    }

    /// A failure with diagnostic details.
    pub fn failure(details: Value) -> Self {
        Self {
            success: false,
            data: None,
            details: Some(details),
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach diagnostic details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convert a `success = false` response into an `execution` error.
    ///
    /// `action` names the attempted operation for the error message, e.g.
    /// `"failure while pausing"`.
    pub fn require(self, action: &str) -> Result<Self, BridgeError> {
        if self.success {
            Ok(self)
        } else {
            let mut err = BridgeError::execution(action);
            if let Some(details) = &self.details {
                err = err.with_details(details.clone());
            }
            Err(err)
        }
    }
}

/// Shorthand for the `execution`/`unsupported` error an emulator-style
/// backend raises for operations it cannot perform.
pub fn unsupported_operation(operation: &str) -> BridgeError {
    BridgeError::execution(format!(
        "operation '{operation}' is not supported by this backend"
    ))
    .with_code("unsupported")
    .with_details(serde_json::json!({"operation": operation}))
}

// ---------------------------------------------------------------------------
// DiskImageKind
// ---------------------------------------------------------------------------

/// Disk image formats the device can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskImageKind {
    /// 1541 format.
    D64,
    /// 1571 format.
    D71,
    /// 1581 format.
    D81,
    /// CMD native partition.
    Dnp,
}

impl DiskImageKind {
    /// Stable lowercase name, matching the REST path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D64 => "d64",
            Self::D71 => "d71",
            Self::D81 => "d81",
            Self::Dnp => "dnp",
        }
    }

    /// Parse a lowercase kind name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "d64" => Some(Self::D64),
            "d71" => Some(Self::D71),
            "d81" => Some(Self::D81),
            "dnp" => Some(Self::Dnp),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Result alias used throughout the facade.
pub type BackendResult<T = BackendResponse> = Result<T, BridgeError>;

/// The capability interface over a target machine.
///
/// Implementations must be safe for concurrent use; the device HTTP client
/// is shared across in-flight tool invocations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which platform this backend drives.
    fn platform(&self) -> Platform;

    // -- machine ---------------------------------------------------------

    /// Halt the machine (DMA pause).
    async fn pause(&self) -> BackendResult;
    /// Resume a paused machine.
    async fn resume(&self) -> BackendResult;
    /// Soft-reset the machine.
    async fn reset(&self) -> BackendResult;
    /// Reboot the device firmware.
    async fn reboot(&self) -> BackendResult;
    /// Power the machine off.
    async fn poweroff(&self) -> BackendResult;
    /// Press the Ultimate menu button.
    async fn menu_button(&self) -> BackendResult;

    // -- memory ----------------------------------------------------------

    /// Read `length` bytes starting at `address`.
    async fn read_memory(&self, address: u16, length: u32) -> BackendResult<Vec<u8>>;
    /// Write bytes starting at `address`.
    async fn write_memory(&self, address: u16, data: &[u8]) -> BackendResult;
    /// Read the text screen contents.
    async fn read_screen(&self) -> BackendResult<String>;
    /// Read the debug register.
    async fn read_debug_reg(&self) -> BackendResult;
    /// Write the debug register.
    async fn write_debug_reg(&self, value: u8) -> BackendResult;

    // -- programs --------------------------------------------------------

    /// Load a PRG into memory without running it.
    async fn load_prg(&self, data: &[u8]) -> BackendResult;
    /// Load and run a PRG payload.
    async fn run_prg(&self, data: &[u8]) -> BackendResult;
    /// Run a PRG from a device filesystem path.
    async fn run_prg_file(&self, path: &str) -> BackendResult;
    /// Run a cartridge image payload.
    async fn run_crt(&self, data: &[u8]) -> BackendResult;
    /// Run a cartridge image from a device filesystem path.
    async fn run_crt_file(&self, path: &str) -> BackendResult;
    /// Play a SID file from a device filesystem path.
    async fn sidplay_file(&self, path: &str, song: Option<u8>) -> BackendResult;
    /// Play an attached SID payload.
    async fn sidplay_attachment(&self, data: &[u8], song: Option<u8>) -> BackendResult;
    /// Play an Amiga module file from a device filesystem path.
    async fn modplay_file(&self, path: &str) -> BackendResult;

    // -- drives ----------------------------------------------------------

    /// List the drive bus.
    async fn list_drives(&self) -> BackendResult<Value>;
    /// Mount a disk image on a drive.
    async fn mount_disk(&self, drive: &str, path: &str, mode: Option<&str>) -> BackendResult;
    /// Remove the mounted image from a drive.
    async fn remove_disk(&self, drive: &str) -> BackendResult;
    /// Reset a drive.
    async fn reset_drive(&self, drive: &str) -> BackendResult;
    /// Turn a drive on.
    async fn drive_on(&self, drive: &str) -> BackendResult;
    /// Turn a drive off.
    async fn drive_off(&self, drive: &str) -> BackendResult;
    /// Change a drive's emulation mode.
    async fn set_drive_mode(&self, drive: &str, mode: &str) -> BackendResult;
    /// Load a custom drive ROM.
    async fn load_drive_rom(&self, drive: &str, path: &str) -> BackendResult;

    // -- streams ---------------------------------------------------------

    /// Start a video/audio/debug stream.
    async fn start_stream(&self, kind: &str, destination: Option<&str>) -> BackendResult;
    /// Stop a stream.
    async fn stop_stream(&self, kind: &str) -> BackendResult;

    // -- configs ---------------------------------------------------------

    /// List configuration category names.
    async fn list_config_categories(&self) -> BackendResult<Vec<String>>;
    /// Fetch one configuration category as an item map.
    async fn get_config_category(&self, category: &str) -> BackendResult<Value>;
    /// Set a single configuration item.
    async fn set_config_item(&self, category: &str, item: &str, value: &Value) -> BackendResult;
    /// Apply a batch of category → item → value updates.
    async fn update_config_batch(&self, categories: &Value) -> BackendResult;
    /// Reload configuration from flash.
    async fn load_from_flash(&self) -> BackendResult;
    /// Persist the active configuration to flash.
    async fn save_to_flash(&self) -> BackendResult;
    /// Reset configuration to factory defaults.
    async fn reset_config_defaults(&self) -> BackendResult;

    // -- files -----------------------------------------------------------

    /// Stat a file on the device filesystem.
    async fn file_info(&self, path: &str) -> BackendResult<Value>;
    /// Recursively list paths under `root`.
    async fn list_files(&self, root: &str) -> BackendResult<Value>;
    /// Create a blank disk image on the device filesystem.
    async fn create_disk_image(
        &self,
        kind: DiskImageKind,
        path: &str,
        label: Option<&str>,
        tracks: Option<u32>,
    ) -> BackendResult;

    // -- identity --------------------------------------------------------

    /// Firmware/emulator version descriptor.
    async fn version(&self) -> BackendResult<Value>;
    /// Device/emulator identity descriptor.
    async fn info(&self) -> BackendResult<Value>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
