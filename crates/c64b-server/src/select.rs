// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic backend selection.
//!
//! Strict precedence: explicit caller base URL, then the `MODE` environment
//! variable, then whichever config section exists (device wins when both
//! do), and finally a short reachability probe against the default device
//! address with the emulator as the fallback.

use c64b_backend::{Backend, Platform, PlatformStatus};
use c64b_config::{BridgeConfig, DEFAULT_DEVICE_BASE_URL, Mode, device_base_url, normalize_base_url};
use c64b_device::DeviceBackend;
use c64b_emulator::EmulatorBackend;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Timeout of the selection reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// A selected backend and the platform status describing the choice.
pub struct Selection {
    /// The backend to serve with.
    pub backend: Arc<dyn Backend>,
    /// Status seeded into the process-wide platform handle.
    pub status: PlatformStatus,
}

/// Select the backend per the precedence rules.
pub async fn select_backend(
    explicit_base_url: Option<&str>,
    config: Option<&BridgeConfig>,
) -> anyhow::Result<Selection> {
    if let Some(url) = explicit_base_url {
        let url = normalize_base_url(url);
        return device_selection(&url, "explicit");
    }

    let forced = match c64b_config::mode_from_env() {
        Ok(mode) => mode,
        Err(raw) => {
            warn!(value = %raw, "ignoring unrecognised MODE value");
            None
        }
    };
    let device_cfg = config.and_then(|c| c.device.as_ref());
    let emulator_cfg = config.and_then(|c| c.emulator.as_ref());

    match forced {
        Some(Mode::Device) => {
            let url = match device_cfg {
                Some(cfg) => device_base_url(cfg)?,
                None => DEFAULT_DEVICE_BASE_URL.to_string(),
            };
            return device_selection(&url, "mode");
        }
        Some(Mode::Emulator) => {
            return Ok(emulator_selection(emulator_cfg.and_then(|c| c.exe.as_deref()), "mode"));
        }
        None => {}
    }

    match (device_cfg, emulator_cfg) {
        (Some(cfg), None) => device_selection(&device_base_url(cfg)?, "config"),
        (None, Some(cfg)) => Ok(emulator_selection(cfg.exe.as_deref(), "config")),
        // Both sections present: the device is the declared preference.
        (Some(cfg), Some(_)) => device_selection(&device_base_url(cfg)?, "config"),
        (None, None) => {
            if c64b_device::probe(DEFAULT_DEVICE_BASE_URL, PROBE_TIMEOUT).await {
                device_selection(DEFAULT_DEVICE_BASE_URL, "probe")
            } else {
                info!("device probe failed, falling back to the emulator");
                Ok(emulator_selection(None, "probe"))
            }
        }
    }
}

fn device_selection(base_url: &str, source: &str) -> anyhow::Result<Selection> {
    let backend = DeviceBackend::new(base_url)?;
    info!(base_url, source, "selected device backend");
    let status = PlatformStatus::new(
        Platform::Device,
        json!({"baseUrl": base_url, "source": source}),
    );
    Ok(Selection {
        backend: Arc::new(backend),
        status,
    })
}

fn emulator_selection(configured_exe: Option<&str>, source: &str) -> Selection {
    // An unresolvable executable is not fatal at startup; run_prg reports
    // the spawn failure when it is actually exercised.
    let executable = match c64b_emulator::resolve_executable(configured_exe) {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %err, "emulator executable not resolved");
            PathBuf::from(configured_exe.unwrap_or("x64sc"))
        }
    };
    info!(exe = %executable.display(), source, "selected emulator backend");
    let status = PlatformStatus::new(
        Platform::Emulator,
        json!({"executable": executable.display().to_string(), "source": source}),
    );
    Selection {
        backend: Arc::new(EmulatorBackend::new(executable)),
        status,
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use c64b_config::{DeviceConfig, EmulatorConfig};
    use serial_test::serial;

    fn config(device: bool, emulator: bool) -> BridgeConfig {
        BridgeConfig {
            device: device.then(|| DeviceConfig {
                base_url: Some("http://192.168.1.64".to_string()),
                host: None,
                hostname: None,
                port: None,
            }),
            emulator: emulator.then(|| EmulatorConfig {
                exe: Some("definitely-not-a-real-emulator".to_string()),
            }),
        }
    }

    #[tokio::test]
    #[serial]
    async fn explicit_base_url_wins_over_everything() {
        unsafe { std::env::set_var("MODE", "emulator") };
        let selection = select_backend(Some("10.0.0.2:8080"), Some(&config(true, true)))
            .await
            .unwrap();
        assert_eq!(selection.status.id, Platform::Device);
        assert_eq!(selection.status.details["baseUrl"], "http://10.0.0.2:8080");
        assert_eq!(selection.status.details["source"], "explicit");
        unsafe { std::env::remove_var("MODE") };
    }

    #[tokio::test]
    #[serial]
    async fn mode_emulator_forces_the_emulator() {
        unsafe { std::env::set_var("MODE", "vice") };
        let selection = select_backend(None, Some(&config(true, true))).await.unwrap();
        assert_eq!(selection.status.id, Platform::Emulator);
        assert_eq!(selection.status.details["source"], "mode");
        unsafe { std::env::remove_var("MODE") };
    }

    #[tokio::test]
    #[serial]
    async fn device_only_config_selects_the_device() {
        let selection = select_backend(None, Some(&config(true, false))).await.unwrap();
        assert_eq!(selection.status.id, Platform::Device);
        assert_eq!(selection.status.details["source"], "config");
    }

    #[tokio::test]
    #[serial]
    async fn emulator_only_config_selects_the_emulator() {
        let selection = select_backend(None, Some(&config(false, true))).await.unwrap();
        assert_eq!(selection.status.id, Platform::Emulator);
    }

    #[tokio::test]
    #[serial]
    async fn both_sections_prefer_the_device() {
        let selection = select_backend(None, Some(&config(true, true))).await.unwrap();
        assert_eq!(selection.status.id, Platform::Device);
    }
}
