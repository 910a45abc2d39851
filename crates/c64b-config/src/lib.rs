// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and base-URL construction for c64bridge.
//!
//! The config file is JSON, discovered via the `CONFIG_FILE` environment
//! variable, then `./.c64bridge.json`, then `<$HOME>/.c64bridge.json`. A
//! file that exists but cannot be read or parsed is a hard error so the
//! server can refuse to start with half-applied settings.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file path.
pub const ENV_CONFIG_FILE: &str = "CONFIG_FILE";

/// Environment variable forcing the backend mode.
pub const ENV_MODE: &str = "MODE";

/// Config file name searched in the working directory and `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".c64bridge.json";

/// Base URL assumed for the device when the config names no host.
pub const DEFAULT_DEVICE_BASE_URL: &str = "http://c64u";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised during configuration loading or URL construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file was named (or found) but could not be read.
    #[error("config file unreadable: {path}: {reason}")]
    Unreadable {
        /// Path of the offending file.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The file could not be parsed as the expected JSON shape.
    #[error("failed to parse config {path}: {reason}")]
    Parse {
        /// Path of the offending file.
        path: String,
        /// Parser detail.
        reason: String,
    },

    /// A port was outside 1..=65535.
    #[error("invalid port: {value}")]
    InvalidPort {
        /// The rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Device (C64 Ultimate) connection settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    /// Emulator settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator: Option<EmulatorConfig>,
}

/// Device connection settings.
///
/// `baseUrl` wins when present; otherwise a URL is built from
/// `host`/`hostname` and `port`. Both spellings of the host key are
/// accepted, and `host` may embed a port as `host:port`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Full base URL, taking precedence over host/port.
    #[serde(
        rename = "baseUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    /// Hostname, optionally with an embedded `:port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Alternative spelling of the host key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port (1..=65535); overrides any port embedded in `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Emulator settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Executable path or bare name resolved over `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,
}

/// A loaded config together with the path it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed configuration.
    pub config: BridgeConfig,
    /// Source file.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Discover and load the configuration.
///
/// Order: `CONFIG_FILE` env (must exist and parse), `./.c64bridge.json`,
/// `<$HOME>/.c64bridge.json`. Returns `Ok(None)` when no file is found.
pub fn load() -> Result<Option<LoadedConfig>, ConfigError> {
    if let Ok(explicit) = std::env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(explicit);
        return load_from(&path).map(|config| Some(LoadedConfig { config, path }));
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(Path::new(&home).join(CONFIG_FILE_NAME));
    }

    for path in candidates {
        if path.is_file() {
            let config = load_from(&path)?;
            return Ok(Some(LoadedConfig { config, path }));
        }
    }
    Ok(None)
}

/// Load and parse a config file from an explicit path.
pub fn load_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Backend mode forced through the `MODE` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Talk to the real device.
    Device,
    /// Spawn the emulator.
    Emulator,
}

/// Parse a `MODE` value, accepting the legacy `c64u`/`vice` spellings.
pub fn parse_mode(value: &str) -> Option<Mode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "device" | "c64u" => Some(Mode::Device),
        "emulator" | "vice" => Some(Mode::Emulator),
        _ => None,
    }
}

/// Read the forced mode from the environment, if any.
///
/// Unrecognised values are reported back so the caller can warn.
pub fn mode_from_env() -> Result<Option<Mode>, String> {
    match std::env::var(ENV_MODE) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => parse_mode(&raw).map(Some).ok_or(raw),
        Err(_) => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Base URL construction
// ---------------------------------------------------------------------------

/// Build the device base URL from a device config section.
///
/// Preference order: `baseUrl`, then `host`/`hostname` (+ optional `port`),
/// then [`DEFAULT_DEVICE_BASE_URL`]. Schemes default to `http://`, IPv6
/// hosts are bracketed, and the default port 80 is stripped.
pub fn device_base_url(device: &DeviceConfig) -> Result<String, ConfigError> {
    if let Some(url) = &device.base_url {
        return Ok(normalize_base_url(url));
    }

    let host_key = device.host.as_deref().or(device.hostname.as_deref());
    let Some(raw_host) = host_key else {
        return Ok(DEFAULT_DEVICE_BASE_URL.to_string());
    };

    let (host, embedded_port) = split_host_port(raw_host)?;
    let port = match device.port {
        Some(0) => {
            return Err(ConfigError::InvalidPort {
                value: "0".to_string(),
            });
        }
        Some(p) => Some(p),
        None => embedded_port,
    };

    let host = bracket_if_ipv6(&host);
    Ok(match port {
        None | Some(80) => format!("http://{host}"),
        Some(p) => format!("http://{host}:{p}"),
    })
}

/// Normalise an explicit base URL: default the scheme, trim trailing
/// slashes, and strip an explicit `:80` on plain http.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    if let Some(rest) = with_scheme.strip_prefix("http://") {
        if let Some(stripped) = rest.strip_suffix(":80") {
            return format!("http://{stripped}");
        }
    }
    with_scheme
}

/// Split a `host[:port]` spelling. Bracketed or multi-colon (IPv6) hosts
/// are returned whole.
fn split_host_port(raw: &str) -> Result<(String, Option<u16>), ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('[') || raw.matches(':').count() != 1 {
        return Ok((raw.to_string(), None));
    }
    let (host, port) = raw.split_once(':').expect("exactly one colon");
    let parsed: u16 = port.parse().map_err(|_| ConfigError::InvalidPort {
        value: port.to_string(),
    })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidPort {
            value: port.to_string(),
        });
    }
    Ok((host.to_string(), Some(parsed)))
}

fn bracket_if_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
