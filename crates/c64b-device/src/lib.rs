// SPDX-License-Identifier: MIT OR Apache-2.0
//! REST backend for the C64 Ultimate device.
//!
//! Thin, uniform plumbing over the firmware's `/v1` API: machine control is
//! `PUT /v1/machine:<op>`, runners are under `/v1/runners`, drives under
//! `/v1/drives/<id>`, configuration under `/v1/configs`. Addresses travel
//! as zero-padded uppercase 4-hex-digit query parameters. Memory reads
//! negotiate `application/octet-stream` or `application/json`; writes up to
//! [`FORM_WRITE_LIMIT`] bytes go form-encoded, larger ones as an
//! octet-stream POST.

#![deny(unsafe_code)]

use async_trait::async_trait;
use c64b_backend::{Backend, BackendResponse, BackendResult, DiskImageKind, Platform};
use c64b_error::BridgeError;
use c64b_format::{bytes_to_plain_hex, format_address, hex_to_bytes};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Default timeout for device HTTP calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes up to this many bytes use form encoding; larger writes POST raw.
pub const FORM_WRITE_LIMIT: usize = 128;

/// Screen memory origin and size used by `read_screen`.
const SCREEN_ADDRESS: u16 = 0x0400;
const SCREEN_COLUMNS: usize = 40;
const SCREEN_ROWS: usize = 25;

/// HTTP client for a C64 Ultimate device.
pub struct DeviceBackend {
    client: reqwest::Client,
    base_url: String,
}

impl DeviceBackend {
    /// Connect to the device at `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Connect with an explicit timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::execution(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn dispatch(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BridgeError> {
        request
            .send()
            .await
            .map_err(|e| BridgeError::execution(format!("device unreachable: {e}")))
    }

    /// Interpret a firmware response as a [`BackendResponse`].
    ///
    /// 2xx with an empty or error-free body is success; a body carrying a
    /// non-empty `errors` array, or any non-2xx status, is a failure with
    /// the raw firmware payload in `details`.
    async fn to_response(&self, response: reqwest::Response) -> BackendResult {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if status.is_success() {
            let firmware_errors = parsed
                .as_ref()
                .and_then(|v| v.get("errors"))
                .and_then(Value::as_array)
                .is_some_and(|errs| !errs.is_empty());
            if firmware_errors {
                return Ok(BackendResponse::failure(parsed.expect("checked above")));
            }
            let mut ok = BackendResponse::ok();
            if let Some(data) = parsed {
                ok = ok.with_data(data);
            }
            return Ok(ok);
        }

        Ok(BackendResponse::failure(json!({
            "status": status.as_u16(),
            "body": parsed.unwrap_or_else(|| json!(body)),
        })))
    }

    async fn json_body(&self, response: reqwest::Response, what: &str) -> BackendResult<Value> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BridgeError::execution(format!(
                "device rejected {what} with status {status}"
            ))
            .with_details(json!({"status": status.as_u16(), "body": body})));
        }
        serde_json::from_str(&body).map_err(|e| {
            BridgeError::execution(format!("device returned malformed JSON for {what}: {e}"))
        })
    }

    async fn put_op(&self, path: &str, query: &[(&str, String)]) -> BackendResult {
        let response = self
            .dispatch(self.client.put(self.url(path)).query(query))
            .await?;
        self.to_response(response).await
    }

    async fn post_payload(&self, path: &str, query: &[(&str, String)], data: &[u8]) -> BackendResult {
        let response = self
            .dispatch(
                self.client
                    .post(self.url(path))
                    .query(query)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(data.to_vec()),
            )
            .await?;
        self.to_response(response).await
    }
}

/// Probe a device base URL for reachability.
///
/// Any HTTP status below 500 counts as reachable; the device answers 4xx on
/// the bare base path but that still proves something is listening.
pub async fn probe(base_url: &str, timeout: Duration) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(timeout).build() else {
        return false;
    };
    match client.get(base_url).send().await {
        Ok(response) => response.status().as_u16() < 500,
        Err(_) => false,
    }
}

/// Decode C64 screen codes into readable ASCII lines.
fn decode_screen(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + SCREEN_ROWS);
    for (i, raw) in bytes.iter().enumerate() {
        if i > 0 && i % SCREEN_COLUMNS == 0 {
            out.push('\n');
        }
        let code = raw & 0x7F;
        let ch = match code {
            0 => '@',
            1..=26 => (b'A' + code - 1) as char,
            27 => '[',
            29 => ']',
            32..=63 => code as char,
            _ => '.',
        };
        out.push(ch);
    }
    out
}

#[async_trait]
impl Backend for DeviceBackend {
    fn platform(&self) -> Platform {
        Platform::Device
    }

    async fn pause(&self) -> BackendResult {
        self.put_op("/v1/machine:pause", &[]).await
    }

    async fn resume(&self) -> BackendResult {
        self.put_op("/v1/machine:resume", &[]).await
    }

    async fn reset(&self) -> BackendResult {
        self.put_op("/v1/machine:reset", &[]).await
    }

    async fn reboot(&self) -> BackendResult {
        self.put_op("/v1/machine:reboot", &[]).await
    }

    async fn poweroff(&self) -> BackendResult {
        self.put_op("/v1/machine:poweroff", &[]).await
    }

    async fn menu_button(&self) -> BackendResult {
        self.put_op("/v1/machine:menu_button", &[]).await
    }

    async fn read_memory(&self, address: u16, length: u32) -> BackendResult<Vec<u8>> {
        let response = self
            .dispatch(
                self.client
                    .get(self.url("/v1/machine:readmem"))
                    .query(&[
                        ("address", format_address(address)),
                        ("length", length.to_string()),
                    ])
                    .header(
                        reqwest::header::ACCEPT,
                        "application/octet-stream, application/json",
                    ),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::execution(format!(
                "memory read rejected with status {status}"
            ))
            .with_details(json!({"status": status.as_u16(), "body": body})));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        if is_json {
            let body: Value = response
                .json()
                .await
                .map_err(|e| BridgeError::execution(format!("malformed memory payload: {e}")))?;
            let hex = body
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| BridgeError::execution("memory payload missing 'data'"))?;
            return hex_to_bytes(hex)
                .map_err(|e| BridgeError::execution(format!("memory payload not hex: {e}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::execution(format!("memory read interrupted: {e}")))?;
        debug!(address, length, received = bytes.len(), "read memory");
        Ok(bytes.to_vec())
    }

    async fn write_memory(&self, address: u16, data: &[u8]) -> BackendResult {
        if data.len() <= FORM_WRITE_LIMIT {
            let response = self
                .dispatch(self.client.put(self.url("/v1/machine:writemem")).form(&[
                    ("address", format_address(address)),
                    ("data", bytes_to_plain_hex(data)),
                ]))
                .await?;
            return self.to_response(response).await;
        }
        self.post_payload(
            "/v1/machine:writemem",
            &[("address", format_address(address))],
            data,
        )
        .await
    }

    async fn read_screen(&self) -> BackendResult<String> {
        let bytes = self
            .read_memory(SCREEN_ADDRESS, (SCREEN_COLUMNS * SCREEN_ROWS) as u32)
            .await?;
        Ok(decode_screen(&bytes))
    }

    async fn read_debug_reg(&self) -> BackendResult {
        let response = self
            .dispatch(self.client.get(self.url("/v1/machine:debugreg")))
            .await?;
        self.to_response(response).await
    }

    async fn write_debug_reg(&self, value: u8) -> BackendResult {
        self.put_op(
            "/v1/machine:debugreg",
            &[("value", format!("{value:02X}"))],
        )
        .await
    }

    async fn load_prg(&self, data: &[u8]) -> BackendResult {
        self.post_payload("/v1/runners:load_prg", &[], data).await
    }

    async fn run_prg(&self, data: &[u8]) -> BackendResult {
        self.post_payload("/v1/runners:run_prg", &[], data).await
    }

    async fn run_prg_file(&self, path: &str) -> BackendResult {
        self.put_op("/v1/runners:run_prg", &[("file", path.to_string())])
            .await
    }

    async fn run_crt(&self, data: &[u8]) -> BackendResult {
        self.post_payload("/v1/runners:run_crt", &[], data).await
    }

    async fn run_crt_file(&self, path: &str) -> BackendResult {
        self.put_op("/v1/runners:run_crt", &[("file", path.to_string())])
            .await
    }

    async fn sidplay_file(&self, path: &str, song: Option<u8>) -> BackendResult {
        let mut query = vec![("file", path.to_string())];
        if let Some(n) = song {
            query.push(("songnr", n.to_string()));
        }
        self.put_op("/v1/runners:sidplay", &query).await
    }

    async fn sidplay_attachment(&self, data: &[u8], song: Option<u8>) -> BackendResult {
        let mut query = Vec::new();
        if let Some(n) = song {
            query.push(("songnr", n.to_string()));
        }
        self.post_payload("/v1/runners:sidplay", &query, data).await
    }

    async fn modplay_file(&self, path: &str) -> BackendResult {
        self.put_op("/v1/runners:modplay", &[("file", path.to_string())])
            .await
    }

    async fn list_drives(&self) -> BackendResult<Value> {
        let response = self
            .dispatch(self.client.get(self.url("/v1/drives")))
            .await?;
        self.json_body(response, "drive list").await
    }

    async fn mount_disk(&self, drive: &str, path: &str, mode: Option<&str>) -> BackendResult {
        let mut query = vec![("image", path.to_string())];
        if let Some(m) = mode {
            query.push(("mode", m.to_string()));
        }
        self.put_op(&format!("/v1/drives/{drive}:mount"), &query)
            .await
    }

    async fn remove_disk(&self, drive: &str) -> BackendResult {
        self.put_op(&format!("/v1/drives/{drive}:remove"), &[]).await
    }

    async fn reset_drive(&self, drive: &str) -> BackendResult {
        self.put_op(&format!("/v1/drives/{drive}:reset"), &[]).await
    }

    async fn drive_on(&self, drive: &str) -> BackendResult {
        self.put_op(&format!("/v1/drives/{drive}:on"), &[]).await
    }

    async fn drive_off(&self, drive: &str) -> BackendResult {
        self.put_op(&format!("/v1/drives/{drive}:off"), &[]).await
    }

    async fn set_drive_mode(&self, drive: &str, mode: &str) -> BackendResult {
        self.put_op(
            &format!("/v1/drives/{drive}:set_mode"),
            &[("mode", mode.to_string())],
        )
        .await
    }

    async fn load_drive_rom(&self, drive: &str, path: &str) -> BackendResult {
        self.put_op(
            &format!("/v1/drives/{drive}:load_rom"),
            &[("file", path.to_string())],
        )
        .await
    }

    async fn start_stream(&self, kind: &str, destination: Option<&str>) -> BackendResult {
        let mut query = Vec::new();
        if let Some(dest) = destination {
            query.push(("ip", dest.to_string()));
        }
        self.put_op(&format!("/v1/streams/{kind}:start"), &query)
            .await
    }

    async fn stop_stream(&self, kind: &str) -> BackendResult {
        self.put_op(&format!("/v1/streams/{kind}:stop"), &[]).await
    }

    async fn list_config_categories(&self) -> BackendResult<Vec<String>> {
        let response = self
            .dispatch(self.client.get(self.url("/v1/configs")))
            .await?;
        let body = self.json_body(response, "config categories").await?;
        let list = body
            .get("categories")
            .and_then(Value::as_array)
            .cloned()
            .or_else(|| body.as_array().cloned())
            .ok_or_else(|| BridgeError::execution("config categories payload has no list"))?;
        Ok(list
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect())
    }

    async fn get_config_category(&self, category: &str) -> BackendResult<Value> {
        let response = self
            .dispatch(self.client.get(self.url(&format!("/v1/configs/{category}"))))
            .await?;
        self.json_body(response, &format!("config category '{category}'"))
            .await
    }

    async fn set_config_item(&self, category: &str, item: &str, value: &Value) -> BackendResult {
        let response = self
            .dispatch(
                self.client
                    .put(self.url(&format!("/v1/configs/{category}/{item}")))
                    .json(&json!({"value": value})),
            )
            .await?;
        self.to_response(response).await
    }

    async fn update_config_batch(&self, categories: &Value) -> BackendResult {
        let response = self
            .dispatch(self.client.post(self.url("/v1/configs")).json(categories))
            .await?;
        self.to_response(response).await
    }

    async fn load_from_flash(&self) -> BackendResult {
        self.put_op("/v1/configs:load_from_flash", &[]).await
    }

    async fn save_to_flash(&self) -> BackendResult {
        self.put_op("/v1/configs:save_to_flash", &[]).await
    }

    async fn reset_config_defaults(&self) -> BackendResult {
        self.put_op("/v1/configs:reset_to_default", &[]).await
    }

    async fn file_info(&self, path: &str) -> BackendResult<Value> {
        let response = self
            .dispatch(
                self.client
                    .get(self.url("/v1/files:info"))
                    .query(&[("path", path)]),
            )
            .await?;
        self.json_body(response, &format!("file info for '{path}'"))
            .await
    }

    async fn list_files(&self, root: &str) -> BackendResult<Value> {
        let response = self
            .dispatch(
                self.client
                    .get(self.url("/v1/files:list"))
                    .query(&[("path", root), ("recursive", "true")]),
            )
            .await?;
        self.json_body(response, &format!("file listing under '{root}'"))
            .await
    }

    async fn create_disk_image(
        &self,
        kind: DiskImageKind,
        path: &str,
        label: Option<&str>,
        tracks: Option<u32>,
    ) -> BackendResult {
        let mut query = vec![("path", path.to_string())];
        if let Some(l) = label {
            query.push(("diskname", l.to_string()));
        }
        if let Some(t) = tracks {
            query.push(("tracks", t.to_string()));
        }
        self.put_op(&format!("/v1/files:create_{}", kind.as_str()), &query)
            .await
    }

    async fn version(&self) -> BackendResult<Value> {
        let response = self
            .dispatch(self.client.get(self.url("/v1/version")))
            .await?;
        self.json_body(response, "version").await
    }

    async fn info(&self) -> BackendResult<Value> {
        let response = self.dispatch(self.client.get(self.url("/v1/info"))).await?;
        self.json_body(response, "info").await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
