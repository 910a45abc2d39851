// SPDX-License-Identifier: MIT OR Apache-2.0
//! Verified mutating memory operations.
//!
//! Two operations define the discipline every invasive tool follows:
//! [`verify_and_write`] brackets a write in pause → pre-read → masked
//! compare → write → read-back → resume, and [`dump_memory`] streams
//! chunked reads into a file with a SHA-256 manifest. In both, resume runs
//! on every exit path once pause has succeeded, and a resume failure is
//! logged without masking the original error.

#![deny(unsafe_code)]

use c64b_backend::Backend;
use c64b_error::BridgeError;
use c64b_format::{bytes_to_hex, bytes_to_plain_hex, display_address};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, warn};

/// End of the 16-bit address space; chunks must not reach past it.
const ADDRESS_SPACE_END: u32 = 0x10000;

/// Resume after a pause, logging failures instead of raising them.
async fn resume_quietly(backend: &dyn Backend, context: &str) {
    match backend.resume().await {
        Ok(resp) if resp.success => {}
        Ok(resp) => warn!(details = ?resp.details, "resume reported failure after {context}"),
        Err(err) => warn!(error = %err, "failed to resume after {context}"),
    }
}

// ---------------------------------------------------------------------------
// verify_and_write
// ---------------------------------------------------------------------------

/// One pre-write expectation mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Byte offset from the start address.
    pub offset: usize,
    /// Expected byte, canonical hex.
    pub expected: String,
    /// Actual byte, canonical hex.
    pub actual: String,
}

/// A verified write request.
#[derive(Debug, Clone)]
pub struct VerifyWriteRequest {
    /// Start address.
    pub address: u16,
    /// Bytes to write.
    pub bytes: Vec<u8>,
    /// Expected pre-write contents, compared under `mask`.
    pub expected: Option<Vec<u8>>,
    /// Per-byte comparison mask; missing trailing bytes default to `0xFF`.
    pub mask: Option<Vec<u8>>,
    /// Abort before writing when the expectation does not hold.
    pub abort_on_mismatch: bool,
}

impl VerifyWriteRequest {
    /// A request writing `bytes` at `address` with default settings.
    pub fn new(address: u16, bytes: Vec<u8>) -> Self {
        Self {
            address,
            bytes,
            expected: None,
            mask: None,
            abort_on_mismatch: true,
        }
    }
}

/// Outcome of a successful verified write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyWriteOutcome {
    /// Start address, canonical form.
    pub address: String,
    /// Bytes written, canonical hex.
    pub wrote: String,
    /// Pre-write contents, canonical hex.
    pub pre_read: String,
    /// Post-write read-back, canonical hex.
    pub post_read: String,
    /// Expectation mismatches observed (non-empty only when the caller
    /// disabled abort-on-mismatch).
    pub mismatches: Vec<Mismatch>,
}

/// Write bytes with pause bracketing, pre-write expectation checks, and
/// post-write read-back verification.
pub async fn verify_and_write(
    backend: &dyn Backend,
    request: VerifyWriteRequest,
) -> Result<VerifyWriteOutcome, BridgeError> {
    if request.bytes.is_empty() {
        return Err(BridgeError::validation("no bytes to write", "$.bytes"));
    }
    if request.address as usize + request.bytes.len() > ADDRESS_SPACE_END as usize {
        return Err(BridgeError::execution("wrap past end of address space")
            .with_details(json!({
                "address": display_address(request.address),
                "length": request.bytes.len(),
            })));
    }

    backend.pause().await?.require("failure while pausing")?;
    let result = write_verified(backend, &request).await;
    resume_quietly(backend, "verified write").await;
    result
}

async fn write_verified(
    backend: &dyn Backend,
    request: &VerifyWriteRequest,
) -> Result<VerifyWriteOutcome, BridgeError> {
    let expected_len = request.expected.as_ref().map_or(0, Vec::len);
    let pre_len = request.bytes.len().max(expected_len).max(1);
    let pre_read = backend
        .read_memory(request.address, pre_len as u32)
        .await?;

    let mut mismatches = Vec::new();
    if let Some(expected) = &request.expected {
        for (offset, want) in expected.iter().enumerate() {
            let mask = request
                .mask
                .as_ref()
                .and_then(|m| m.get(offset))
                .copied()
                .unwrap_or(0xFF);
            let got = pre_read.get(offset).copied().unwrap_or(0);
            if (got & mask) != (want & mask) {
                mismatches.push(Mismatch {
                    offset,
                    expected: bytes_to_hex(&[*want]),
                    actual: bytes_to_hex(&[got]),
                });
            }
        }
        if !mismatches.is_empty() && request.abort_on_mismatch {
            return Err(
                BridgeError::execution("pre-write expectation mismatch").with_details(json!({
                    "address": display_address(request.address),
                    "mismatches": mismatches,
                })),
            );
        }
    }

    backend
        .write_memory(request.address, &request.bytes)
        .await?
        .require("failure while writing memory")?;

    let post_read = backend
        .read_memory(request.address, request.bytes.len() as u32)
        .await?;

    let diffs: Vec<Mismatch> = request
        .bytes
        .iter()
        .enumerate()
        .filter_map(|(offset, want)| {
            let got = post_read.get(offset).copied();
            if got != Some(*want) {
                Some(Mismatch {
                    offset,
                    expected: bytes_to_hex(&[*want]),
                    actual: bytes_to_hex(&got.map(|b| vec![b]).unwrap_or_default()),
                })
            } else {
                None
            }
        })
        .collect();

    if !diffs.is_empty() {
        return Err(
            BridgeError::execution("post-write verification failed").with_details(json!({
                "address": display_address(request.address),
                "diffs": diffs,
            })),
        );
    }

    Ok(VerifyWriteOutcome {
        address: display_address(request.address),
        wrote: bytes_to_hex(&request.bytes),
        pre_read: bytes_to_hex(&pre_read),
        post_read: bytes_to_hex(&post_read),
        mismatches,
    })
}

// ---------------------------------------------------------------------------
// dump_memory
// ---------------------------------------------------------------------------

/// Output encoding of a memory dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// Uppercase hex text (UTF-8).
    Hex,
    /// Raw bytes.
    Binary,
}

/// A chunked dump request.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    /// Start address.
    pub address: u16,
    /// Number of bytes, 1..=65536.
    pub length: u32,
    /// File to write the dump to.
    pub output_path: PathBuf,
    /// Output encoding.
    pub format: DumpFormat,
    /// Read chunk size, 1..=4096.
    pub chunk_size: u32,
    /// Pause the machine around the reads.
    pub pause_during_read: bool,
    /// Extra attempts per chunk after the first failure.
    pub retries: u32,
}

impl DumpRequest {
    /// A request with the spec defaults: hex, 512-byte chunks, paused, one
    /// retry.
    pub fn new(address: u16, length: u32, output_path: impl Into<PathBuf>) -> Self {
        Self {
            address,
            length,
            output_path: output_path.into(),
            format: DumpFormat::Hex,
            chunk_size: 512,
            pause_during_read: true,
            retries: 1,
        }
    }
}

/// Manifest written next to a dump as `<outputPath>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpManifest {
    /// Start address.
    pub address: u16,
    /// Dumped byte count.
    pub length: u32,
    /// Chunk size used for the reads.
    pub chunk_size: u32,
    /// Output encoding.
    pub format: DumpFormat,
    /// SHA-256 of the raw bytes, uppercase hex.
    pub checksum: String,
    /// The dump file.
    pub output_path: String,
    /// Manifest creation time.
    pub created_at: DateTime<Utc>,
}

/// Dump memory to a file in chunks and write the SHA-256 manifest.
pub async fn dump_memory(
    backend: &dyn Backend,
    request: DumpRequest,
) -> Result<DumpManifest, BridgeError> {
    if request.length == 0 || request.length > 0x10000 {
        return Err(
            BridgeError::validation("length must be between 1 and 65536", "$.length")
                .with_details(json!(request.length)),
        );
    }
    if request.chunk_size == 0 || request.chunk_size > 4096 {
        return Err(
            BridgeError::validation("chunkSize must be between 1 and 4096", "$.chunkSize")
                .with_details(json!(request.chunk_size)),
        );
    }

    if request.pause_during_read {
        backend.pause().await?.require("failure while pausing")?;
        let result = read_and_persist(backend, &request).await;
        resume_quietly(backend, "memory dump").await;
        result
    } else {
        read_and_persist(backend, &request).await
    }
}

async fn read_and_persist(
    backend: &dyn Backend,
    request: &DumpRequest,
) -> Result<DumpManifest, BridgeError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(request.length as usize);
    let mut offset = 0u32;

    while offset < request.length {
        let n = request.chunk_size.min(request.length - offset);
        let start = request.address as u32 + offset;
        let end = start + n;
        if end > ADDRESS_SPACE_END {
            return Err(
                BridgeError::execution("wrap past end of address space").with_details(json!({
                    "chunkStart": start,
                    "chunkEnd": end,
                })),
            );
        }

        let chunk = read_chunk(backend, start as u16, n, request.retries).await?;
        if chunk.len() != n as usize {
            return Err(BridgeError::execution(format!(
                "short read: expected {n} bytes, got {}",
                chunk.len()
            ))
            .with_details(json!({"chunkStart": start})));
        }
        buffer.extend_from_slice(&chunk);
        offset += n;
    }

    if let Some(parent) = request.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    match request.format {
        DumpFormat::Hex => {
            tokio::fs::write(&request.output_path, bytes_to_plain_hex(&buffer)).await?
        }
        DumpFormat::Binary => tokio::fs::write(&request.output_path, &buffer).await?,
    }

    let checksum = bytes_to_plain_hex(&Sha256::digest(&buffer));
    let manifest = DumpManifest {
        address: request.address,
        length: request.length,
        chunk_size: request.chunk_size,
        format: request.format,
        checksum,
        output_path: request.output_path.display().to_string(),
        created_at: Utc::now(),
    };
    let manifest_path = PathBuf::from(format!("{}.json", request.output_path.display()));
    tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?).await?;
    debug!(path = %manifest_path.display(), length = request.length, "wrote dump manifest");
    Ok(manifest)
}

async fn read_chunk(
    backend: &dyn Backend,
    address: u16,
    length: u32,
    retries: u32,
) -> Result<Vec<u8>, BridgeError> {
    let mut attempt = 0;
    loop {
        match backend.read_memory(address, length).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(address, attempt, error = %err, "retrying chunk read");
            }
            Err(err) => return Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use c64b_backend_mock::MockBackend;
    use c64b_error::ErrorKind;

    #[tokio::test]
    async fn verify_and_write_happy_path() {
        let mock = MockBackend::new();
        let mut request = VerifyWriteRequest::new(0x0400, vec![0xAA, 0x55]);
        request.expected = Some(vec![0x00, 0x00]);
        let outcome = verify_and_write(&mock, request).await.unwrap();

        assert_eq!(outcome.wrote, "$AA55");
        assert_eq!(outcome.pre_read, "$0000");
        assert!(outcome.post_read.starts_with("$AA55"));
        assert!(outcome.mismatches.is_empty());
        assert_eq!(mock.count("pause"), 1);
        assert_eq!(mock.count("resume"), 1);
        assert_eq!(mock.peek(0x0400, 2), vec![0xAA, 0x55]);
    }

    #[tokio::test]
    async fn mismatch_aborts_and_still_resumes() {
        let mock = MockBackend::new();
        mock.set_memory(0x0400, &[0x01, 0x02]);
        let mut request = VerifyWriteRequest::new(0x0400, vec![0xAA, 0x55]);
        request.expected = Some(vec![0x00, 0x00]);
        let err = verify_and_write(&mock, request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Execution);
        let meta = err.metadata();
        assert_eq!(meta["details"]["mismatches"][0]["offset"], 0);
        assert_eq!(meta["details"]["mismatches"][0]["expected"], "$00");
        assert_eq!(meta["details"]["mismatches"][0]["actual"], "$01");
        assert_eq!(mock.count("resume"), 1);
        // The write never happened.
        assert_eq!(mock.peek(0x0400, 2), vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn mask_suppresses_irrelevant_bits() {
        let mock = MockBackend::new();
        mock.set_memory(0x0400, &[0x0F]);
        let mut request = VerifyWriteRequest::new(0x0400, vec![0x42]);
        request.expected = Some(vec![0x07]);
        request.mask = Some(vec![0x07]); // only low three bits must match
        let outcome = verify_and_write(&mock, request).await.unwrap();
        assert!(outcome.mismatches.is_empty());
    }

    #[tokio::test]
    async fn mismatch_without_abort_proceeds_and_reports() {
        let mock = MockBackend::new();
        mock.set_memory(0x0400, &[0x01]);
        let mut request = VerifyWriteRequest::new(0x0400, vec![0xAA]);
        request.expected = Some(vec![0x00]);
        request.abort_on_mismatch = false;
        let outcome = verify_and_write(&mock, request).await.unwrap();
        assert_eq!(outcome.mismatches.len(), 1);
        assert_eq!(mock.peek(0x0400, 1), vec![0xAA]);
    }

    #[tokio::test]
    async fn failed_pause_is_an_execution_error() {
        let mock = MockBackend::new();
        mock.fail_op("pause");
        let err = verify_and_write(&mock, VerifyWriteRequest::new(0x0400, vec![0x01]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failure while pausing");
        // Pause never took effect, so no resume is attempted.
        assert_eq!(mock.count("resume"), 0);
    }

    #[tokio::test]
    async fn failed_write_still_resumes() {
        let mock = MockBackend::new();
        mock.fail_op("write_memory");
        let err = verify_and_write(&mock, VerifyWriteRequest::new(0x0400, vec![0x01]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failure while writing memory");
        assert_eq!(mock.count("resume"), 1);
    }

    #[tokio::test]
    async fn dump_writes_hex_and_matching_manifest() {
        let mock = MockBackend::new();
        let data: Vec<u8> = (0u8..32).collect();
        mock.set_memory(0x2000, &data);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dump.hex");

        let mut request = DumpRequest::new(0x2000, 32, &out);
        request.chunk_size = 8;
        let manifest = dump_memory(&mock, request).await.unwrap();

        // 4 chunk reads of 8 bytes each, bracketed by pause/resume.
        assert_eq!(mock.count("read_memory"), 4);
        assert_eq!(mock.count("pause"), 1);
        assert_eq!(mock.count("resume"), 1);

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(text, bytes_to_plain_hex(&data));

        assert_eq!(manifest.length, 32);
        assert_eq!(manifest.chunk_size, 8);
        assert_eq!(manifest.format, DumpFormat::Hex);
        assert_eq!(manifest.checksum, bytes_to_plain_hex(&Sha256::digest(&data)));

        let on_disk: DumpManifest = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("dump.hex.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk, manifest);
    }

    #[tokio::test]
    async fn dump_binary_writes_raw_bytes() {
        let mock = MockBackend::new();
        mock.set_memory(0x1000, &[0xDE, 0xAD]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dump.bin");
        let mut request = DumpRequest::new(0x1000, 2, &out);
        request.format = DumpFormat::Binary;
        request.pause_during_read = false;
        dump_memory(&mock, request).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(mock.count("pause"), 0);
    }

    #[tokio::test]
    async fn dump_retries_transient_read_failures() {
        let mock = MockBackend::new();
        mock.fail_next_reads(1);
        let dir = tempfile::tempdir().unwrap();
        let request = DumpRequest::new(0x0000, 4, dir.path().join("d.hex"));
        dump_memory(&mock, request).await.unwrap();
        // First read failed, the retry succeeded.
        assert_eq!(mock.count("read_memory"), 2);
    }

    #[tokio::test]
    async fn dump_gives_up_after_exhausting_retries() {
        let mock = MockBackend::new();
        mock.fail_next_reads(2);
        let dir = tempfile::tempdir().unwrap();
        let mut request = DumpRequest::new(0x0000, 4, dir.path().join("d.hex"));
        request.retries = 1;
        let err = dump_memory(&mock, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(mock.count("resume"), 1);
    }

    #[tokio::test]
    async fn dump_rejects_wrap_past_end_of_address_space() {
        let mock = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let mut request = DumpRequest::new(0xFFF0, 32, dir.path().join("d.hex"));
        request.pause_during_read = false;
        let err = dump_memory(&mock, request).await.unwrap_err();
        assert!(err.to_string().contains("wrap past end of address space"));
    }

    #[tokio::test]
    async fn dump_validates_length_and_chunk_size() {
        let mock = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let mut request = DumpRequest::new(0, 0, dir.path().join("d.hex"));
        let err = dump_memory(&mock, request.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        request.length = 16;
        request.chunk_size = 5000;
        let err = dump_memory(&mock, request).await.unwrap_err();
        assert!(err.to_string().contains("$.chunkSize"));
    }
}
