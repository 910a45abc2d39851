// SPDX-License-Identifier: MIT OR Apache-2.0
//! Maps a persisted task operation name onto facade calls.
//!
//! Legacy aliases (`read_memory`, `write_memory`) are normalised, and
//! unrecognised names are deliberately a no-op success so custom task names
//! can be scheduled as heartbeat markers.

use c64b_backend::Backend;
use c64b_error::BridgeError;
use c64b_format::{hex_to_bytes, parse_address};
use c64b_schema::args::str_or;
use serde_json::Value;
use tracing::debug;

/// Default address used when a task supplies none (the screen origin).
const DEFAULT_ADDRESS: &str = "$0400";

/// Run one scheduled operation against the facade.
pub async fn run_operation(
    backend: &dyn Backend,
    operation: &str,
    args: &Value,
) -> Result<(), BridgeError> {
    let canonical = match operation {
        "read_memory" => "read",
        "write_memory" => "write",
        other => other,
    };

    match canonical {
        "read" => {
            let address = parse_address(str_or(args, "address", DEFAULT_ADDRESS))
                .map_err(|e| e.at_path("$.arguments.address"))?;
            let length = parse_count(args, "length", 16)?;
            backend.read_memory(address, length).await?;
            Ok(())
        }
        "write" => {
            let address = parse_address(str_or(args, "address", DEFAULT_ADDRESS))
                .map_err(|e| e.at_path("$.arguments.address"))?;
            let bytes = hex_to_bytes(str_or(args, "bytes", "$00"))
                .map_err(|e| e.at_path("$.arguments.bytes"))?;
            backend
                .write_memory(address, &bytes)
                .await?
                .require("scheduled write failed")?;
            Ok(())
        }
        "read_screen" => {
            backend.read_screen().await?;
            Ok(())
        }
        "menu_button" => {
            backend
                .menu_button()
                .await?
                .require("menu button press failed")?;
            Ok(())
        }
        other => {
            debug!(operation = other, "no adapter for operation, treating as no-op");
            Ok(())
        }
    }
}

/// Read a count argument that may arrive as a number or a numeric string.
fn parse_count(args: &Value, key: &str, default: u32) -> Result<u32, BridgeError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                BridgeError::validation("expected unsigned integer", format!("$.arguments.{key}"))
            }),
        Some(Value::String(s)) => s.trim().parse::<u32>().map_err(|_| {
            BridgeError::validation("expected numeric string", format!("$.arguments.{key}"))
                .with_details(Value::String(s.clone()))
        }),
        Some(other) => Err(BridgeError::validation(
            "expected number or numeric string",
            format!("$.arguments.{key}"),
        )
        .with_details(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c64b_backend_mock::MockBackend;
    use serde_json::json;

    #[tokio::test]
    async fn read_defaults_to_screen_origin() {
        let mock = MockBackend::new();
        run_operation(&mock, "read", &json!({})).await.unwrap();
        assert_eq!(mock.calls(), vec!["read_memory(0x0400,16)"]);
    }

    #[tokio::test]
    async fn read_memory_alias_normalises() {
        let mock = MockBackend::new();
        run_operation(&mock, "read_memory", &json!({"address": "$C000", "length": "4"}))
            .await
            .unwrap();
        assert_eq!(mock.calls(), vec!["read_memory(0xC000,4)"]);
    }

    #[tokio::test]
    async fn write_alias_writes_bytes() {
        let mock = MockBackend::new();
        run_operation(
            &mock,
            "write_memory",
            &json!({"address": "$0400", "bytes": "$AA55"}),
        )
        .await
        .unwrap();
        assert_eq!(mock.peek(0x0400, 2), vec![0xAA, 0x55]);
    }

    #[tokio::test]
    async fn write_defaults_to_single_zero_byte() {
        let mock = MockBackend::new();
        mock.set_memory(0x0400, &[0xFF]);
        run_operation(&mock, "write", &json!({})).await.unwrap();
        assert_eq!(mock.peek(0x0400, 1), vec![0x00]);
    }

    #[tokio::test]
    async fn screen_and_menu_dispatch() {
        let mock = MockBackend::new();
        run_operation(&mock, "read_screen", &json!({})).await.unwrap();
        run_operation(&mock, "menu_button", &json!({})).await.unwrap();
        assert_eq!(mock.count("read_screen"), 1);
        assert_eq!(mock.count("menu_button"), 1);
    }

    #[tokio::test]
    async fn unknown_operations_are_permissive_no_ops() {
        let mock = MockBackend::new();
        run_operation(&mock, "heartbeat", &json!({})).await.unwrap();
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn failing_facade_call_surfaces_as_error() {
        let mock = MockBackend::new();
        mock.fail_op("menu_button");
        let err = run_operation(&mock, "menu_button", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "menu button press failed");
    }

    #[tokio::test]
    async fn bad_length_string_is_a_validation_error() {
        let mock = MockBackend::new();
        let err = run_operation(&mock, "read", &json!({"length": "soon"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("$.arguments.length"));
    }
}
