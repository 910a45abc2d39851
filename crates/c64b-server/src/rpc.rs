// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal line-delimited JSON-RPC loop for the tool surface.
//!
//! Only `tools/list` and `tools/call` are served; the full MCP transport is
//! an external collaborator. Requests without an id are notifications and
//! get no response.

use c64b_tools::{ToolContext, ToolRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Handle one decoded request. Returns `None` for notifications.
pub async fn handle_request(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    request: &Value,
) -> Option<Value> {
    let id = request.get("id").cloned()?;
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    debug!(method, "handling request");

    let body = match method {
        "tools/list" => {
            let tools: Vec<Value> = registry
                .list_tools()
                .iter()
                .map(|tool| tool.to_listing())
                .collect();
            json!({"result": {"tools": tools}})
        }
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let result = registry.invoke(name, arguments, ctx).await;
            json!({"result": result})
        }
        other => json!({
            "error": {"code": -32601, "message": format!("method '{other}' not found")},
        }),
    };

    let mut response = json!({"jsonrpc": "2.0", "id": id});
    if let (Some(out), Some(body)) = (response.as_object_mut(), body.as_object()) {
        for (key, value) in body {
            out.insert(key.clone(), value.clone());
        }
    }
    Some(response)
}

/// Serve requests from stdin until EOF or ctrl-c.
pub async fn serve(registry: Arc<ToolRegistry>, ctx: ToolContext) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            info!("stdin closed, shutting down");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        // Each request gets its own context; the handles inside are shared.
        let request_ctx = ctx.clone();
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => handle_request(&registry, &request_ctx, &request).await,
            Err(err) => Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": format!("parse error: {err}")},
            })),
        };

        if let Some(response) = response {
            let mut bytes = serde_json::to_vec(&response)?;
            bytes.push(b'\n');
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_registry;
    use c64b_backend::{Platform, PlatformHandle, PlatformStatus};
    use c64b_backend_mock::MockBackend;
    use c64b_scheduler::{Scheduler, persist::TaskPaths};

    fn setup(dir: &tempfile::TempDir) -> (Arc<ToolRegistry>, ToolContext) {
        let scheduler = Scheduler::new(TaskPaths::in_home(dir.path()));
        let registry = Arc::new(build_registry(scheduler).unwrap());
        let ctx = ToolContext::new(
            Arc::new(MockBackend::new()),
            PlatformHandle::new(PlatformStatus::new(Platform::Device, json!({}))),
        );
        (registry, ctx)
    }

    #[tokio::test]
    async fn tools_list_returns_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ctx) = setup(&dir);
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        let response = handle_request(&registry, &ctx, &request).await.unwrap();
        assert_eq!(response["id"], 1);
        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(tools.len() >= 15);
        assert!(tools.iter().any(|t| t["name"] == "verify_and_write"));
        assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));
    }

    #[tokio::test]
    async fn tools_call_dispatches_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ctx) = setup(&dir);
        let request = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "memory_read", "arguments": {"address": "$0400", "length": 2}},
        });
        let response = handle_request(&registry, &ctx, &request).await.unwrap();
        let result = &response["result"];
        assert!(result.get("isError").is_none());
        assert_eq!(result["structuredContent"]["data"]["data"], "$0000");
    }

    #[tokio::test]
    async fn tools_call_error_is_an_envelope_not_a_rpc_error() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ctx) = setup(&dir);
        let request = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "background_task", "arguments": {"op": "no_such_op"}},
        });
        let response = handle_request(&registry, &ctx, &request).await.unwrap();
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["metadata"]["error"]["kind"], "validation");
        assert_eq!(result["metadata"]["error"]["path"], "$.op");
        let allowed = result["metadata"]["error"]["details"]["allowed"]
            .as_array()
            .unwrap();
        assert_eq!(
            allowed,
            &vec![json!("list"), json!("start"), json!("stop"), json!("stop_all")]
        );
    }

    #[tokio::test]
    async fn unknown_method_is_a_rpc_error() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ctx) = setup(&dir);
        let request = json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"});
        let response = handle_request(&registry, &ctx, &request).await.unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ctx) = setup(&dir);
        let request = json!({"jsonrpc": "2.0", "method": "tools/list"});
        assert!(handle_request(&registry, &ctx, &request).await.is_none());
    }
}
