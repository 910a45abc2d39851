// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identity tools, available on both platforms.

use async_trait::async_trait;
use c64b_backend::Platform;
use c64b_error::{BridgeError, ToolResult};
use c64b_schema::object;
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::Value;

pub struct SystemModule;

#[async_trait]
impl ToolModule for SystemModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("system", "Target identity and version")
            .default_tags(&["system"])
            .default_platforms(&[Platform::Device, Platform::Emulator])
            .tool(ToolSpec::new(
                "system_version",
                "Report the firmware or emulator version",
                object().json_schema(),
            ))
            .tool(ToolSpec::new(
                "system_info",
                "Report the target's identity descriptor",
                object().json_schema(),
            ))
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        object().parse(&arguments, "$")?;
        match name {
            "system_version" => {
                let version = ctx.backend.version().await?;
                Ok(ToolResult::json("version", version))
            }
            "system_info" => {
                let mut info = ctx.backend.info().await?;
                // Enrich with the selection details recorded at startup.
                let status = ctx.platform.get();
                if let Some(map) = info.as_object_mut() {
                    map.insert("platform".to_string(), serde_json::json!(status.id));
                    map.insert("selection".to_string(), status.details);
                }
                Ok(ToolResult::json("info", info))
            }
            other => Err(BridgeError::validation(
                format!("unknown tool '{other}'"),
                "$.name",
            )),
        }
    }
}
