// SPDX-License-Identifier: MIT OR Apache-2.0
//! Machine power and execution control.

use async_trait::async_trait;
use c64b_error::{BridgeError, ToolResult};
use c64b_schema::{OpVariant, object, op_union, split_op};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};

pub struct MachineModule;

fn variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new("pause", "Halt the machine (DMA pause)", object()),
        OpVariant::new("resume", "Resume a paused machine", object()),
        OpVariant::new("reset", "Soft-reset the machine", object()),
        OpVariant::new("reboot", "Reboot the device firmware", object()),
        OpVariant::new("poweroff", "Power the machine off", object()),
        OpVariant::new("menu", "Press the Ultimate menu button", object()),
    ]
}

fn failure_label(op: &str) -> String {
    match op {
        "pause" => "failure while pausing".to_string(),
        "resume" => "failure while resuming".to_string(),
        other => format!("failure while executing machine {other}"),
    }
}

#[async_trait]
impl ToolModule for MachineModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("machine", "Machine power and execution control")
            .default_tags(&["machine"])
            .tool(
                ToolSpec::new(
                    "machine_control",
                    "Pause, resume, reset, reboot, power off, or open the menu",
                    op_union(&variants()),
                )
                .example(json!({"op": "reset"}))
                .hint("Pair pause with resume; the pause state is a global device resource"),
            )
            .tool(ToolSpec::new(
                "read_screen",
                "Read the current text screen contents",
                object().json_schema(),
            ))
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        match name {
            "machine_control" => {
                let (op, _payload) = split_op(&arguments, &variants())?;
                let response = match op.as_str() {
                    "pause" => ctx.backend.pause().await?,
                    "resume" => ctx.backend.resume().await?,
                    "reset" => ctx.backend.reset().await?,
                    "reboot" => ctx.backend.reboot().await?,
                    "poweroff" => ctx.backend.poweroff().await?,
                    "menu" => ctx.backend.menu_button().await?,
                    other => unreachable!("split_op admits only declared ops, got '{other}'"),
                };
                let response = response.require(&failure_label(&op))?;
                Ok(ToolResult::json(
                    format!("machine {op} ok"),
                    serde_json::to_value(&response)?,
                ))
            }
            "read_screen" => {
                object().parse(&arguments, "$")?;
                let screen = ctx.backend.read_screen().await?;
                Ok(ToolResult::json(screen.clone(), json!({"screen": screen})))
            }
            other => Err(BridgeError::validation(
                format!("unknown tool '{other}'"),
                "$.name",
            )),
        }
    }
}
