// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drive bus control.

use async_trait::async_trait;
use c64b_error::{BridgeError, ToolResult};
use c64b_schema::{OpVariant, args, object, op_union, split_op, string};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};

pub struct DrivesModule;

fn drive_field() -> c64b_schema::Schema {
    string().min_len(1).description("drive id, e.g. \"a\"")
}

fn variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new("list", "List the drive bus", object()),
        OpVariant::new(
            "mount",
            "Mount a disk image",
            object()
                .field("drive", drive_field())
                .field("path", string().min_len(1))
                .optional(
                    "mode",
                    string().one_of(&["readwrite", "readonly", "unlinked"]),
                ),
        ),
        OpVariant::new(
            "remove",
            "Remove the mounted image",
            object().field("drive", drive_field()),
        ),
        OpVariant::new("reset", "Reset a drive", object().field("drive", drive_field())),
        OpVariant::new("on", "Turn a drive on", object().field("drive", drive_field())),
        OpVariant::new("off", "Turn a drive off", object().field("drive", drive_field())),
        OpVariant::new(
            "set_mode",
            "Change a drive's emulation mode",
            object()
                .field("drive", drive_field())
                .field("mode", string().min_len(1)),
        ),
        OpVariant::new(
            "load_rom",
            "Load a custom drive ROM",
            object()
                .field("drive", drive_field())
                .field("path", string().min_len(1)),
        ),
    ]
}

#[async_trait]
impl ToolModule for DrivesModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("drives", "Drive bus control")
            .default_tags(&["drives"])
            .tool(
                ToolSpec::new(
                    "drive_control",
                    "List, mount, and control the drive bus",
                    op_union(&variants()),
                )
                .example(json!({"op": "mount", "drive": "a", "path": "/disks/games.d64"})),
            )
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        if name != "drive_control" {
            return Err(BridgeError::validation(
                format!("unknown tool '{name}'"),
                "$.name",
            ));
        }
        let (op, payload) = split_op(&arguments, &variants())?;

        if op == "list" {
            let listing = ctx.backend.list_drives().await?;
            return Ok(ToolResult::json("drive bus listed", listing));
        }

        let drive = args::required_str(&payload, "drive")?;
        let response = match op.as_str() {
            "mount" => {
                let path = args::required_str(&payload, "path")?;
                let mode = args::opt_str(&payload, "mode");
                ctx.backend.mount_disk(drive, path, mode).await?
            }
            "remove" => ctx.backend.remove_disk(drive).await?,
            "reset" => ctx.backend.reset_drive(drive).await?,
            "on" => ctx.backend.drive_on(drive).await?,
            "off" => ctx.backend.drive_off(drive).await?,
            "set_mode" => {
                let mode = args::required_str(&payload, "mode")?;
                ctx.backend.set_drive_mode(drive, mode).await?
            }
            "load_rom" => {
                let path = args::required_str(&payload, "path")?;
                ctx.backend.load_drive_rom(drive, path).await?
            }
            other => unreachable!("split_op admits only declared ops, got '{other}'"),
        };
        let response = response.require(&format!("failure during drive {op}"))?;
        Ok(ToolResult::json(
            format!("drive {drive}: {op} ok"),
            serde_json::to_value(&response)?,
        ))
    }
}
