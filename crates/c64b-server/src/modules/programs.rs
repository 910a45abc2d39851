// SPDX-License-Identifier: MIT OR Apache-2.0
//! Program runners. Running a PRG payload works on both platforms; running
//! from a device path or starting a cartridge needs the real device.

use async_trait::async_trait;
use c64b_backend::Platform;
use c64b_error::{BridgeError, ToolResult};
use c64b_format::hex_to_bytes;
use c64b_schema::{OpVariant, args, object, op_union, split_op, string};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};

pub struct ProgramsModule;

fn variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new(
            "prg",
            "Load and run a PRG payload",
            object().field("data", string().min_len(2).description("PRG bytes as hex")),
        ),
        OpVariant::new(
            "prg_file",
            "Run a PRG from a device filesystem path",
            object().field("path", string().min_len(1)),
        ),
        OpVariant::new(
            "crt",
            "Start a cartridge image payload",
            object().field("data", string().min_len(2).description("CRT bytes as hex")),
        ),
    ]
}

#[async_trait]
impl ToolModule for ProgramsModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("programs", "Load and run programs")
            .default_tags(&["programs"])
            .tool(
                ToolSpec::new(
                    "run_program",
                    "Run a PRG payload, a PRG file, or a cartridge image",
                    op_union(&variants()),
                )
                .example(json!({"op": "prg_file", "path": "/games/elite.prg"}))
                .platforms(&[Platform::Emulator]),
            )
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        if name != "run_program" {
            return Err(BridgeError::validation(
                format!("unknown tool '{name}'"),
                "$.name",
            ));
        }
        let (op, payload) = split_op(&arguments, &variants())?;
        let (response, what) = match op.as_str() {
            "prg" => {
                let data = hex_to_bytes(args::required_str(&payload, "data")?)
                    .map_err(|e| e.at_path("$.data"))?;
                (
                    ctx.backend.run_prg(&data).await?,
                    format!("PRG payload ({} bytes)", data.len()),
                )
            }
            "prg_file" => {
                let path = args::required_str(&payload, "path")?;
                (ctx.backend.run_prg_file(path).await?, path.to_string())
            }
            "crt" => {
                let data = hex_to_bytes(args::required_str(&payload, "data")?)
                    .map_err(|e| e.at_path("$.data"))?;
                (
                    ctx.backend.run_crt(&data).await?,
                    format!("CRT payload ({} bytes)", data.len()),
                )
            }
            other => unreachable!("split_op admits only declared ops, got '{other}'"),
        };
        let response = response.require(&format!("failure while running {what}"))?;
        Ok(ToolResult::json(
            format!("running {what}"),
            serde_json::to_value(&response)?,
        ))
    }
}
