// SPDX-License-Identifier: MIT OR Apache-2.0
//! Memory tools: reads, plain and verified writes, chunked dumps, and the
//! debug register.

use async_trait::async_trait;
use c64b_error::{BridgeError, ToolResult};
use c64b_format::{bytes_to_hex, display_address, hex_to_bytes, parse_address};
use c64b_memory::{DumpFormat, DumpRequest, VerifyWriteRequest, dump_memory, verify_and_write};
use c64b_schema::{OpVariant, Schema, args, boolean, integer, object, op_union, split_op, string};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};
use std::path::PathBuf;

pub struct MemoryModule;

fn debug_variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new("read", "Read the debug register", object()),
        OpVariant::new(
            "write",
            "Write the debug register",
            object().field("value", string().min_len(2).description("hex byte, e.g. $01")),
        ),
    ]
}

fn read_schema() -> Schema {
    object()
        .field("address", string().min_len(1).description("start address"))
        .optional(
            "length",
            integer().min(1).max(65536).description("bytes to read (default 16)"),
        )
}

fn write_schema() -> Schema {
    object()
        .field("address", string().min_len(1))
        .field("bytes", string().min_len(2).description("hex byte string"))
}

fn verify_schema() -> Schema {
    object()
        .field("address", string().min_len(1))
        .field("bytes", string().min_len(2))
        .optional("expected", string().description("expected pre-write contents"))
        .optional("mask", string().description("per-byte comparison mask"))
        .optional("abortOnMismatch", boolean())
}

fn dump_schema() -> Schema {
    object()
        .field("address", string().min_len(1))
        .field("length", integer().min(1).max(65536))
        .field("outputPath", string().min_len(1))
        .optional("format", string().one_of(&["hex", "binary"]))
        .optional("chunkSize", integer().min(1).max(4096))
        .optional("pauseDuringRead", boolean())
        .optional("retries", integer().min(0))
}

fn parse_address_arg(arguments: &Value) -> Result<u16, BridgeError> {
    parse_address(args::required_str(arguments, "address")?).map_err(|e| e.at_path("$.address"))
}

#[async_trait]
impl ToolModule for MemoryModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("memory", "Memory access with verification discipline")
            .default_tags(&["memory"])
            .default_resources(&["c64bridge://context/memory-map"])
            .tool(
                ToolSpec::new("memory_read", "Read bytes from memory", read_schema().json_schema())
                    .example(json!({"address": "$0400", "length": 16})),
            )
            .tool(ToolSpec::new(
                "memory_write",
                "Write bytes to memory without verification",
                write_schema().json_schema(),
            ))
            .tool(
                ToolSpec::new(
                    "verify_and_write",
                    "Write bytes with pause bracketing, expectation checks, and read-back verification",
                    verify_schema().json_schema(),
                )
                .example(json!({"address": "$0400", "bytes": "$AA55", "expected": "$0000"}))
                .hint("Prefer this over memory_write for anything the machine is executing"),
            )
            .tool(
                ToolSpec::new(
                    "memory_dump",
                    "Dump a memory range to a file with a SHA-256 manifest",
                    dump_schema().json_schema(),
                )
                .example(json!({"address": "$2000", "length": 8192, "outputPath": "dump.hex"})),
            )
            .tool(ToolSpec::new(
                "debug_register",
                "Read or write the debug register",
                op_union(&debug_variants()),
            ))
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        match name {
            "memory_read" => {
                read_schema().parse(&arguments, "$")?;
                let address = parse_address_arg(&arguments)?;
                let length = args::u64_or(&arguments, "length", 16)? as u32;
                let bytes = ctx.backend.read_memory(address, length).await?;
                let hex = bytes_to_hex(&bytes);
                Ok(ToolResult::json(
                    format!("{} bytes at {}: {hex}", bytes.len(), display_address(address)),
                    json!({
                        "address": display_address(address),
                        "length": bytes.len(),
                        "data": hex,
                    }),
                ))
            }
            "memory_write" => {
                write_schema().parse(&arguments, "$")?;
                let address = parse_address_arg(&arguments)?;
                let bytes = hex_to_bytes(args::required_str(&arguments, "bytes")?)
                    .map_err(|e| e.at_path("$.bytes"))?;
                ctx.backend
                    .write_memory(address, &bytes)
                    .await?
                    .require("failure while writing memory")?;
                Ok(ToolResult::json(
                    format!("wrote {} at {}", bytes_to_hex(&bytes), display_address(address)),
                    json!({"address": display_address(address), "wrote": bytes_to_hex(&bytes)}),
                ))
            }
            "verify_and_write" => {
                verify_schema().parse(&arguments, "$")?;
                let address = parse_address_arg(&arguments)?;
                let bytes = hex_to_bytes(args::required_str(&arguments, "bytes")?)
                    .map_err(|e| e.at_path("$.bytes"))?;
                let expected = match args::opt_str(&arguments, "expected") {
                    Some(hex) => Some(hex_to_bytes(hex).map_err(|e| e.at_path("$.expected"))?),
                    None => None,
                };
                let mask = match args::opt_str(&arguments, "mask") {
                    Some(hex) => Some(hex_to_bytes(hex).map_err(|e| e.at_path("$.mask"))?),
                    None => None,
                };
                let request = VerifyWriteRequest {
                    address,
                    bytes,
                    expected,
                    mask,
                    abort_on_mismatch: args::bool_or(&arguments, "abortOnMismatch", true)?,
                };
                let outcome = verify_and_write(ctx.backend.as_ref(), request).await?;
                Ok(ToolResult::json(
                    format!("wrote {} at {} (verified)", outcome.wrote, outcome.address),
                    serde_json::to_value(&outcome)?,
                )
                .with_metadata(serde_json::to_value(&outcome)?))
            }
            "memory_dump" => {
                dump_schema().parse(&arguments, "$")?;
                let address = parse_address_arg(&arguments)?;
                let request = DumpRequest {
                    address,
                    length: args::u64_or(&arguments, "length", 0)? as u32,
                    output_path: PathBuf::from(args::required_str(&arguments, "outputPath")?),
                    format: match args::str_or(&arguments, "format", "hex") {
                        "binary" => DumpFormat::Binary,
                        _ => DumpFormat::Hex,
                    },
                    chunk_size: args::u64_or(&arguments, "chunkSize", 512)? as u32,
                    pause_during_read: args::bool_or(&arguments, "pauseDuringRead", true)?,
                    retries: args::u64_or(&arguments, "retries", 1)? as u32,
                };
                let manifest = dump_memory(ctx.backend.as_ref(), request).await?;
                Ok(ToolResult::json(
                    format!("dumped {} bytes to {}", manifest.length, manifest.output_path),
                    serde_json::to_value(&manifest)?,
                )
                .with_metadata(json!({
                    "checksum": manifest.checksum,
                    "outputPath": manifest.output_path,
                })))
            }
            "debug_register" => {
                let (op, payload) = split_op(&arguments, &debug_variants())?;
                match op.as_str() {
                    "read" => {
                        let response = ctx
                            .backend
                            .read_debug_reg()
                            .await?
                            .require("failure while reading debug register")?;
                        Ok(ToolResult::json(
                            "debug register read".to_string(),
                            response.data.unwrap_or(Value::Null),
                        ))
                    }
                    "write" => {
                        let bytes = hex_to_bytes(args::required_str(&payload, "value")?)
                            .map_err(|e| e.at_path("$.value"))?;
                        if bytes.len() != 1 {
                            return Err(BridgeError::validation(
                                "value must be exactly one byte",
                                "$.value",
                            ));
                        }
                        let value = bytes[0];
                        ctx.backend
                            .write_debug_reg(value)
                            .await?
                            .require("failure while writing debug register")?;
                        Ok(ToolResult::json(
                            format!("debug register set to {}", bytes_to_hex(&[value])),
                            json!({"value": bytes_to_hex(&[value])}),
                        ))
                    }
                    other => unreachable!("split_op admits only declared ops, got '{other}'"),
                }
            }
            other => Err(BridgeError::validation(
                format!("unknown tool '{other}'"),
                "$.name",
            )),
        }
    }
}
