// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration tools: snapshot, restore, diff, and item access.

use async_trait::async_trait;
use c64b_error::{BridgeError, ToolResult};
use c64b_schema::{OpVariant, any, args, boolean, object, op_union, split_op, string};
use c64b_snapshot::{diff, restore, snapshot};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};
use std::path::Path;

pub struct ConfigModule;

fn item_variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new("list", "List configuration categories", object()),
        OpVariant::new(
            "get",
            "Fetch one category's items",
            object().field("category", string().min_len(1)),
        ),
        OpVariant::new(
            "set",
            "Set a single item",
            object()
                .field("category", string().min_len(1))
                .field("item", string().min_len(1))
                .field("value", any()),
        ),
        OpVariant::new(
            "batch",
            "Apply a category → item → value update batch",
            object().field("categories", object().open()),
        ),
        OpVariant::new("load_flash", "Reload configuration from flash", object()),
        OpVariant::new("save_flash", "Persist configuration to flash", object()),
        OpVariant::new("reset_defaults", "Reset to factory defaults", object()),
    ]
}

fn path_schema() -> c64b_schema::Schema {
    object().field("path", string().min_len(1).description("snapshot file path"))
}

fn restore_schema() -> c64b_schema::Schema {
    object()
        .field("path", string().min_len(1))
        .optional("applyToFlash", boolean())
}

#[async_trait]
impl ToolModule for ConfigModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("config", "Device configuration management")
            .default_tags(&["config"])
            .tool(
                ToolSpec::new(
                    "config_snapshot",
                    "Export the full device configuration to a JSON file",
                    path_schema().json_schema(),
                )
                .example(json!({"path": "backups/c64u.json"})),
            )
            .tool(
                ToolSpec::new(
                    "config_restore",
                    "Apply a configuration snapshot back to the device",
                    restore_schema().json_schema(),
                )
                .prerequisites(&["config_snapshot"]),
            )
            .tool(
                ToolSpec::new(
                    "config_diff",
                    "Structurally diff a snapshot against the current configuration",
                    path_schema().json_schema(),
                )
                .prerequisites(&["config_snapshot"]),
            )
            .tool(ToolSpec::new(
                "config_item",
                "List, read, and write configuration items",
                op_union(&item_variants()),
            ))
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        match name {
            "config_snapshot" => {
                path_schema().parse(&arguments, "$")?;
                let path = args::required_str(&arguments, "path")?;
                let snap = snapshot(ctx.backend.as_ref(), Path::new(path)).await?;
                Ok(ToolResult::json(
                    format!("snapshot of {} categories written to {path}", snap.categories.len()),
                    json!({"path": path, "categories": snap.categories.len()}),
                ))
            }
            "config_restore" => {
                restore_schema().parse(&arguments, "$")?;
                let path = args::required_str(&arguments, "path")?;
                let apply = args::bool_or(&arguments, "applyToFlash", false)?;
                let outcome = restore(ctx.backend.as_ref(), Path::new(path), apply).await?;
                Ok(ToolResult::json(
                    format!("restored {} categories", outcome.categories_applied),
                    serde_json::to_value(&outcome)?,
                ))
            }
            "config_diff" => {
                path_schema().parse(&arguments, "$")?;
                let path = args::required_str(&arguments, "path")?;
                let report = diff(ctx.backend.as_ref(), Path::new(path)).await?;
                Ok(ToolResult::json(
                    format!("{} categories changed", report.count),
                    serde_json::to_value(&report)?,
                )
                .with_metadata(json!({"count": report.count})))
            }
            "config_item" => {
                let (op, payload) = split_op(&arguments, &item_variants())?;
                match op.as_str() {
                    "list" => {
                        let categories = ctx.backend.list_config_categories().await?;
                        Ok(ToolResult::json(
                            format!("{} categories", categories.len()),
                            json!({"categories": categories}),
                        ))
                    }
                    "get" => {
                        let category = args::required_str(&payload, "category")?;
                        let items = ctx.backend.get_config_category(category).await?;
                        Ok(ToolResult::json(format!("category '{category}'"), items))
                    }
                    "set" => {
                        let category = args::required_str(&payload, "category")?;
                        let item = args::required_str(&payload, "item")?;
                        let value = args::opt_value(&payload, "value").cloned().ok_or_else(
                            || BridgeError::validation("missing required field", "$.value"),
                        )?;
                        ctx.backend
                            .set_config_item(category, item, &value)
                            .await?
                            .require("failure while setting configuration item")?;
                        Ok(ToolResult::json(
                            format!("set {category}/{item}"),
                            json!({"category": category, "item": item, "value": value}),
                        ))
                    }
                    "batch" => {
                        let categories = args::opt_value(&payload, "categories")
                            .cloned()
                            .ok_or_else(|| {
                                BridgeError::validation("missing required field", "$.categories")
                            })?;
                        ctx.backend
                            .update_config_batch(&categories)
                            .await?
                            .require("failure while applying configuration batch")?;
                        Ok(ToolResult::json("batch applied", categories))
                    }
                    "load_flash" => {
                        ctx.backend
                            .load_from_flash()
                            .await?
                            .require("failure while loading from flash")?;
                        Ok(ToolResult::text("configuration reloaded from flash"))
                    }
                    "save_flash" => {
                        ctx.backend
                            .save_to_flash()
                            .await?
                            .require("failure while saving to flash")?;
                        Ok(ToolResult::text("configuration saved to flash"))
                    }
                    "reset_defaults" => {
                        ctx.backend
                            .reset_config_defaults()
                            .await?
                            .require("failure while resetting configuration")?;
                        Ok(ToolResult::text("configuration reset to defaults"))
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
