// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device filesystem tools: search, find-and-run, and disk images.

use async_trait::async_trait;
use c64b_backend::DiskImageKind;
use c64b_error::{BridgeError, ToolResult};
use c64b_files::{FindOptions, RunSearchOptions, SortOrder, find_and_run, find_paths};
use c64b_schema::{OpVariant, args, array, integer, object, op_union, split_op, string};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};
use std::path::PathBuf;

pub struct FilesModule {
    tasks_home: PathBuf,
}

impl FilesModule {
    pub fn new(tasks_home: PathBuf) -> Self {
        Self { tasks_home }
    }
}

fn disk_variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new(
            "info",
            "Stat a file on the device filesystem",
            object().field("path", string().min_len(1)),
        ),
        OpVariant::new(
            "create",
            "Create a blank disk image",
            object()
                .field("type", string().one_of(&["d64", "d71", "d81", "dnp"]))
                .field("path", string().min_len(1))
                .optional("label", string())
                .optional("tracks", integer().min(1)),
        ),
    ]
}

fn search_schema(with_order: bool) -> c64b_schema::Schema {
    let base = object()
        .field("pattern", string().min_len(1).description("case-insensitive name substring"))
        .optional("root", string().min_len(1))
        .optional("extensions", array(string().min_len(1)));
    if with_order {
        base.optional("order", string().one_of(&["firmware", "alphabetical"]))
    } else {
        base.optional("maxResults", integer().min(1))
    }
}

#[async_trait]
impl ToolModule for FilesModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("files", "Device filesystem search and disk images")
            .default_tags(&["files"])
            .tool(
                ToolSpec::new(
                    "find_paths_by_name",
                    "Find file paths by name substring and extension",
                    search_schema(false).json_schema(),
                )
                .example(json!({"pattern": "pitfall", "extensions": ["prg"]})),
            )
            .tool(
                ToolSpec::new(
                    "find_and_run_program_by_name",
                    "Find the best-matching program and run it",
                    search_schema(true).json_schema(),
                )
                .example(json!({"pattern": "elite"}))
                .hint("PRG matches win over CRT matches unless extensions says otherwise"),
            )
            .tool(ToolSpec::new(
                "disk_image",
                "Inspect files and create blank disk images",
                op_union(&disk_variants()),
            ))
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        match name {
            "find_paths_by_name" => {
                search_schema(false).parse(&arguments, "$")?;
                let mut options = FindOptions::new(args::required_str(&arguments, "pattern")?);
                options.root = args::str_or(&arguments, "root", "/").to_string();
                if let Some(extensions) = args::opt_str_list(&arguments, "extensions")? {
                    options.extensions = extensions;
                }
                options.max_results = args::u64_or(&arguments, "maxResults", 50)? as usize;
                let paths = find_paths(ctx.backend.as_ref(), &options).await?;
                Ok(ToolResult::json(
                    format!("{} match(es) for '{}'", paths.len(), options.pattern),
                    json!({"paths": paths}),
                ))
            }
            "find_and_run_program_by_name" => {
                search_schema(true).parse(&arguments, "$")?;
                let mut options =
                    RunSearchOptions::new(args::required_str(&arguments, "pattern")?);
                options.root = args::str_or(&arguments, "root", "/").to_string();
                if let Some(extensions) = args::opt_str_list(&arguments, "extensions")? {
                    options.extensions = extensions;
                }
                if args::str_or(&arguments, "order", "firmware") == "alphabetical" {
                    options.order = SortOrder::Alphabetical;
                }
                let outcome = find_and_run(ctx.backend.as_ref(), &self.tasks_home, &options).await?;
                Ok(ToolResult::json(
                    format!("running {}", outcome.path),
                    serde_json::to_value(&outcome)?,
                ))
            }
            "disk_image" => {
                let (op, payload) = split_op(&arguments, &disk_variants())?;
                match op.as_str() {
                    "info" => {
                        let path = args::required_str(&payload, "path")?;
                        let info = ctx.backend.file_info(path).await?;
                        Ok(ToolResult::json(format!("info for {path}"), info))
                    }
                    "create" => {
                        let kind_name = args::required_str(&payload, "type")?;
                        let kind = DiskImageKind::parse(kind_name).ok_or_else(|| {
                            BridgeError::validation(
                                format!("unknown disk image type '{kind_name}'"),
                                "$.type",
                            )
                        })?;
                        let path = args::required_str(&payload, "path")?;
                        let label = args::opt_str(&payload, "label");
                        let tracks = args::opt_u64(&payload, "tracks")?.map(|t| t as u32);
                        ctx.backend
                            .create_disk_image(kind, path, label, tracks)
                            .await?
                            .require("failure while creating disk image")?;
                        Ok(ToolResult::json(
                            format!("created {kind_name} image at {path}"),
                            json!({"type": kind_name, "path": path}),
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
