// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background task tools over the scheduler.

use async_trait::async_trait;
use c64b_error::{BridgeError, ToolResult};
use c64b_schema::{OpVariant, args, integer, object, op_union, split_op, string};
use c64b_scheduler::{Scheduler, StartOptions};
use c64b_tools::{ModuleDescriptor, ToolContext, ToolModule, ToolSpec};
use serde_json::{Value, json};

pub struct TasksModule {
    scheduler: Scheduler,
}

impl TasksModule {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

fn variants() -> Vec<OpVariant> {
    vec![
        OpVariant::new(
            "start",
            "Start a named recurring task",
            object()
                .field("name", string().min_len(1))
                .field("operation", string().min_len(1))
                .optional("arguments", object().open())
                .optional("intervalMs", integer().min(1))
                .optional("maxIterations", integer().min(1)),
        ),
        OpVariant::new(
            "stop",
            "Stop a named task (idempotent)",
            object().field("name", string().min_len(1)),
        ),
        OpVariant::new("list", "List all known tasks", object()),
        OpVariant::new("stop_all", "Stop every task", object()),
    ]
}

#[async_trait]
impl ToolModule for TasksModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("tasks", "Named, persistent background tasks")
            .default_tags(&["tasks", "background"])
            .default_hints(&["Tasks persist across restarts but are not auto-resumed"])
            .tool(
                ToolSpec::new(
                    "background_task",
                    "Start, stop, and list recurring background operations",
                    op_union(&variants()),
                )
                .example(json!({
                    "op": "start",
                    "name": "screen-poll",
                    "operation": "read_screen",
                    "intervalMs": 5000,
                }))
                .hint("At most one running task per name; stop is idempotent"),
            )
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        if name != "background_task" {
            return Err(BridgeError::validation(
                format!("unknown tool '{name}'"),
                "$.name",
            ));
        }
        let (op, payload) = split_op(&arguments, &variants())?;
        match op.as_str() {
            "start" => {
                let options = StartOptions {
                    name: args::required_str(&payload, "name")?.to_string(),
                    operation: args::required_str(&payload, "operation")?.to_string(),
                    args: args::opt_value(&payload, "arguments")
                        .cloned()
                        .unwrap_or_else(|| json!({})),
                    interval_ms: args::u64_or(&payload, "intervalMs", 1000)?,
                    max_iterations: args::opt_u64(&payload, "maxIterations")?,
                };
                let record = self.scheduler.start(ctx.backend.clone(), options)?;
                Ok(ToolResult::json(
                    format!("task '{}' started as {}", record.name, record.id),
                    serde_json::to_value(&record)?,
                ))
            }
            "stop" => {
                let task_name = args::required_str(&payload, "name")?;
                let outcome = self.scheduler.stop(task_name)?;
                let text = if outcome.not_found {
                    format!("task '{task_name}' not found")
                } else {
                    format!("task '{task_name}' stopped")
                };
                Ok(ToolResult::json(text, serde_json::to_value(&outcome)?))
            }
            "list" => {
                let records = self.scheduler.list()?;
                Ok(ToolResult::json(
                    format!("{} task(s)", records.len()),
                    json!({"tasks": records, "count": records.len()}),
                ))
            }
            "stop_all" => {
                let stopped = self.scheduler.stop_all()?;
                Ok(ToolResult::json(
                    format!("stopped {stopped} task(s)"),
                    json!({"stopped": stopped}),
                ))
            }
            other => unreachable!("split_op admits only declared ops, got '{other}'"),
        }
    }
}
