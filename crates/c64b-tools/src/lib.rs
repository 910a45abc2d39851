// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool descriptors, the name-unique registry, and the dispatcher.
//!
//! Tools are declared inside modules; a module owns the `invoke` entrypoint
//! for its tools and the registry enforces global name uniqueness and
//! platform gating before delegating. Metadata a tool does not set is
//! inherited from its module's defaults at advertisement time.

#![deny(unsafe_code)]

use async_trait::async_trait;
use c64b_backend::{Platform, PlatformHandle, is_platform_supported};
use c64b_error::{BridgeError, ToolResult};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Per-request context handed to executors.
///
/// Carries the backend facade and the platform status handle; executors
/// read the platform from here rather than any global so tests can inject
/// fakes.
#[derive(Clone)]
pub struct ToolContext {
    /// The active backend facade.
    pub backend: Arc<dyn c64b_backend::Backend>,
    /// Process-wide platform status with its setter.
    pub platform: PlatformHandle,
}

impl ToolContext {
    /// Create a context over a backend and platform handle.
    pub fn new(backend: Arc<dyn c64b_backend::Backend>, platform: PlatformHandle) -> Self {
        Self { backend, platform }
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Metadata for a single tool. Immutable after registration.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Globally unique tool name.
    pub name: &'static str,
    /// Human description.
    pub description: &'static str,
    /// JSON-Schema for the tool's arguments.
    pub input_schema: Value,
    /// Tags, merged with module defaults at advertisement time.
    pub tags: Vec<&'static str>,
    /// Related resource URIs.
    pub related_resources: Vec<&'static str>,
    /// Example invocations.
    pub examples: Vec<Value>,
    /// Workflow hints.
    pub workflow_hints: Vec<&'static str>,
    /// Names of tools that should run before this one.
    pub prerequisites: Vec<&'static str>,
    /// Supported platforms; empty means "inherit the module default".
    pub platforms: Vec<Platform>,
}

impl ToolSpec {
    /// A minimal spec with the given name, description, and schema.
    pub fn new(name: &'static str, description: &'static str, input_schema: Value) -> Self {
        Self {
            name,
            description,
            input_schema,
            tags: Vec::new(),
            related_resources: Vec::new(),
            examples: Vec::new(),
            workflow_hints: Vec::new(),
            prerequisites: Vec::new(),
            platforms: Vec::new(),
        }
    }

    /// Add tags.
    pub fn tags(mut self, tags: &[&'static str]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    /// Add an example invocation.
    pub fn example(mut self, example: Value) -> Self {
        self.examples.push(example);
        self
    }

    /// Add a workflow hint.
    pub fn hint(mut self, hint: &'static str) -> Self {
        self.workflow_hints.push(hint);
        self
    }

    /// Declare prerequisite tools.
    pub fn prerequisites(mut self, names: &[&'static str]) -> Self {
        self.prerequisites.extend_from_slice(names);
        self
    }

    /// Restrict (or widen) the supported platform set for this tool.
    pub fn platforms(mut self, platforms: &[Platform]) -> Self {
        self.platforms.extend_from_slice(platforms);
        self
    }

    /// Add related resource URIs.
    pub fn related(mut self, uris: &[&'static str]) -> Self {
        self.related_resources.extend_from_slice(uris);
        self
    }
}

/// Metadata shared by every tool in a module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Domain label, e.g. `"memory"`.
    pub domain: &'static str,
    /// One-line summary of the module.
    pub summary: &'static str,
    /// Default tags.
    pub default_tags: Vec<&'static str>,
    /// Default workflow hints.
    pub default_hints: Vec<&'static str>,
    /// Default related resources.
    pub default_resources: Vec<&'static str>,
    /// Default supported platforms.
    pub default_platforms: Vec<Platform>,
    /// The module's tools, in advertisement order.
    pub tools: Vec<ToolSpec>,
}

impl ModuleDescriptor {
    /// A descriptor with device-only defaults and no tools.
    pub fn new(domain: &'static str, summary: &'static str) -> Self {
        Self {
            domain,
            summary,
            default_tags: Vec::new(),
            default_hints: Vec::new(),
            default_resources: Vec::new(),
            default_platforms: vec![Platform::Device],
            tools: Vec::new(),
        }
    }

    /// Set the default tags.
    pub fn default_tags(mut self, tags: &[&'static str]) -> Self {
        self.default_tags = tags.to_vec();
        self
    }

    /// Set the default platforms.
    pub fn default_platforms(mut self, platforms: &[Platform]) -> Self {
        self.default_platforms = platforms.to_vec();
        self
    }

    /// Set the default workflow hints.
    pub fn default_hints(mut self, hints: &[&'static str]) -> Self {
        self.default_hints = hints.to_vec();
        self
    }

    /// Set the default related resources.
    pub fn default_resources(mut self, uris: &[&'static str]) -> Self {
        self.default_resources = uris.to_vec();
        self
    }

    /// Append a tool.
    pub fn tool(mut self, spec: ToolSpec) -> Self {
        self.tools.push(spec);
        self
    }
}

/// A cohesive set of tools sharing default metadata.
#[async_trait]
pub trait ToolModule: Send + Sync {
    /// The module's descriptor; called once at registration.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Execute one of the module's tools.
    ///
    /// `name` is guaranteed to be one of the descriptor's tool names and
    /// the platform gate has already passed.
    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError>;
}

// ---------------------------------------------------------------------------
// Advertisement
// ---------------------------------------------------------------------------

/// A tool as advertised to clients, with module defaults merged in.
#[derive(Debug, Clone)]
pub struct AdvertisedTool {
    /// Tool name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// JSON-Schema for the arguments.
    pub input_schema: Value,
    /// Merged tags (module defaults first, then tool-specific).
    pub tags: Vec<String>,
    /// Merged related resources.
    pub related_resources: Vec<String>,
    /// Example invocations.
    pub examples: Vec<Value>,
    /// Merged workflow hints.
    pub workflow_hints: Vec<String>,
    /// Prerequisite tool names.
    pub prerequisites: Vec<String>,
    /// Effective supported platforms.
    pub platforms: Vec<Platform>,
}

impl AdvertisedTool {
    /// Render the MCP `tools/list` entry.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
            "metadata": {
                "tags": self.tags,
                "relatedResources": self.related_resources,
                "examples": self.examples,
                "workflowHints": self.workflow_hints,
                "prerequisites": self.prerequisites,
                "platforms": self.platforms,
            },
        })
    }
}

fn merge_str_lists(defaults: &[&'static str], own: &[&'static str]) -> Vec<String> {
    let mut merged: Vec<String> = defaults.iter().map(|s| s.to_string()).collect();
    for item in own {
        if !merged.iter().any(|m| m == item) {
            merged.push(item.to_string());
        }
    }
    merged
}

/// Effective platform set: union of module defaults and the tool's own set.
fn effective_platforms(module: &ModuleDescriptor, tool: &ToolSpec) -> Vec<Platform> {
    let mut set = module.default_platforms.clone();
    for p in &tool.platforms {
        if !set.contains(p) {
            set.push(*p);
        }
    }
    set
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Raised when module composition is inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two modules declared the same tool name. Startup-fatal.
    #[error("duplicate tool name '{name}' (modules '{first}' and '{second}')")]
    DuplicateTool {
        /// The colliding tool name.
        name: String,
        /// Module that registered it first.
        first: String,
        /// Module that tried to register it again.
        second: String,
    },
}

/// The global, name-unique tool catalog.
pub struct ToolRegistry {
    modules: Vec<Arc<dyn ToolModule>>,
    descriptors: Vec<ModuleDescriptor>,
    index: BTreeMap<String, (usize, usize)>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            descriptors: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Register a module, rejecting duplicate tool names.
    pub fn register(&mut self, module: Arc<dyn ToolModule>) -> Result<(), RegistryError> {
        let descriptor = module.descriptor();
        let module_idx = self.modules.len();
        for (tool_idx, tool) in descriptor.tools.iter().enumerate() {
            if let Some((owner, _)) = self.index.get(tool.name) {
                return Err(RegistryError::DuplicateTool {
                    name: tool.name.to_string(),
                    first: self.descriptors[*owner].domain.to_string(),
                    second: descriptor.domain.to_string(),
                });
            }
            self.index
                .insert(tool.name.to_string(), (module_idx, tool_idx));
        }
        debug!(domain = descriptor.domain, tools = descriptor.tools.len(), "registered module");
        self.modules.push(module);
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Advertise all tools with module defaults merged, in name order.
    pub fn list_tools(&self) -> Vec<AdvertisedTool> {
        self.index
            .iter()
            .map(|(name, (module_idx, tool_idx))| {
                let module = &self.descriptors[*module_idx];
                let tool = &module.tools[*tool_idx];
                AdvertisedTool {
                    name: name.clone(),
                    description: tool.description.to_string(),
                    input_schema: tool.input_schema.clone(),
                    tags: merge_str_lists(&module.default_tags, &tool.tags),
                    related_resources: merge_str_lists(
                        &module.default_resources,
                        &tool.related_resources,
                    ),
                    examples: tool.examples.clone(),
                    workflow_hints: merge_str_lists(&module.default_hints, &tool.workflow_hints),
                    prerequisites: tool.prerequisites.iter().map(|s| s.to_string()).collect(),
                    platforms: effective_platforms(module, tool),
                }
            })
            .collect()
    }

    /// Dispatch a tool invocation, recovering every failure into the
    /// uniform envelope.
    pub async fn invoke(&self, name: &str, arguments: Value, ctx: &ToolContext) -> ToolResult {
        match self.try_invoke(name, arguments, ctx).await {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = name, kind = %err.kind(), "tool invocation failed: {err}");
                ToolResult::from(err)
            }
        }
    }

    async fn try_invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, BridgeError> {
        let Some((module_idx, tool_idx)) = self.index.get(name).copied() else {
            return Err(BridgeError::validation(
                format!("unknown tool '{name}'"),
                "$.name",
            ));
        };
        let descriptor = &self.descriptors[module_idx];
        let tool = &descriptor.tools[tool_idx];

        let supported = effective_platforms(descriptor, tool);
        let active = ctx.platform.platform();
        if !is_platform_supported(active, &supported) {
            return Err(BridgeError::unsupported_platform(
                name,
                active.as_str(),
                supported.iter().map(|p| p.as_str().to_string()).collect(),
            ));
        }

        debug!(tool = name, platform = %active, "dispatching tool");
        self.modules[module_idx].invoke(name, arguments, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use c64b_backend::{PlatformStatus, is_platform_supported};
    use c64b_backend_mock::MockBackend;
    use c64b_error::ErrorKind;

    struct EchoModule {
        domain: &'static str,
        tool_name: &'static str,
        platforms: Vec<Platform>,
    }

    #[async_trait]
    impl ToolModule for EchoModule {
        fn descriptor(&self) -> ModuleDescriptor {
            let mut spec = ToolSpec::new(
                self.tool_name,
                "Echo the arguments back",
                json!({"type": "object"}),
            )
            .tags(&["echo"]);
            spec = spec.platforms(&self.platforms);
            ModuleDescriptor::new(self.domain, "Echo tools")
                .default_tags(&["test"])
                .tool(spec)
        }

        async fn invoke(
            &self,
            _name: &str,
            arguments: Value,
            _ctx: &ToolContext,
        ) -> Result<ToolResult, BridgeError> {
            Ok(ToolResult::json("echoed", arguments))
        }
    }

    fn device_ctx() -> ToolContext {
        ToolContext::new(
            Arc::new(MockBackend::new()),
            PlatformHandle::new(PlatformStatus::new(Platform::Device, json!({}))),
        )
    }

    fn emulator_ctx() -> ToolContext {
        ToolContext::new(
            Arc::new(MockBackend::new().with_platform(Platform::Emulator)),
            PlatformHandle::new(PlatformStatus::new(Platform::Emulator, json!({}))),
        )
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoModule {
                domain: "alpha",
                tool_name: "echo",
                platforms: vec![],
            }))
            .unwrap();
        let err = registry
            .register(Arc::new(EchoModule {
                domain: "beta",
                tool_name: "echo",
                platforms: vec![],
            }))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate tool name 'echo'"));
        assert!(msg.contains("alpha") && msg.contains("beta"));
    }

    #[test]
    fn listing_merges_module_defaults() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoModule {
                domain: "alpha",
                tool_name: "echo",
                platforms: vec![],
            }))
            .unwrap();
        let tools = registry.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tags, vec!["test", "echo"]);
        assert_eq!(tools[0].platforms, vec![Platform::Device]);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_validation_error_at_name() {
        let registry = ToolRegistry::new();
        let result = registry.invoke("nope", json!({}), &device_ctx()).await;
        assert!(result.is_error);
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
        assert!(result.text_content().contains("$.name"));
    }

    #[tokio::test]
    async fn platform_gate_rejects_unsupported() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoModule {
                domain: "alpha",
                tool_name: "echo",
                platforms: vec![],
            }))
            .unwrap();
        let result = registry.invoke("echo", json!({}), &emulator_ctx()).await;
        assert!(result.is_error);
        assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedPlatform));
        let meta = result.metadata.unwrap();
        assert_eq!(meta["error"]["details"]["platform"], "emulator");
        assert_eq!(meta["error"]["details"]["supported"], json!(["device"]));
    }

    #[tokio::test]
    async fn tool_platform_set_unions_with_module_default() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoModule {
                domain: "alpha",
                tool_name: "echo",
                platforms: vec![Platform::Emulator],
            }))
            .unwrap();
        let tools = registry.list_tools();
        assert_eq!(tools[0].platforms, vec![Platform::Device, Platform::Emulator]);
        let result = registry.invoke("echo", json!({"x": 1}), &emulator_ctx()).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn successful_invocation_returns_module_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoModule {
                domain: "alpha",
                tool_name: "echo",
                platforms: vec![],
            }))
            .unwrap();
        let result = registry
            .invoke("echo", json!({"value": 42}), &device_ctx())
            .await;
        assert!(!result.is_error);
        match result.structured_content.unwrap() {
            c64b_error::StructuredContent::Json { data } => assert_eq!(data["value"], 42),
        }
    }

    #[test]
    fn empty_platform_set_behaves_as_wildcard() {
        assert!(is_platform_supported(Platform::Emulator, &[]));
    }
}
