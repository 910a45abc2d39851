// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy and the uniform tool result envelope.
//!
//! Every failure a tool can surface is a [`BridgeError`] carrying one of four
//! stable kinds (`validation`, `execution`, `unsupported_platform`,
//! `unknown`) plus machine-readable metadata. The dispatcher recovers any
//! error into a [`ToolResult`] so clients always see the same shape.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Stable failure kind, serialised as a `snake_case` string.
///
/// Clients use the kind to decide whether a retry makes sense: `validation`
/// means the arguments were wrong (fix and retry), `execution` means the
/// device or filesystem refused (inspect details), `unsupported_platform`
/// is structural, and `unknown` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema or argument contract failure.
    Validation,
    /// Backend, filesystem, or subprocess failure, or a failed post-condition.
    Execution,
    /// Tool invoked on a platform outside its support set.
    UnsupportedPlatform,
    /// Catch-all with preserved message.
    Unknown,
}

impl ErrorKind {
    /// Stable string tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::UnsupportedPlatform => "unsupported_platform",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Typed failure raised by executors, backends, and the dispatcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Schema violation, missing required field, or constraint failure.
    #[error("{message} (at {path})")]
    Validation {
        /// Human-readable description.
        message: String,
        /// JSON-pointer path of the offending value, `$`-rooted.
        path: String,
        /// The offending value or constraint context.
        details: Option<Value>,
    },

    /// The backend returned a failure, a post-condition did not hold, or
    /// local I/O failed.
    #[error("{message}")]
    Execution {
        /// Human-readable description.
        message: String,
        /// Optional machine-readable sub-code (e.g. `"unsupported"`).
        code: Option<String>,
        /// Firmware response, mismatch list, or other structured context.
        details: Option<Value>,
    },

    /// The tool was invoked on a platform it does not support.
    #[error("tool '{tool}' is not supported on platform '{platform}'")]
    UnsupportedPlatform {
        /// Tool name.
        tool: String,
        /// Active platform id.
        platform: String,
        /// Platforms the tool does support.
        supported: Vec<String>,
    },

    /// Anything else; the message is preserved verbatim.
    #[error("{message}")]
    Unknown {
        /// Preserved message of the original failure.
        message: String,
    },
}

impl BridgeError {
    /// Create a `validation` error at the given JSON-pointer path.
    pub fn validation(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            path: path.into(),
            details: None,
        }
    }

    /// Create an `execution` error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Create an `unsupported_platform` error.
    pub fn unsupported_platform(
        tool: impl Into<String>,
        platform: impl Into<String>,
        supported: Vec<String>,
    ) -> Self {
        Self::UnsupportedPlatform {
            tool: tool.into(),
            platform: platform.into(),
            supported,
        }
    }

    /// Create an `unknown` error preserving the message.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Attach structured details. No-op for kinds without a details field.
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::Validation { details, .. } | Self::Execution { details, .. } => {
                *details = Some(value);
            }
            _ => {}
        }
        self
    }

    /// Attach a machine-readable sub-code. Only `execution` errors carry one.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        if let Self::Execution { code: slot, .. } = &mut self {
            *slot = Some(code.into());
        }
        self
    }

    /// Re-root a `validation` error at a different JSON-pointer path.
    pub fn at_path(mut self, new_path: impl Into<String>) -> Self {
        if let Self::Validation { path, .. } = &mut self {
            *path = new_path.into();
        }
        self
    }

    /// Returns the stable [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Machine-readable metadata object: `{kind, path?, code?, details?}`.
    pub fn metadata(&self) -> Value {
        match self {
            Self::Validation { path, details, .. } => {
                let mut meta = json!({"kind": self.kind(), "path": path});
                if let Some(d) = details {
                    meta["details"] = d.clone();
                }
                meta
            }
            Self::Execution { code, details, .. } => {
                let mut meta = json!({"kind": self.kind()});
                if let Some(c) = code {
                    meta["code"] = json!(c);
                }
                if let Some(d) = details {
                    meta["details"] = d.clone();
                }
                meta
            }
            Self::UnsupportedPlatform {
                tool,
                platform,
                supported,
            } => json!({
                "kind": self.kind(),
                "details": {"tool": tool, "platform": platform, "supported": supported},
            }),
            Self::Unknown { .. } => json!({"kind": self.kind()}),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::execution(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::execution(err.to_string())
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BridgeError>() {
            Ok(bridge) => bridge,
            Err(other) => Self::unknown(format!("{other:#}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolResult envelope
// ---------------------------------------------------------------------------

/// A single content block of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
}

/// Structured payload attached to a successful tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructuredContent {
    /// A JSON payload.
    Json {
        /// The raw payload.
        data: Value,
    },
}

/// The uniform result record returned by every tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable content blocks.
    pub content: Vec<ContentBlock>,
    /// Structured payload on success.
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<StructuredContent>,
    /// Arbitrary metadata; on failure carries `error = {kind, …}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Set when the invocation failed.
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result with a single text block.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: message.into(),
            }],
            structured_content: None,
            metadata: None,
            is_error: false,
        }
    }

    /// A successful result with a text block and a structured JSON payload.
    pub fn json(message: impl Into<String>, data: Value) -> Self {
        Self {
            structured_content: Some(StructuredContent::Json { data }),
            ..Self::text(message)
        }
    }

    /// Attach metadata to the result.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns the concatenated text content.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the error kind from metadata, when this is an error result.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("error"))
            .and_then(|e| e.get("kind"))
            .and_then(|k| serde_json::from_value(k.clone()).ok())
    }
}

impl From<&BridgeError> for ToolResult {
    fn from(err: &BridgeError) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: err.to_string(),
            }],
            structured_content: None,
            metadata: Some(json!({"error": err.metadata()})),
            is_error: true,
        }
    }
}

impl From<BridgeError> for ToolResult {
    fn from(err: BridgeError) -> Self {
        Self::from(&err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
