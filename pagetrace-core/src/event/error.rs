//! Error payloads, raw and parsed

use serde::{Deserialize, Serialize};

/// A script error as observed by the producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    /// Unparsed stack text
    #[serde(default)]
    pub stack: String,
}

impl RawError {
    pub fn new(name: &str, message: &str, stack: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            stack: stack.to_string(),
        }
    }
}

/// The element whose load failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceFailure {
    /// Lower- or upper-case tag name (`SCRIPT`, `img`, ...)
    pub element: String,
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Script,
    Img,
    Link,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Script => "script",
            TargetType::Img => "img",
            TargetType::Link => "link",
            TargetType::Unknown => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub file_name: String,
    pub line_number: u32,
    pub column_number: u32,
}

/// Parsed error detail merged into an error event during `load`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_frames: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceTarget>,
}

impl ErrorDetail {
    pub fn script(message: &str, stack_frames: Vec<StackFrame>) -> Self {
        Self {
            message: message.to_string(),
            stack_frames,
            target: None,
        }
    }

    pub fn resource(message: String, target: ResourceTarget) -> Self {
        Self {
            message,
            stack_frames: Vec::new(),
            target: Some(target),
        }
    }
}
