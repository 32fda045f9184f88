use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Informational,
}

/// A single finding produced while validating a change set entry.
///
/// Serialized in camelCase since the list is written to clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub message: String,
    pub member_names: Vec<String>,
    pub severity: Severity,
    /// Entity set or type the finding was raised for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ValidationResult {
    pub fn error(message: impl Into<String>, member: &str) -> Self {
        Self {
            message: message.into(),
            member_names: vec![member.to_string()],
            severity: Severity::Error,
            target: None,
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
