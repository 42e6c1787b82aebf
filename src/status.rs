use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Validation status of a single field. Exactly one value is active per
/// validator at any time; a validator that has never run has no status.
///
/// Statuses serialize as the lowercase wire constants used by the page
/// model blob (`"valid"`, `"error"`, ...).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Valid,
    Error,
    Warning,
    Cancelled,
    Validating,
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Valid => "valid",
            Status::Error => "error",
            Status::Warning => "warning",
            Status::Cancelled => "cancelled",
            Status::Validating => "validating",
        };
        f.write_str(name)
    }
}

/// Outcome of a validator's core check. Immutable once produced; the
/// message is meaningful for `Error`, `Warning` and valid-with-note
/// outcomes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationResult {
    status: Status,
    message: Option<String>,
}

impl ValidationResult {
    pub fn new(status: Status, message: Option<String>) -> Self {
        Self { status, message }
    }

    pub fn valid() -> Self {
        Self::new(Status::Valid, None)
    }

    /// A passing outcome that still carries a note for the renderer.
    pub fn valid_with_note(message: impl Into<String>) -> Self {
        Self::new(Status::Valid, Some(message.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, Some(message.into()))
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Status::Warning, Some(message.into()))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_lowercase_wire_constant() {
        let json = serde_json::to_string(&Status::Cancelled).expect("serialize status");
        assert_eq!(json, "\"cancelled\"");
        let parsed: Status = serde_json::from_str("\"validating\"").expect("parse status");
        assert_eq!(parsed, Status::Validating);
    }

    #[test]
    fn result_constructors_set_status_and_message() {
        assert_eq!(ValidationResult::valid().message(), None);
        let warning = ValidationResult::warning("close to the limit");
        assert_eq!(warning.status(), Status::Warning);
        assert_eq!(warning.message(), Some("close to the limit"));
    }
}
