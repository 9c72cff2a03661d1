use std::{error::Error, fmt};

use jira_types::EntityKind;

use crate::descriptor::ResponseShape;
use crate::upstream::UpstreamError;

/// External error taxonomy surfaced at the tool-call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidOperation,
    MissingRequiredField,
    InvalidFieldFormat,
    InvalidExpansion,
    IllegalStateTransition,
    UpstreamFailure,
    NotYetImplemented,
    /// An operation body broke its own declaration.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOperation => "InvalidOperation",
            Self::MissingRequiredField => "MissingRequiredField",
            Self::InvalidFieldFormat => "InvalidFieldFormat",
            Self::InvalidExpansion => "InvalidExpansion",
            Self::IllegalStateTransition => "IllegalStateTransition",
            Self::UpstreamFailure => "UpstreamFailure",
            Self::NotYetImplemented => "NotYetImplemented",
            Self::Internal => "Internal",
        }
    }

    /// Kinds detected by the validator before any upstream call.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            Self::InvalidOperation
                | Self::MissingRequiredField
                | Self::InvalidFieldFormat
                | Self::InvalidExpansion
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    InvalidOperation {
        tool: &'static str,
        operation: Option<String>,
        allowed: Vec<&'static str>,
    },
    MissingRequiredField {
        operation: String,
        field: String,
        expected: String,
    },
    InvalidFieldFormat {
        operation: String,
        field: String,
        expected: String,
    },
    InvalidExpansion {
        entity: EntityKind,
        token: String,
        allowed: Vec<&'static str>,
    },
    IllegalStateTransition {
        entity: EntityKind,
        id: String,
        operation: String,
        state: String,
        target: Option<String>,
    },
    Upstream(UpstreamError),
    NotYetImplemented {
        tool: &'static str,
        operation: String,
    },
    UnexpectedOutcome {
        tool: &'static str,
        operation: String,
        declared: ResponseShape,
        produced: ResponseShape,
    },
}

impl ToolError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Self::InvalidFieldFormat { .. } => ErrorKind::InvalidFieldFormat,
            Self::InvalidExpansion { .. } => ErrorKind::InvalidExpansion,
            Self::IllegalStateTransition { .. } => ErrorKind::IllegalStateTransition,
            Self::Upstream(_) => ErrorKind::UpstreamFailure,
            Self::NotYetImplemented { .. } => ErrorKind::NotYetImplemented,
            Self::UnexpectedOutcome { .. } => ErrorKind::Internal,
        }
    }

    /// Offending field, if the error names one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { field, .. } | Self::InvalidFieldFormat { field, .. } => {
                Some(field)
            }
            Self::InvalidExpansion { .. } => Some(jira_types::schema::FIELD_EXPAND),
            _ => None,
        }
    }

    /// Offending operation, if the error names one.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::InvalidOperation { operation, .. } => operation.as_deref(),
            Self::MissingRequiredField { operation, .. }
            | Self::InvalidFieldFormat { operation, .. }
            | Self::IllegalStateTransition { operation, .. }
            | Self::NotYetImplemented { operation, .. }
            | Self::UnexpectedOutcome { operation, .. } => Some(operation),
            Self::InvalidExpansion { .. } | Self::Upstream(_) => None,
        }
    }

    /// Example of the expected shape for field errors.
    #[must_use]
    pub fn expected(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { expected, .. }
            | Self::InvalidFieldFormat { expected, .. } => Some(expected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Upstream(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperation {
                tool,
                operation: Some(operation),
                allowed,
            } => write!(
                f,
                "{tool} does not support operation '{operation}' (expected one of: {})",
                allowed.join(", ")
            ),
            Self::InvalidOperation {
                tool,
                operation: None,
                allowed,
            } => write!(
                f,
                "{tool} requires an 'operation' field (one of: {})",
                allowed.join(", ")
            ),
            Self::MissingRequiredField {
                operation,
                field,
                expected,
            } => write!(
                f,
                "operation '{operation}' requires field '{field}' (example: {expected})"
            ),
            Self::InvalidFieldFormat {
                operation,
                field,
                expected,
            } => write!(
                f,
                "field '{field}' of operation '{operation}' is malformed (expected: {expected})"
            ),
            Self::InvalidExpansion {
                entity,
                token,
                allowed,
            } if allowed.is_empty() => write!(
                f,
                "'{token}' is not a valid {entity} expansion; this operation accepts no expansions"
            ),
            Self::InvalidExpansion {
                entity,
                token,
                allowed,
            } => write!(
                f,
                "'{token}' is not a valid {entity} expansion (allowed: {})",
                allowed.join(", ")
            ),
            Self::IllegalStateTransition {
                entity,
                id,
                operation,
                state,
                target: Some(target),
            } => write!(
                f,
                "{entity} {id} is {state}; operation '{operation}' cannot move it to {target}"
            ),
            Self::IllegalStateTransition {
                entity,
                id,
                operation,
                state,
                target: None,
            } => write!(
                f,
                "{entity} {id} is {state} and read-only; operation '{operation}' is not allowed"
            ),
            Self::Upstream(err) => write!(f, "upstream failure: {err}"),
            Self::NotYetImplemented { tool, operation } => {
                write!(f, "{tool} operation '{operation}' is not yet implemented")
            }
            Self::UnexpectedOutcome {
                tool,
                operation,
                declared,
                produced,
            } => write!(
                f,
                "{tool} operation '{operation}' is declared {declared} but produced {produced}"
            ),
        }
    }
}

impl Error for ToolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Upstream(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UpstreamError> for ToolError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
