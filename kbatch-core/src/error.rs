use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The filter or mutation uses a construct that cannot be pushed to the backend.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The mutation compiled to an empty assignment list.
    #[error("No assignments to apply on table {0}")]
    NoAssignments(String),

    /// A row limit was requested but the dialect has no way to honor it for this statement.
    #[error("Row limit is not supported for {statement} on {dialect}: {reason}")]
    DialectLimitUnsupported {
        dialect: String,
        statement: String,
        reason: String,
    },

    /// The backend rejected or failed the statement.
    #[error("Execution error{}: {message}", .backend_code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Execution {
        backend_code: Option<String>,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnsupportedExpression(_) => "UNSUPPORTED_EXPRESSION",
            Error::NoAssignments(_) => "NO_ASSIGNMENTS",
            Error::DialectLimitUnsupported { .. } => "DIALECT_LIMIT_UNSUPPORTED",
            Error::Execution { .. } => "EXECUTION_ERROR",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    /// Returns true if the error was raised while compiling, before anything
    /// was sent to the backend.
    pub fn is_compile_time(&self) -> bool {
        match self {
            Error::UnsupportedExpression(_) => true,
            Error::NoAssignments(_) => true,
            Error::DialectLimitUnsupported { .. } => true,
            Error::InvalidArgument(_) => true,
            Error::InvalidConfig(_) => true,
            Error::Execution { .. } => false,
        }
    }

    /// Builds an execution error from a backend failure.
    pub fn execution(backend_code: Option<String>, message: impl Into<String>) -> Error {
        Error::Execution {
            backend_code,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
