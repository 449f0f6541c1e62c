use crate::{DialectKind, Error, Result};
use std::time::Duration;

/// Session configuration for batch operations
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Backend dialect used to compile every statement of the session
    pub dialect: DialectKind,

    /// Statement timeout handed to the connection (None = backend default)
    pub statement_timeout: Option<Duration>,

    /// Maximum number of keys per mutation when a limit is rewritten to a key set
    pub max_keys_per_statement: usize,

    /// Include bound parameter values in debug logs
    pub log_parameters: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            statement_timeout: None,
            max_keys_per_statement: 500,
            log_parameters: false,
        }
    }
}

impl BatchConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend dialect
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the statement timeout
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of keys per keyed mutation
    pub fn with_max_keys_per_statement(mut self, max: usize) -> Self {
        self.max_keys_per_statement = max;
        self
    }

    /// Log bound parameter values alongside statement text
    pub fn with_parameter_logging(mut self) -> Self {
        self.log_parameters = true;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_keys_per_statement == 0 {
            return Err(Error::InvalidConfig(
                "max_keys_per_statement must be greater than 0".to_string(),
            ));
        }

        if let Some(timeout) = self.statement_timeout {
            if timeout.is_zero() {
                return Err(Error::InvalidConfig(
                    "statement_timeout must be greater than 0 when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
