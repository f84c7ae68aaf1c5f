//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use pacm::PacmError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Invalid command-line options
    Config(String),
    /// Package manager operation failed
    Manager(PacmError),
    /// One or more package operations reported failure
    PackagesFailed { failed: usize },
}

impl CliError {
    /// Exit the process with an error message and a nonzero code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Manager(e) => write!(f, "{}", e),
            CliError::PackagesFailed { failed } => {
                write!(f, "{} package operation(s) failed", failed)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Manager(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PacmError> for CliError {
    fn from(err: PacmError) -> Self {
        CliError::Manager(err)
    }
}
