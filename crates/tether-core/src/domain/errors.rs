//! Errors - error types and their operational classification.

use thiserror::Error;

/// ErrorKind classifies failures for operators.
///
/// - Transient: a redelivery may succeed
/// - Permanent: retrying is pointless (protocol violation, double setup)
/// - Infrastructure: a backing service (store, registry, scheduler) failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// TetherError is the error of every handler and port.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("relation store error ({table}): {message}")]
    Store { table: String, message: String },

    #[error("task registry error: {0}")]
    Registry(String),

    #[error("scheduler transport error: {0}")]
    SchedulerTransport(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("event source error: {0}")]
    Source(String),

    #[error("setup error: {0}")]
    Setup(String),

    #[error("{failed} of {total} dependents failed to update")]
    FanOut { failed: usize, total: usize },
}

impl TetherError {
    pub fn store(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TetherError::Store { .. }
            | TetherError::Registry(_)
            | TetherError::SchedulerTransport(_)
            | TetherError::Source(_) => ErrorKind::Infrastructure,
            TetherError::FanOut { .. } => ErrorKind::Transient,
            TetherError::ProtocolViolation(_)
            | TetherError::Setup(_) => ErrorKind::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(TetherError::store("RequiredTasks", "boom").kind(), ErrorKind::Infrastructure);
        assert_eq!(TetherError::FanOut { failed: 1, total: 3 }.kind(), ErrorKind::Transient);
        assert_eq!(TetherError::ProtocolViolation("x".into()).kind(), ErrorKind::Permanent);
    }

    #[test]
    fn store_error_mentions_table() {
        let msg = TetherError::store("DependentTasks", "timeout").to_string();
        assert!(msg.contains("DependentTasks"));
        assert!(msg.contains("timeout"));
    }
}
