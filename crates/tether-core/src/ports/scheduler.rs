//! SchedulerEndpoint port - the external "make this task runnable" call.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskId;

/// Failure of a schedule call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The endpoint answered with a client or server error status.
    #[error("schedule rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The call never got an answer.
    #[error("schedule transport failure: {0}")]
    Transport(String),
}

impl ScheduleError {
    /// 4xx / 5xx answers are expected: most often the task was already
    /// scheduled by a concurrent trigger.
    pub fn is_expected_conflict(&self) -> bool {
        self.conflict_status().is_some()
    }

    /// The status of an expected conflict, `None` for anything else.
    pub fn conflict_status(&self) -> Option<u16> {
        match self {
            ScheduleError::Rejected { status, .. } if (400..600).contains(status) => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait SchedulerEndpoint: Send + Sync {
    async fn schedule(&self, task_id: &TaskId) -> Result<(), ScheduleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(400, true)]
    #[case(409, true)]
    #[case(500, true)]
    #[case(599, true)]
    #[case(600, false)]
    #[case(302, false)]
    fn rejected_status_classes(#[case] status: u16, #[case] expected: bool) {
        let err = ScheduleError::Rejected {
            status,
            message: String::new(),
        };
        assert_eq!(err.is_expected_conflict(), expected);
    }

    #[test]
    fn transport_is_never_expected() {
        assert!(!ScheduleError::Transport("reset".into()).is_expected_conflict());
    }

    #[rstest]
    #[case::conflict(ScheduleError::Rejected { status: 409, message: "exists".into() }, Some(409))]
    #[case::unavailable(ScheduleError::Rejected { status: 503, message: "busy".into() }, Some(503))]
    #[case::redirect(ScheduleError::Rejected { status: 302, message: "moved".into() }, None)]
    #[case::transport(ScheduleError::Transport("reset".into()), None)]
    fn conflict_status_only_for_error_statuses(
        #[case] err: ScheduleError,
        #[case] expected: Option<u16>,
    ) {
        assert_eq!(err.conflict_status(), expected);
    }
}
