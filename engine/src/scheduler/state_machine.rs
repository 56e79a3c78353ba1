//! Per-job state machine (§4.1). `removed` is not a [`JobStatus`] variant —
//! removal deletes the job record rather than transitioning it — so it is
//! not represented here.

use crate::error::SchedulerError;
use crate::progress::JobStatus;

fn allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        // A retry with budget remaining requeues straight from whichever
        // active stage the failure happened in, without passing through
        // `Failed` (§4.1's retry-then-requeue path).
        (Queued, Transcoding)
            | (Queued, Paused)
            | (Queued, Cancelled)
            | (Paused, Queued)
            | (Paused, Cancelled)
            | (Transcoding, Downloading)
            | (Transcoding, Failed)
            | (Transcoding, Cancelled)
            | (Transcoding, Queued)
            | (Downloading, Processing)
            | (Downloading, Failed)
            | (Downloading, Cancelled)
            | (Downloading, Queued)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
            | (Processing, Queued)
            | (Failed, Queued)
    )
}

pub fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Paused => "paused",
        JobStatus::Transcoding => "transcoding",
        JobStatus::Downloading => "downloading",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

/// Validate and describe a transition; does not mutate anything.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), SchedulerError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(SchedulerError::WrongState {
            expected: format!("a state that can move to {}", status_label(to)),
            found: status_label(from).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    #[test]
    fn queued_can_move_to_transcoding_paused_or_cancelled() {
        assert!(validate_transition(Queued, Transcoding).is_ok());
        assert!(validate_transition(Queued, Paused).is_ok());
        assert!(validate_transition(Queued, Cancelled).is_ok());
        assert!(validate_transition(Queued, Completed).is_err());
    }

    #[test]
    fn terminal_states_other_than_failed_accept_no_transitions() {
        for terminal in [Completed, Cancelled] {
            for candidate in [Queued, Paused, Transcoding, Downloading, Processing, Completed, Failed, Cancelled] {
                assert!(!allowed(terminal, candidate), "{terminal:?} -> {candidate:?}");
            }
        }
    }

    #[test]
    fn failed_can_only_move_to_queued() {
        assert!(validate_transition(Failed, Queued).is_ok());
        assert!(validate_transition(Failed, Transcoding).is_err());
    }

    #[test]
    fn full_happy_path_sequence_is_allowed() {
        assert!(validate_transition(Queued, Transcoding).is_ok());
        assert!(validate_transition(Transcoding, Downloading).is_ok());
        assert!(validate_transition(Downloading, Processing).is_ok());
        assert!(validate_transition(Processing, Completed).is_ok());
    }
}
