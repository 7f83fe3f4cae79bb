use thiserror::Error;

/// Rejection returned by a [`JobQueue`](crate::JobQueue) when it cannot take a job.
///
/// Callers treat every variant the same way as a backpressure drop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueUnavailable {
    #[error("Job queue is full ({capacity} jobs)")]
    Full { capacity: usize },

    #[error("Job queue is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = QueueUnavailable::Full { capacity: 256 };
        assert_eq!(
            err.to_string(),
            "Job queue is full (256 jobs)",
            "Full should report the capacity"
        );

        let err = QueueUnavailable::Closed;
        assert_eq!(
            err.to_string(),
            "Job queue is closed",
            "Closed should display correct message"
        );
    }
}
