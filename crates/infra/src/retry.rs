use tracing::warn;

use crate::error::LogisticsError;

/// Run `op`, re-running it from scratch after `ConcurrentModification`.
///
/// `op` receives the 1-based attempt number. Any other error, or a conflict on
/// the last allowed attempt, is returned as is.
pub fn with_conflict_retry<T>(
    max_retries: u32,
    mut op: impl FnMut(u32) -> Result<T, LogisticsError>,
) -> Result<T, LogisticsError> {
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Err(err) if err.is_retryable() && attempt <= max_retries => {
                warn!(attempt, max_retries, error = %err, "conflict, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> LogisticsError {
        LogisticsError::ConcurrentModification("stale".to_string())
    }

    #[test]
    fn retries_until_success() {
        let result = with_conflict_retry(3, |attempt| {
            if attempt < 3 { Err(conflict()) } else { Ok(attempt) }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<(), _> = with_conflict_retry(2, |_| {
            calls += 1;
            Err(conflict())
        });
        assert!(matches!(result, Err(LogisticsError::ConcurrentModification(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_conflict_retry(5, |_| {
            calls += 1;
            Err(LogisticsError::Validation("bad".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
