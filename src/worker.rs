//! Offloads blocking archive operations so the calling task never stalls.

use crate::error::{ArchiveError, Result};

/// Runs `op` on tokio's blocking pool and waits for it.
///
/// Entries inside one operation are still processed sequentially.
pub async fn run_blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| ArchiveError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn result_and_error_pass_through() {
        assert_eq!(run_blocking(|| Ok(7)).await.unwrap(), 7);
        let err = run_blocking::<(), _>(|| Err(ArchiveError::Validation("nope".into())))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn panics_become_worker_errors() {
        let err = run_blocking::<(), _>(|| panic!("boom")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Worker(_)));
    }
}
