//! Bounded collaborator calls
//!
//! Content-store and audit-sink calls are awaited inline by the engine but
//! must never stall a learner's day. Every call goes through [`bounded`],
//! which turns both a slow call and a failed call into
//! `GameError::PersistenceUnavailable`.

use std::future::Future;
use std::time::Duration;

use crate::core::error::{GameError, Result};

pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(GameError::PersistenceUnavailable { reason, .. })) => {
            Err(GameError::unavailable(operation, reason))
        }
        Ok(Err(e)) => Err(GameError::unavailable(operation, e)),
        Err(_) => Err(GameError::unavailable(
            operation,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_value_through() {
        let value = bounded(Duration::from_millis(50), "lookup", async { Ok(3) }).await;
        assert_eq!(value.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let result: Result<()> = bounded(Duration::from_millis(10), "lookup", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(GameError::PersistenceUnavailable { operation, reason }) => {
                assert_eq!(operation, "lookup");
                assert!(reason.contains("timed out"));
            }
            other => panic!("expected PersistenceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_is_relabelled() {
        let result: Result<()> = bounded(Duration::from_millis(50), "append_attempt", async {
            Err(GameError::InvalidState("boom".into()))
        })
        .await;

        assert!(matches!(
            result,
            Err(GameError::PersistenceUnavailable { operation: "append_attempt", .. })
        ));
    }
}
