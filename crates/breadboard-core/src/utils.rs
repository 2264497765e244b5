/*!
 * Small async and time helpers shared by the Breadboard crates.
 */
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::error;

use crate::error::{Error, Result};

/// Run a fallible future with a timeout
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `what` - A short description of the operation, used in the timeout error
/// * `future` - The future to run
pub async fn with_timeout<F, T>(duration: Duration, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(format!("{} timed out after {:?}", what, duration))),
    }
}

/// Spawn a background task and log its error, if any
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!(task = %task_name, "Task failed: {}", e);
        }
    })
}

/// Convert a (possibly fractional) number of seconds into a [`Duration`]
///
/// Negative, non-finite and out of range inputs yield `None`.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_timeout_success() {
        let result = tokio_test::block_on(with_timeout(Duration::from_millis(100), "quick", async { Ok(42) }));
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;

        match result {
            Err(Error::Timeout(msg)) => assert!(msg.starts_with("slow timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_and_log_completes() {
        let handle = spawn_and_log("failing", async { Err::<(), _>("boom") });
        handle.await.unwrap();
    }

    #[test]
    fn test_seconds_to_duration() {
        assert_eq!(seconds_to_duration(0.5), Some(Duration::from_millis(500)));
        assert_eq!(seconds_to_duration(2.0), Some(Duration::from_secs(2)));
        assert_eq!(seconds_to_duration(-1.0), None);
        assert_eq!(seconds_to_duration(f64::NAN), None);
        assert_eq!(seconds_to_duration(f64::INFINITY), None);
        assert_eq!(seconds_to_duration(1e30), None);
    }
}
