use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

/// Returned by [`Cancellation::sleep`] when the wait was cut short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// Shared cancellation flag for timed waits.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Sleeps for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return Err(Cancelled);
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = rx.wait_for(|cancelled| *cancelled) => Err(Cancelled),
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_sleep_completes() {
        let cancellation = Cancellation::new();
        let result = cancellation.sleep(Duration::from_millis(10)).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let cancellation = Cancellation::new();
        let canceller = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = cancellation.sleep(Duration::from_secs(30)).await;

        assert_eq!(result, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_after_cancel_returns_immediately() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let result = cancellation.sleep(Duration::from_secs(30)).await;
        assert_eq!(result, Err(Cancelled));
    }
}
