// Start Cancellation Token

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal for an in-flight Start
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Only set for `never()`: keeps the channel open so `cancelled()` pends
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token nobody can cancel
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// A dropped handle can no longer cancel, so this then pends forever.
    pub async fn cancelled(&mut self) {
        let closed = self.rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancel sender
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation of every token cloned from this channel
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancel channel
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx },
        CancelToken {
            rx,
            _keepalive: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, mut token) = cancel_channel();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            token.is_cancelled()
        });

        handle.cancel();
        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, mut token) = cancel_channel();
        drop(handle);

        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_never_token_pends() {
        let mut token = CancelToken::never();
        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
