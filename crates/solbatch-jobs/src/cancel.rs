//! Cooperative cancellation
//!
//! A [`CancelToken`] trips once; every [`CancelSignal`] cloned from it
//! observes the trip. The runner stops dispatching when its signal fires.

use tokio::sync::watch;

/// Trips cancellation
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// Observes cancellation
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create an untripped token and its signal
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                tx: std::sync::Arc::new(tx),
            },
            CancelSignal { rx },
        )
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// New signal observing this token
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trip this token when the process receives an interrupt
    ///
    /// Spawns a background task on the current runtime.
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight work without dispatching more");
                token.cancel();
            }
        });
    }
}

impl CancelSignal {
    /// Signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation has been requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Pending forever if the token is dropped untripped.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|tripped| *tripped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_observes_cancel() {
        let (token, mut signal) = CancelToken::new();
        assert!(!signal.is_cancelled());
        token.cancel();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn late_subscriber_sees_trip() {
        let (token, _signal) = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.signal().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_token_never_fires() {
        let (token, mut signal) = CancelToken::new();
        drop(token);
        let waited = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!CancelSignal::never().is_cancelled());
    }
}
