//! Cooperative interrupt handling.
//!
//! Ctrl+C only raises a flag. The session looks at it between files and
//! between prompts, and a prompt waiting on input wakes up immediately. A
//! running encoder is never killed from here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    raised: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route Ctrl+C into this signal for the rest of the process
    pub fn install_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Could not listen for Ctrl+C: {}", e);
                    break;
                }
                debug!("Ctrl+C received");
                signal.raise();
            }
        });
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }

    /// Resolves once an interrupt is pending
    pub async fn raised_wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_take_consumes() {
        let signal = InterruptSignal::new();
        assert!(!signal.take());
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        assert!(!signal.is_raised());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_raise() {
        let signal = InterruptSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.raised_wait().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.raise();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("waiter did not wake")
            .unwrap();
    }
}
