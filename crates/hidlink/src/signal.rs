//! One-shot session lifecycle signal.
//!
//! The signal starts pending and fires at most once. Firing is idempotent and
//! may happen from any code path. Waiters that arrive after the signal fired
//! complete immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Single-fire, multi-waiter "session ended" flag.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct LifecycleSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl LifecycleSignal {
    /// Creates a pending signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal.
    ///
    /// Returns true for the call that transitioned the signal, false for every
    /// later call.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether the signal has fired.
    ///
    /// True as soon as any `fire` call has started, so every caller that
    /// returned from `fire` sees it set.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Waits until the signal fires.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Returns an owned future that completes when the signal fires.
    ///
    /// Unlike [`wait`](Self::wait) the future does not borrow the signal and
    /// can be moved into a spawned task.
    pub fn wait_owned(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_signal_starts_pending() {
        let signal = LifecycleSignal::new();
        assert!(!signal.is_fired());

        let result = timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(result.is_err(), "wait resolved before fire");
    }

    #[tokio::test]
    async fn test_fire_is_idempotent() {
        let signal = LifecycleSignal::new();

        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fire_has_one_winner_and_all_see_fired() {
        let signal = LifecycleSignal::new();

        let firers: Vec<_> = (0..8)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move {
                    let won = signal.fire();
                    assert!(signal.is_fired(), "fire returned before the flag was set");
                    won
                })
            })
            .collect();

        let mut winners = 0;
        for firer in firers {
            if firer.await.expect("firer panicked") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        timeout(Duration::from_millis(20), signal.wait())
            .await
            .expect("waiter should resolve after fire");
    }

    #[tokio::test]
    async fn test_waiter_after_fire_resolves_immediately() {
        let signal = LifecycleSignal::new();
        signal.fire();

        timeout(Duration::from_millis(20), signal.wait())
            .await
            .expect("late waiter should not hang");
        timeout(Duration::from_millis(20), signal.wait_owned())
            .await
            .expect("late owned waiter should not hang");
    }

    #[tokio::test]
    async fn test_all_waiters_observe_fire() {
        let signal = LifecycleSignal::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| tokio::spawn(signal.wait_owned()))
            .collect();

        tokio::task::yield_now().await;
        signal.clone().fire();

        for waiter in waiters {
            timeout(Duration::from_millis(100), waiter)
                .await
                .expect("waiter timed out")
                .expect("waiter panicked");
        }
    }
}
