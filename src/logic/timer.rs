//! Attempt Timer
//!
//! Independent countdown over the attempt's remaining time budget.
//! Decrements once per second and triggers the shared finalize path when
//! it reaches zero. Cancelled whenever the attempt reaches any other
//! terminal state first; the finalize latch makes the race single-fire.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Countdown task handle
pub struct AttemptTimer {
    remaining: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl AttemptTimer {
    /// Spawn the countdown. `on_expiry` runs exactly once, when the
    /// budget hits zero before the timer is cancelled.
    pub fn start<F, Fut>(remaining_secs: u64, on_expiry: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let remaining = Arc::new(AtomicU64::new(remaining_secs));
        let cancelled = Arc::new(AtomicBool::new(false));

        let task_remaining = Arc::clone(&remaining);
        let task_cancelled = Arc::clone(&cancelled);
        let handle = tokio::spawn(async move {
            loop {
                if task_cancelled.load(Ordering::SeqCst) {
                    return;
                }
                if task_remaining.load(Ordering::SeqCst) == 0 {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
                if task_cancelled.load(Ordering::SeqCst) {
                    return;
                }
                task_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            log::info!("Attempt time budget exhausted");
            on_expiry().await;
        });

        Self {
            remaining,
            cancelled,
            handle,
        }
    }

    /// Stop the countdown without firing. Idempotent; a cancel that
    /// loses the race against expiry is absorbed by the caller's latch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TESTS
// ============================================================================
