//! Coordination between the full backend refresh and request-time readers
//!
//! The refresh raises the in-progress flag and purges the organizational-unit
//! region while holding the write side of the lock. Readers take the read side,
//! check the flag and read in one step, so a reader never observes the purged
//! region without also observing the flag.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Default)]
pub struct RefreshGate {
    in_progress: AtomicBool,
    lock: RwLock<()>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Raise the flag and run `purge` atomically with respect to readers.
    ///
    /// The flag is lowered when the returned guard is dropped.
    pub fn begin<F: FnOnce()>(&self, purge: F) -> RefreshGuard<'_> {
        let _write = self.lock.write();
        self.in_progress.store(true, Ordering::Release);
        purge();
        RefreshGuard { gate: self }
    }

    /// Run `read` unless a refresh is in progress
    pub fn try_read<T, F: FnOnce() -> T>(&self, read: F) -> Option<T> {
        let _read = self.lock.read();
        if self.is_refreshing() {
            None
        } else {
            Some(read())
        }
    }

    /// Poll until no refresh is in progress, then run `read`.
    ///
    /// After `timeout` the reader gives up waiting and reads whatever the
    /// region holds.
    pub async fn read_when_idle<T, F: FnOnce() -> T>(
        &self,
        poll: Duration,
        timeout: Duration,
        read: F,
    ) -> T {
        let started = Instant::now();
        loop {
            {
                let _read = self.lock.read();
                if !self.is_refreshing() {
                    return read();
                }
            }

            if started.elapsed() >= timeout {
                warn!(
                    "Refresh still running after {:?}, reading without waiting",
                    timeout
                );
                let _read = self.lock.read();
                return read();
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Lowers the in-progress flag on drop
pub struct RefreshGuard<'a> {
    gate: &'a RefreshGate,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.gate.in_progress.store(false, Ordering::Release);
    }
}
