// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Privilege keep-alive.
//!
//! Installing Homebrew and some packages asks for administrator privileges
//! part way through a run that can easily outlast the sudo timestamp. So,
//! sudo is asked for once up front, and a background task refreshes the
//! timestamp periodically for as long as the run lasts.

use crate::exec::{CommandLine, ExecError};

use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default refresh period of sudo timestamp.
pub const SUDO_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Ask for administrator privileges interactively.
///
/// # Errors
///
/// - Return [`ExecError::Syscall`] if user refuses or fails to authenticate.
pub fn acquire_privilege() -> Result<(), ExecError> {
    CommandLine::new("sudo").arg("-v").run_interactive()
}

/// Background refresh task, stopped when dropped.
#[derive(Debug)]
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl KeepAlive {
    /// Spawn task calling `refresh` every `period` on the current runtime.
    ///
    /// The task stops on its own once `refresh` returns false.
    pub fn spawn<F>(period: Duration, refresh: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let refresh = Arc::new(refresh);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);

            // INVARIANT: First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let refresh = Arc::clone(&refresh);
                match tokio::task::spawn_blocking(move || refresh()).await {
                    Ok(true) => debug!("keep-alive refreshed"),
                    Ok(false) => {
                        warn!("keep-alive refresh failed, stop refreshing");
                        break;
                    }
                    Err(error) => {
                        warn!("keep-alive task failed: {error}");
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    /// Keep sudo timestamp fresh without ever prompting.
    pub fn sudo(period: Duration) -> Self {
        Self::spawn(period, || {
            CommandLine::new("sudo").args(["-n", "-v"]).succeeds()
        })
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn refreshes_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let keepalive = KeepAlive::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        drop(keepalive);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let stopped_at = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn failed_refresh_stops_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _keepalive = KeepAlive::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
