//! Supervised tasks.
//!
//! A long-lived loop (drop timer, table dispatcher, accept loop) runs inside a
//! supervisor: if the loop panics the panic is logged and a fresh instance is
//! spawned from the factory. A normal return ends supervision, and aborting the
//! supervisor handle aborts the running instance with it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Pause before relaunching a task that panicked.
const RESTART_DELAY: Duration = Duration::from_millis(100);

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn `factory()` and relaunch it whenever it panics.
pub fn supervise<F, Fut>(name: &'static str, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u32 = 0;
        loop {
            let mut task = AbortOnDrop(tokio::spawn(factory()));
            match (&mut task.0).await {
                Ok(()) => {
                    debug!(task = name, "supervised task finished");
                    return;
                }
                Err(err) if err.is_panic() => {
                    restarts += 1;
                    error!(task = name, restarts, "supervised task panicked, restarting");
                    tokio::time::sleep(RESTART_DELAY).await;
                }
                Err(_) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn relaunches_after_panic_until_clean_exit() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = supervise("flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("boom");
                }
            }
        });
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_the_inner_task() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = supervise("ticker", move || {
            let counter = counter.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.abort();
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
