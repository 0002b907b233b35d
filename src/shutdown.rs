//! Background loops driven by a [`CancellationToken`].
//!
//! Samplers hold a child of the orchestrator's root token; their `Drop`
//! cancels the child and joins the thread returned by [`spawn_periodic`].

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::select;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Run `tick` every `period` on a named OS thread until `token` is cancelled.
///
/// The thread drives its own current-thread runtime, so cancellation wakes it
/// immediately instead of after the next tick. The first tick fires one full
/// period after the spawn.
pub fn spawn_periodic<F>(
    name: &str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    let label = name.to_string();
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(%err, thread = %label, "failed to build timer runtime");
                return;
            }
        };

        runtime.block_on(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(),
                }
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ticks_until_cancelled() {
        let token = CancellationToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ticks);
        let handle = spawn_periodic(
            "test-ticker",
            Duration::from_millis(10),
            token.clone(),
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        token.cancel();
        handle.join().unwrap();

        let stopped_at = ticks.load(Ordering::SeqCst);
        assert!(stopped_at >= 3);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(ticks.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn cancel_wakes_a_long_period_immediately() {
        let token = CancellationToken::new();
        let handle =
            spawn_periodic("test-sleeper", Duration::from_secs(30), token.clone(), || {}).unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = std::time::Instant::now();
        token.cancel();
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn parent_cancellation_stops_child_loops() {
        let root = CancellationToken::new();
        let handle =
            spawn_periodic("test-child", Duration::from_secs(30), root.child_token(), || {})
                .unwrap();
        root.cancel();
        handle.join().unwrap();
        assert!(root.child_token().is_cancelled());
    }
}
