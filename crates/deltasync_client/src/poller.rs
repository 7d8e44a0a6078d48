//! Timer-driven pull scheduling.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Shared stop signal: flag plus a condvar so a stop interrupts the wait.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Runs a pull callback on a fixed interval until stopped.
///
/// The scheduler owns a plain thread; each tick invokes the callback (which
/// is expected to call the client's `pull`; overlapping ticks coalesce
/// there, not here). [`PullScheduler::stop`] interrupts the current wait and
/// joins the thread, so dropping a stopped scheduler never blocks on a
/// sleeping timer.
pub struct PullScheduler {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl PullScheduler {
    /// Spawns the scheduler, ticking `on_tick` every `interval`.
    ///
    /// The first tick fires after one full interval, not immediately; the
    /// caller typically runs its initial sync before starting the scheduler.
    pub fn start(interval: Duration, on_tick: impl Fn() + Send + 'static) -> Self {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::spawn(move || {
            debug!(?interval, "pull scheduler started");
            let mut stopped = thread_signal.stopped.lock();
            loop {
                let timed_out = thread_signal
                    .wake
                    .wait_for(&mut stopped, interval)
                    .timed_out();
                if *stopped {
                    break;
                }
                if timed_out {
                    drop(stopped);
                    on_tick();
                    stopped = thread_signal.stopped.lock();
                }
            }
            debug!("pull scheduler stopped");
        });

        Self {
            signal,
            handle: Some(handle),
        }
    }

    /// Stops the scheduler and joins its thread. Idempotent.
    pub fn stop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PullScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let mut scheduler = PullScheduler::start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 3);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn stop_interrupts_a_long_wait() {
        let mut scheduler = PullScheduler::start(Duration::from_secs(3600), || {});

        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut scheduler = PullScheduler::start(Duration::from_millis(10), || {});
        scheduler.stop();
        scheduler.stop();
    }
}
