//! Repeating carousel advance, owned by a handle.
//!
//! The worker thread lives exactly as long as its [`Autoplay`] handle:
//! [`Autoplay::stop`] or dropping the handle signals the worker and joins it,
//! so no tick can run once either returns.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug)]
pub struct Autoplay {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl Autoplay {
    /// Spawn a worker calling `tick` every `interval`.
    ///
    /// Ticks are scheduled against fixed deadlines, so a slow `tick` does not
    /// push later ones back. Deadlines missed while a tick ran are skipped,
    /// not replayed: the next tick is at least `interval` away. Manual
    /// navigation does not reset the schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start<F>(interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let interval = interval.max(Duration::from_millis(1));

        let worker = std::thread::Builder::new()
            .name("engage-autoplay".to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            tick();
                            counter.fetch_add(1, Ordering::SeqCst);
                            deadline += interval;
                            let now = Instant::now();
                            if deadline <= now {
                                deadline = now + interval;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("autoplay worker exited");
            })?;

        debug!(interval_ms = interval.as_millis(), "autoplay started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            ticks,
        })
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker and wait for it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("autoplay tick panicked");
            }
        }
    }
}

impl Drop for Autoplay {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, PoisonError};
    use std::thread;

    #[test]
    fn ticks_until_stopped() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let mut autoplay = Autoplay::start(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn");

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        autoplay.stop();
        assert!(!autoplay.is_running());

        let after_stop = seen.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        assert_eq!(autoplay.ticks(), after_stop);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn drop_joins_worker() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let autoplay = Autoplay::start(Duration::from_millis(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn");
        thread::sleep(Duration::from_millis(10));
        drop(autoplay);

        let after_drop = seen.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(seen.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn slow_tick_does_not_cause_catch_up_burst() {
        let interval = Duration::from_millis(20);
        let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorded = Arc::clone(&starts);
        let mut autoplay = Autoplay::start(interval, move || {
            let first = {
                let mut starts = recorded.lock().unwrap_or_else(PoisonError::into_inner);
                starts.push(Instant::now());
                starts.len() == 1
            };
            if first {
                thread::sleep(Duration::from_millis(110));
            }
        })
        .expect("spawn");

        let deadline = Instant::now() + Duration::from_secs(5);
        while starts.lock().map_or(0, |s| s.len()) < 4 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        autoplay.stop();

        let starts = starts.lock().expect("lock").clone();
        assert!(starts.len() >= 4, "only {} ticks ran", starts.len());
        let slack = Duration::from_millis(3);
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap + slack >= interval, "ticks {gap:?} apart");
        }
    }

    #[test]
    fn stop_before_first_tick_fires_nothing() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let mut autoplay = Autoplay::start(Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn");
        autoplay.stop();
        autoplay.stop();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
