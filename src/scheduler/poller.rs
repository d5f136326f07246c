//! Fixed-interval driver for pollable schedulers
//!
//! Schedulers are plain structs with a `poll()` method; a poller owns the
//! timer. It re-arms only while the target reports itself running, so
//! stopping a scheduler also ends its task on the next tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Something driven by a repeating poll.
pub trait Pollable: Send + 'static {
    fn poll(&mut self);
    fn is_running(&self) -> bool;
    fn poll_interval(&self) -> Duration;
}

/// Owns a running poll task; aborts it when dropped.
pub struct PollerHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `target` on its own interval until it stops running.
///
/// Late ticks are skipped rather than bunched: every scheduler here already
/// catches up from the clock on its next poll.
pub fn spawn_poller<P: Pollable>(
    runtime: &Handle,
    target: Arc<Mutex<P>>,
    name: &'static str,
) -> PollerHandle {
    let period = match target.lock() {
        Ok(guard) => guard.poll_interval(),
        Err(poisoned) => poisoned.into_inner().poll_interval(),
    };

    let task = runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let keep_going = match target.lock() {
                Ok(mut guard) => {
                    if guard.is_running() {
                        guard.poll();
                    }
                    guard.is_running()
                }
                Err(_) => {
                    log::error!("[Poller] {} lock poisoned, stopping", name);
                    false
                }
            };
            if !keep_going {
                log::debug!("[Poller] {} stopped", name);
                break;
            }
        }
    });

    PollerHandle { name, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        polls: usize,
        stop_after: usize,
    }

    impl Pollable for Counter {
        fn poll(&mut self) {
            self.polls += 1;
        }

        fn is_running(&self) -> bool {
            self.polls < self.stop_after
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(2)
        }
    }

    #[tokio::test]
    async fn test_poller_stops_when_target_stops() {
        let target = Arc::new(Mutex::new(Counter {
            polls: 0,
            stop_after: 3,
        }));
        let handle = spawn_poller(&Handle::current(), Arc::clone(&target), "counter");

        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(handle.is_finished(), "poller should exit once not running");
        assert_eq!(target.lock().unwrap().polls, 3);
        assert_eq!(handle.name(), "counter");
    }

    #[tokio::test]
    async fn test_dropping_handle_aborts_task() {
        let target = Arc::new(Mutex::new(Counter {
            polls: 0,
            stop_after: usize::MAX,
        }));
        let handle = spawn_poller(&Handle::current(), Arc::clone(&target), "forever");
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let polls = target.lock().unwrap().polls;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(target.lock().unwrap().polls, polls);
    }
}
