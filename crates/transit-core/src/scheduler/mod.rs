// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Polling scheduler.
//!
//! Owns at most one repeating poll loop. Every `start` and `stop` bumps a
//! generation counter; each tick hands its task a [`PollTicket`] stamped with
//! the generation it was started under, and results are only applied while
//! that ticket is still current.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::model::ViewMode;

/// Default poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Generation stamp carried by a poll cycle or a mode transition.
#[derive(Debug, Clone)]
pub struct PollTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl PollTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no `start`/`stop` happened since this ticket was issued.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// The one live poll loop.
#[derive(Debug)]
pub struct PollHandle {
    mode: ViewMode,
    generation: u64,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl PollHandle {
    #[must_use]
    pub fn mode(&self) -> &ViewMode {
        &self.mode
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Scheduler enforcing a single active poll loop.
#[derive(Debug, Default)]
pub struct PollScheduler {
    generation: Arc<AtomicU64>,
    active: Option<PollHandle>,
    starts: u64,
}

impl PollScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling `task` every `interval`, cancelling any running loop.
    ///
    /// The first tick fires one interval after the call. Ticks never overlap:
    /// the loop awaits each task before waiting for the next tick, and ticks
    /// missed while a task ran are skipped. Must be called from within a
    /// tokio runtime.
    pub fn start<F, Fut>(&mut self, mode: ViewMode, interval: Duration, mut task: F) -> PollTicket
    where
        F: FnMut(PollTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = PollTicket {
            generation,
            current: Arc::clone(&self.generation),
        };
        let cancel_token = CancellationToken::new();

        info!(
            "Starting {} polling every {}ms (generation {})",
            mode,
            interval.as_millis(),
            generation
        );

        let loop_ticket = ticket.clone();
        let loop_cancel = cancel_token.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = loop_cancel.cancelled() => break,
                }

                if !loop_ticket.is_current() {
                    break;
                }

                tokio::select! {
                    () = task(loop_ticket.clone()) => {}
                    () = loop_cancel.cancelled() => break,
                }
            }

            debug!("Poll loop for generation {} exited", generation);
        });

        self.active = Some(PollHandle {
            mode,
            generation,
            interval,
            cancel_token,
        });
        self.starts += 1;

        ticket
    }

    /// Cancel the running loop, if any, and invalidate outstanding tickets.
    pub fn stop(&mut self) -> Option<PollHandle> {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let handle = self.active.take()?;
        handle.cancel_token.cancel();
        info!(
            "Stopped {} polling (generation {})",
            handle.mode, handle.generation
        );
        Some(handle)
    }

    /// Ticket for the current generation.
    ///
    /// Mode transitions take one after `stop` and check it before applying
    /// their initial fetch.
    #[must_use]
    pub fn ticket(&self) -> PollTicket {
        PollTicket {
            generation: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn active(&self) -> Option<&PollHandle> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Number of loops started over the scheduler's lifetime.
    #[must_use]
    pub fn starts(&self) -> u64 {
        self.starts
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::model::RegionFilter;

    fn counting_task(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnMut(PollTicket) -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move |_ticket| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    fn global() -> ViewMode {
        ViewMode::Global(RegionFilter::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();
        scheduler.start(global(), Duration::from_secs(5), counting_task(&counter));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0, "first tick waits one interval");

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_cancels_previous_loop() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let old_ticket = scheduler.start(global(), Duration::from_secs(5), counting_task(&first));
        let new_ticket = scheduler.start(
            ViewMode::Focused("route_1".to_string()),
            Duration::from_secs(5),
            counting_task(&second),
        );

        assert!(!old_ticket.is_current());
        assert!(new_ticket.is_current());
        assert!(new_ticket.generation() > old_ticket.generation());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.starts(), 2);
        assert!(scheduler.active().unwrap().mode().is_focused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks_and_invalidates_ticket() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();
        let ticket = scheduler.start(global(), Duration::from_secs(5), counting_task(&counter));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let handle = scheduler.stop().unwrap();
        assert_eq!(handle.generation(), ticket.generation());
        assert!(!ticket.is_current());
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_task_is_dropped_on_restart() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let slow_finished = Arc::clone(&finished);
        scheduler.start(global(), Duration::from_secs(5), move |_ticket| {
            let finished = Arc::clone(&slow_finished);
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Tick at 5s starts a 3s task; restart while it is in flight
        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_never_overlaps() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();

        let (r, m) = (Arc::clone(&running), Arc::clone(&max_running));
        scheduler.start(global(), Duration::from_secs(1), move |_ticket| {
            let (running, max_running) = (Arc::clone(&r), Arc::clone(&m));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2500)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }
}
