//! Timed refresh loop with cooperative cancellation.
//!
//! The loop is a two-state machine ([`LoopState`]) driven by an
//! [`EventSource`]. Production uses [`TickerEvents`]; tests inject scripted
//! events to exercise cancellation races deterministically.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Events that wake the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// The refresh interval elapsed.
    Tick,
    /// Shutdown was requested.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

impl LoopState {
    /// Apply `event`, returning the next state and whether a cycle should run.
    ///
    /// `Stopped` is terminal.
    pub fn on_event(self, event: LoopEvent) -> (LoopState, bool) {
        match (self, event) {
            (LoopState::Running, LoopEvent::Tick) => (LoopState::Running, true),
            (LoopState::Running, LoopEvent::Cancel) => (LoopState::Stopped, false),
            (LoopState::Stopped, _) => (LoopState::Stopped, false),
        }
    }
}

/// Blocks until the next event is available.
pub trait EventSource {
    fn next_event(&mut self) -> LoopEvent;
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
}

/// Run `cycle` once immediately, then once per tick until cancelled.
///
/// Cycles run inline on the caller's thread, so they never overlap and a
/// cancellation is only observed once the current cycle has returned.
pub fn run_loop<E: EventSource + ?Sized, F: FnMut()>(events: &mut E, mut cycle: F) -> LoopSummary {
    info!("refresh loop started");
    cycle();
    let mut cycles = 1u64;

    let mut state = LoopState::Running;
    while state == LoopState::Running {
        let event = events.next_event();
        debug!(?event, "loop woke");
        let (next, run) = state.on_event(event);
        if run {
            cycle();
            cycles += 1;
        }
        state = next;
    }

    info!(cycles, "refresh loop stopped");
    LoopSummary { cycles }
}

/// Shared, level-triggered cancellation flag.
///
/// Once cancelled it stays cancelled; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for cancellation. Returns whether it was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = wake
            .wait_while(guard, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Fixed-interval ticker racing a [`CancelToken`].
///
/// A pending cancellation always wins over a due tick. If a cycle overruns the
/// interval, exactly one tick fires immediately and the schedule restarts from
/// that moment; further missed ticks are dropped. An interval too large to
/// place on the monotonic clock never ticks; the source then only waits for
/// cancellation.
#[derive(Debug)]
pub struct TickerEvents {
    interval: Duration,
    next_tick: Option<Instant>,
    cancel: CancelToken,
}

impl TickerEvents {
    pub fn new(interval: Duration, cancel: CancelToken) -> Self {
        Self {
            interval,
            next_tick: Instant::now().checked_add(interval),
            cancel,
        }
    }
}

impl EventSource for TickerEvents {
    fn next_event(&mut self) -> LoopEvent {
        let Some(next_tick) = self.next_tick else {
            self.cancel.wait();
            return LoopEvent::Cancel;
        };
        let timeout = next_tick.saturating_duration_since(Instant::now());
        if self.cancel.wait_timeout(timeout) {
            return LoopEvent::Cancel;
        }
        let now = Instant::now();
        self.next_tick = next_tick
            .checked_add(self.interval)
            .filter(|next| *next > now)
            .or_else(|| now.checked_add(self.interval));
        LoopEvent::Tick
    }
}
