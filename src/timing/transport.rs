use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

type TriggerFn = Box<dyn FnOnce(f64) + Send>;

/// One registered one-shot callback. `seq` is the registration order and
/// breaks ties between callbacks due at the same instant.
struct Pending {
    at: f64,
    seq: u64,
    callback: TriggerFn,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed so the std max-heap pops the earliest (at, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

struct ClockState {
    run: RunState,
    tempo_bpm: f64,
    /// Elapsed seconds since the last `start()`. Reset to 0 by `stop()`.
    position: f64,
    pending: BinaryHeap<Pending>,
    next_seq: u64,
}

/// Master time base and event dispatcher.
///
/// The clock is driven: something calls [`TransportClock::advance`] with
/// elapsed wall time (the session's driver thread during real playback,
/// the test directly with simulated time). Dispatch happens under the
/// clock lock, which is what makes `stop()` atomic with respect to it: a
/// concurrent `stop()` waits for the in-flight callback to return, clears
/// the pending set, and after that nothing from the old schedule fires.
///
/// Callbacks must not call back into the clock.
pub struct TransportClock {
    state: Mutex<ClockState>,
}

impl TransportClock {
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            state: Mutex::new(ClockState {
                run: RunState::Stopped,
                tempo_bpm,
                position: 0.0,
                pending: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Updates the tempo. Offsets already registered were computed against
    /// the tempo in effect at schedule time and do not move.
    pub fn set_tempo(&self, bpm: f64) {
        if bpm <= 0.0 {
            warn!(bpm, "ignoring non-positive tempo");
            return;
        }
        self.state.lock().tempo_bpm = bpm;
    }

    pub fn tempo(&self) -> f64 {
        self.state.lock().tempo_bpm
    }

    pub fn position(&self) -> f64 {
        self.state.lock().position
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().run
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Registers a one-shot callback to fire once `at_seconds` after the
    /// next `start()`. Negative offsets clamp to 0. The callback receives
    /// its scheduled time.
    pub fn schedule(&self, at_seconds: f64, callback: impl FnOnce(f64) + Send + 'static) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Pending {
            at: at_seconds.max(0.0),
            seq,
            callback: Box::new(callback),
        });
    }

    /// Stopped → Running. No-op while already Running.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.run == RunState::Running {
            return;
        }
        state.run = RunState::Running;
        debug!(pending = state.pending.len(), "transport started");
    }

    /// Cancels every pending callback, resets position to 0, transitions to
    /// Stopped. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.position = 0.0;
        state.run = RunState::Stopped;
    }

    /// Clears the pending set without changing run state or position.
    pub fn cancel_all(&self) {
        self.state.lock().pending.clear();
    }

    /// Seconds from the current position to the earliest pending callback,
    /// if any. Due-or-overdue callbacks report 0.
    pub fn seconds_until_next_due(&self) -> Option<f64> {
        let state = self.state.lock();
        state
            .pending
            .peek()
            .map(|p| (p.at - state.position).max(0.0))
    }

    /// Moves the position forward by `dt` seconds and dispatches every
    /// callback that has come due, in (time, registration) order. No-op
    /// while Stopped.
    pub fn advance(&self, dt: f64) {
        let mut state = self.state.lock();
        if state.run != RunState::Running {
            return;
        }
        state.position += dt.max(0.0);

        loop {
            let due = match state.pending.peek() {
                Some(p) => p.at <= state.position,
                None => false,
            };
            if !due {
                break;
            }
            let Pending { at, callback, .. } = state.pending.pop().unwrap();
            if catch_unwind(AssertUnwindSafe(|| callback(at))).is_err() {
                warn!(at, "trigger callback panicked; continuing dispatch");
            }
        }
    }
}
