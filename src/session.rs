use crate::audio::MasterOutput;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::scheduler::{PlayState, Scheduler};
use crate::score::Composition;
use crate::timing::TransportClock;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Dispatch granularity while the transport is running.
const RUNNING_TICK: Duration = Duration::from_millis(2);
const IDLE_TICK: Duration = Duration::from_millis(100);

const DEFAULT_TEMPO_BPM: f64 = 120.0;

enum DriverMsg {
    Wake,
    Shutdown,
}

/// Top-level owner of the process-wide audio state: master output,
/// transport clock, scheduler, and the driver thread that advances the
/// clock in real time. The control surface a host may invoke is `init`,
/// `play`, `stop`, and `dispose`; all timing and resource decisions are
/// internal.
///
/// `dispose` consumes the session — a torn-down engine is unusable by
/// construction.
pub struct Session {
    master: MasterOutput,
    scheduler: Scheduler,
    clock: Arc<TransportClock>,
    events: Receiver<EngineEvent>,
    driver_tx: Sender<DriverMsg>,
    driver: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new() -> Self {
        let master = MasterOutput::new();
        let clock = Arc::new(TransportClock::new(DEFAULT_TEMPO_BPM));
        let (event_tx, event_rx) = unbounded();
        let scheduler = Scheduler::new(clock.clone(), master.core().clone(), event_tx);

        let (driver_tx, driver_rx) = unbounded();
        let driver_clock = clock.clone();
        let driver = std::thread::spawn(move || drive(driver_clock, driver_rx));

        Self {
            master,
            scheduler,
            clock,
            events: event_rx,
            driver_tx,
            driver: Some(driver),
        }
    }

    /// Activates the audio output. Idempotent; `play` activates on demand,
    /// so calling this first is optional but lets a host surface
    /// activation problems early.
    pub fn init(&mut self) -> Result<(), EngineError> {
        self.master.activate().map_err(EngineError::Activation)
    }

    /// Rebuilds the schedule from `composition` and starts playback.
    pub fn play(&mut self, composition: &Composition) -> Result<(), EngineError> {
        self.scheduler.play(composition, &mut self.master)?;
        let _ = self.driver_tx.send(DriverMsg::Wake);
        Ok(())
    }

    /// Cancels everything pending and stops the transport. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn state(&self) -> PlayState {
        self.scheduler.state()
    }

    /// Elapsed seconds since playback started.
    pub fn position(&self) -> f64 {
        self.clock.position()
    }

    /// The engine's notification stream. Clone the receiver to consume it
    /// from another thread.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    /// Stops playback, disposes every track resource and the master
    /// output, and joins the driver thread.
    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.scheduler.dispose();
        self.master.dispose();
        let _ = self.driver_tx.send(DriverMsg::Shutdown);
        if let Some(handle) = self.driver.take() {
            let _ = handle.join();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.teardown();
        }
    }
}

/// Real-time driver: advances the clock with measured wall time at a
/// fixed tick while the transport runs. Trigger callbacks therefore fire
/// on this thread, one at a time.
fn drive(clock: Arc<TransportClock>, rx: Receiver<DriverMsg>) {
    let mut last = Instant::now();
    loop {
        let tick = if clock.is_running() {
            RUNNING_TICK
        } else {
            IDLE_TICK
        };
        match rx.recv_timeout(tick) {
            Ok(DriverMsg::Wake) => last = Instant::now(),
            Ok(DriverMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                clock.advance((now - last).as_secs_f64());
                last = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_stopped() {
        let session = Session::new();
        assert_eq!(session.state(), PlayState::Stopped);
        assert_eq!(session.position(), 0.0);
    }

    #[test]
    fn stop_without_play_is_fine() {
        let mut session = Session::new();
        session.stop();
        session.stop();
        assert_eq!(session.state(), PlayState::Stopped);
    }

    #[test]
    fn dispose_joins_the_driver() {
        let session = Session::new();
        session.dispose();
    }

    #[test]
    fn drop_shuts_down_cleanly() {
        let _ = Session::new();
    }
}
