use crate::audio::{MixerCore, OutputCapability, SynthUnit};
use crate::error::EngineError;
use crate::events::{EngineEvent, ScheduledTrigger};
use crate::resources::ResourceManager;
use crate::score::Composition;
use crate::timing::{TransportClock, beats_to_seconds};
use crossbeam::channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Building,
    Scheduled,
    Running,
}

/// Converts a composition into the concrete, stably ordered trigger set
/// for its tempo. Pure: identical input yields an identical ordered set.
///
/// Muted tracks contribute nothing. Velocity is clamped to 127; notes with
/// non-positive duration or negative start are skipped with a warning.
pub fn build_triggers(composition: &Composition) -> Vec<ScheduledTrigger> {
    let tempo = composition.tempo_bpm;
    let mut triggers = Vec::new();

    for track in composition.tracks.iter().filter(|t| !t.mute) {
        for note in &track.notes {
            if note.duration_beats <= 0.0 || note.start_beat < 0.0 {
                warn!(track = %track.id, pitch = %note.pitch,
                      start = note.start_beat, duration = note.duration_beats,
                      "skipping note with invalid timing");
                continue;
            }
            triggers.push(ScheduledTrigger {
                track_id: track.id.clone(),
                pitch: note.pitch,
                at_seconds: beats_to_seconds(note.start_beat, tempo),
                duration_seconds: beats_to_seconds(note.duration_beats, tempo),
                velocity: note.velocity.min(127) as f64 / 127.0,
            });
        }
    }

    // Stable: equal offsets keep composition order.
    triggers.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
    triggers
}

/// Orchestrates transport, resources, and the play/stop state machine.
pub struct Scheduler {
    clock: Arc<TransportClock>,
    resources: ResourceManager,
    events: Sender<EngineEvent>,
    state: PlayState,
}

impl Scheduler {
    pub(crate) fn new(
        clock: Arc<TransportClock>,
        core: Arc<MixerCore>,
        events: Sender<EngineEvent>,
    ) -> Self {
        Self {
            clock,
            resources: ResourceManager::new(core),
            events,
            state: PlayState::Stopped,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn clock(&self) -> &Arc<TransportClock> {
        &self.clock
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Rebuilds the schedule from `composition` and starts the transport.
    /// A play while Running stops first; re-entrant play is never
    /// additive. Nothing is scheduled or allocated unless the audio output
    /// activates.
    pub fn play(
        &mut self,
        composition: &Composition,
        output: &mut dyn OutputCapability,
    ) -> Result<(), EngineError> {
        if self.state == PlayState::Running {
            self.stop();
        }
        if !(composition.tempo_bpm > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "tempo must be positive, got {}",
                composition.tempo_bpm
            )));
        }

        self.state = PlayState::Building;
        if let Err(e) = output.ensure_ready() {
            self.state = PlayState::Stopped;
            return Err(EngineError::Activation(e));
        }

        self.clock.cancel_all();
        self.clock.set_tempo(composition.tempo_bpm);

        // Muted tracks never allocate resources; removed tracks lose
        // theirs. Entries for still-present tracks persist across builds.
        let mut instruments: HashMap<String, Arc<SynthUnit>> = HashMap::new();
        for track in composition.tracks.iter().filter(|t| !t.mute) {
            let (instrument, _channel) = self.resources.ensure(track);
            instruments.insert(track.id.clone(), instrument);
        }
        let keep: HashSet<&str> = composition.tracks.iter().map(|t| t.id.as_str()).collect();
        self.resources.prune(&keep);

        let triggers = build_triggers(composition);
        let scheduled = triggers.len();
        for trigger in triggers {
            let Some(instrument) = instruments.get(&trigger.track_id) else {
                continue;
            };
            let instrument = instrument.clone();
            let events = self.events.clone();
            self.clock.schedule(trigger.at_seconds, move |time| {
                let ScheduledTrigger {
                    track_id,
                    pitch,
                    duration_seconds,
                    velocity,
                    ..
                } = trigger;
                match instrument.trigger(pitch, duration_seconds, time, velocity) {
                    Ok(()) => {
                        let _ = events.send(EngineEvent::NoteTriggered {
                            track_id,
                            pitch,
                            at_seconds: time,
                            duration_seconds,
                            velocity,
                        });
                    }
                    Err(e) => {
                        warn!(track = %track_id, %pitch, error = %e, "note trigger failed");
                    }
                }
            });
        }

        self.state = PlayState::Scheduled;
        info!(
            triggers = scheduled,
            tracks = composition.tracks.len(),
            tempo = composition.tempo_bpm,
            "schedule built"
        );
        let _ = self.events.send(EngineEvent::ScheduleBuilt {
            triggers: scheduled,
            tracks: composition.tracks.len(),
        });

        self.clock.start();
        self.state = PlayState::Running;
        let _ = self.events.send(EngineEvent::PlaybackState { playing: true });
        Ok(())
    }

    /// Cancels every pending trigger and stops the transport. Idempotent
    /// in every state.
    pub fn stop(&mut self) {
        self.clock.stop();
        if self.state != PlayState::Stopped {
            self.state = PlayState::Stopped;
            let _ = self.events.send(EngineEvent::PlaybackState { playing: false });
        }
    }

    /// Stop plus resource teardown. The session disposes the master
    /// output afterwards.
    pub fn dispose(&mut self) {
        self.stop();
        self.resources.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActivationError;
    use crossbeam::channel::{Receiver, unbounded};

    struct StubOutput {
        ready: bool,
    }

    impl OutputCapability for StubOutput {
        fn ensure_ready(&mut self) -> Result<(), ActivationError> {
            if self.ready {
                Ok(())
            } else {
                Err(ActivationError::NoOutputDevice)
            }
        }
    }

    fn test_scheduler() -> (Scheduler, Receiver<EngineEvent>) {
        let (core, _consumer) = MixerCore::new();
        let clock = Arc::new(TransportClock::new(120.0));
        let (tx, rx) = unbounded();
        (Scheduler::new(clock, core, tx), rx)
    }

    fn composition(json: &str) -> Composition {
        let mut composition: Composition = serde_json::from_str(json).unwrap();
        composition.normalize();
        composition
    }

    fn collect_notes(rx: &Receiver<EngineEvent>) -> Vec<(String, f64)> {
        rx.try_iter()
            .filter_map(|e| match e {
                EngineEvent::NoteTriggered {
                    track_id,
                    at_seconds,
                    ..
                } => Some((track_id, at_seconds)),
                _ => None,
            })
            .collect()
    }

    const SCENARIO: &str = r#"{
        "tempo": 100,
        "tracks": [
            {"id": "t1", "instrument": "bass", "mute": false,
             "notes": [
                {"note": "C4", "start": 0, "duration": 2, "velocity": 100},
                {"note": "E4", "start": 2, "duration": 2, "velocity": 80}
             ]}
        ]
    }"#;

    #[test]
    fn beats_convert_against_the_build_tempo() {
        let comp = composition(
            r#"{"tempo": 120, "tracks": [
                {"notes": [{"note": "C4", "start": 0, "duration": 4}]}
            ]}"#,
        );
        let triggers = build_triggers(&comp);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].at_seconds, 0.0);
        assert_eq!(triggers[0].duration_seconds, 2.0);
    }

    #[test]
    fn concrete_scenario_offsets_and_velocities() {
        let triggers = build_triggers(&composition(SCENARIO));
        assert_eq!(triggers.len(), 2);

        assert_eq!(triggers[0].at_seconds, 0.0);
        assert!((triggers[0].duration_seconds - 1.2).abs() < 1e-9);
        assert!((triggers[0].velocity - 0.787).abs() < 1e-3);

        assert!((triggers[1].at_seconds - 1.2).abs() < 1e-9);
        assert!((triggers[1].duration_seconds - 1.2).abs() < 1e-9);
        assert!((triggers[1].velocity - 0.630).abs() < 1e-3);
    }

    #[test]
    fn smaller_start_beat_dispatches_first() {
        let comp = composition(
            r#"{"tempo": 90, "tracks": [
                {"id": "a", "notes": [{"note": "C4", "start": 3, "duration": 1}]},
                {"id": "b", "notes": [{"note": "D4", "start": 1, "duration": 1},
                                       {"note": "E4", "start": 2, "duration": 1}]}
            ]}"#,
        );
        let (mut scheduler, rx) = test_scheduler();
        scheduler.play(&comp, &mut StubOutput { ready: true }).unwrap();
        scheduler.clock().advance(60.0);

        let notes = collect_notes(&rx);
        assert_eq!(
            notes.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            vec!["b", "b", "a"]
        );
        assert!(notes.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn muted_tracks_schedule_nothing_and_allocate_nothing() {
        let comp = composition(
            r#"{"tempo": 120, "tracks": [
                {"id": "m", "mute": true,
                 "notes": [{"note": "C4"}, {"note": "D4"}, {"note": "E4"}]}
            ]}"#,
        );
        let (mut scheduler, rx) = test_scheduler();
        scheduler.play(&comp, &mut StubOutput { ready: true }).unwrap();

        assert_eq!(scheduler.clock().pending_len(), 0);
        assert!(scheduler.resources().is_empty());

        scheduler.clock().advance(60.0);
        assert!(collect_notes(&rx).is_empty());
    }

    #[test]
    fn replaying_is_never_additive() {
        let comp = composition(SCENARIO);
        let (mut scheduler, rx) = test_scheduler();
        let mut output = StubOutput { ready: true };

        scheduler.play(&comp, &mut output).unwrap();
        scheduler.play(&comp, &mut output).unwrap();
        scheduler.clock().advance(60.0);

        // Exactly the trigger set of a single play.
        assert_eq!(collect_notes(&rx).len(), 2);
    }

    #[test]
    fn building_is_pure() {
        let comp = composition(SCENARIO);
        let first = build_triggers(&comp);
        let second = build_triggers(&comp);
        assert_eq!(first, second);
    }

    #[test]
    fn nothing_fires_after_stop() {
        let comp = composition(SCENARIO);
        let (mut scheduler, rx) = test_scheduler();
        scheduler.play(&comp, &mut StubOutput { ready: true }).unwrap();

        scheduler.clock().advance(0.5);
        scheduler.stop();
        assert_eq!(scheduler.state(), PlayState::Stopped);

        // Past every note's end: zero additional trigger invocations.
        scheduler.clock().advance(60.0);
        assert_eq!(collect_notes(&rx).len(), 1);
    }

    #[test]
    fn stop_is_idempotent_in_every_state() {
        let (mut scheduler, _rx) = test_scheduler();
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.state(), PlayState::Stopped);
    }

    #[test]
    fn activation_failure_leaves_everything_untouched() {
        let comp = composition(SCENARIO);
        let (mut scheduler, _rx) = test_scheduler();

        let err = scheduler
            .play(&comp, &mut StubOutput { ready: false })
            .unwrap_err();
        assert!(matches!(err, EngineError::Activation(_)));
        assert_eq!(scheduler.state(), PlayState::Stopped);
        assert_eq!(scheduler.clock().pending_len(), 0);
        assert!(scheduler.resources().is_empty());
        assert!(!scheduler.clock().is_running());
    }

    #[test]
    fn non_positive_tempo_is_rejected() {
        let comp = Composition::new(0.0, vec![]);
        let (mut scheduler, _rx) = test_scheduler();
        let err = scheduler
            .play(&comp, &mut StubOutput { ready: true })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn out_of_range_velocity_clamps_to_full() {
        let comp = composition(
            r#"{"tempo": 120, "tracks": [
                {"notes": [{"note": "C4", "velocity": 200}]}
            ]}"#,
        );
        let triggers = build_triggers(&comp);
        assert_eq!(triggers[0].velocity, 1.0);
    }

    #[test]
    fn invalid_durations_are_skipped_not_fatal() {
        let comp = composition(
            r#"{"tempo": 120, "tracks": [
                {"notes": [{"note": "C4", "duration": 0},
                           {"note": "D4", "start": 1, "duration": 1}]}
            ]}"#,
        );
        let triggers = build_triggers(&comp);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].pitch, "D4".parse().unwrap());
    }

    #[test]
    fn rebuild_reuses_resources_for_unchanged_tracks() {
        let comp = composition(SCENARIO);
        let (mut scheduler, _rx) = test_scheduler();
        let mut output = StubOutput { ready: true };

        scheduler.play(&comp, &mut output).unwrap();
        assert_eq!(scheduler.resources().len(), 1);
        scheduler.stop();
        scheduler.play(&comp, &mut output).unwrap();
        assert_eq!(scheduler.resources().len(), 1);
    }
}
