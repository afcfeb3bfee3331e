use crate::score::Pitch;

/// One concrete trigger derived from a composition at build time: absolute
/// offset and duration in seconds, velocity normalized to 0..1. Never
/// persisted; rebuilding from identical input yields an identical ordered
/// set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTrigger {
    pub track_id: String,
    pub pitch: Pitch,
    pub at_seconds: f64,
    pub duration_seconds: f64,
    pub velocity: f64,
}

/// Notifications emitted by the engine toward its host. This is the
/// observer surface a UI subscribes to instead of reading engine state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaybackState {
        playing: bool,
    },
    ScheduleBuilt {
        triggers: usize,
        tracks: usize,
    },
    NoteTriggered {
        track_id: String,
        pitch: Pitch,
        at_seconds: f64,
        duration_seconds: f64,
        velocity: f64,
    },
}
