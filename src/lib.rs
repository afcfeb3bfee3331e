//! Playback scheduling engine for a composition tool: renders a symbolic
//! score into precisely timed triggers against a shared transport clock
//! and manages per-track synthesis resources across play/stop cycles.

pub mod audio;
pub mod collab;
pub mod error;
pub mod events;
pub mod resources;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod timing;

pub use error::{ActivationError, EngineError, TriggerError};
pub use events::{EngineEvent, ScheduledTrigger};
pub use scheduler::{PlayState, Scheduler, build_triggers};
pub use score::{Composition, InstrumentKind, Note, Pitch, Track};
pub use session::Session;
pub use timing::{RunState, TransportClock, beats_to_seconds};
