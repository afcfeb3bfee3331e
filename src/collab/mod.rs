//! Boundary clients for the external collaborators: composition
//! generation from a text prompt and audio transcription. The remote
//! transport behind each one is an injected backend trait; these clients
//! own input validation, response handling, and the bounded polling
//! discipline.

pub mod generation;
pub mod transcription;

pub use generation::{GenerationBackend, GenerationClient, GenerationRequest};
pub use transcription::{
    JobStatus, RawNoteEvent, TranscriptionBackend, TranscriptionClient, TranscriptionSource,
};
