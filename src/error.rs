use thiserror::Error;

/// Errors surfaced to the caller of the playback control surface and the
/// collaborator boundary clients.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request rejected before any work begins.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Audio output could not be started. Fatal for the current `play()`
    /// attempt; transport state remains Stopped.
    #[error("audio output activation failed: {0}")]
    Activation(#[from] ActivationError),

    /// The composition-generation collaborator failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The transcription collaborator failed or timed out.
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
}

#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("no output device available")]
    NoOutputDevice,

    #[error("unsupported output config: {0}")]
    StreamConfig(String),

    #[error("output stream error: {0}")]
    Stream(String),
}

/// Isolated failure while dispatching a single trigger. Logged by the
/// scheduler, never propagated; it does not cancel the remaining schedule.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerError {
    #[error("synthesis unit was disposed")]
    Disposed,

    #[error("voice event queue is full")]
    QueueFull,
}
