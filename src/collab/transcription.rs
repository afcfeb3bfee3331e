use crate::error::EngineError;
use crate::score::{InstrumentKind, Note, Pitch, Track};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Register split for the track-organization pass: below C3 goes to the
/// bass track.
const BASS_SPLIT_MIDI: u8 = 48;

#[derive(Debug, Clone)]
pub enum TranscriptionSource {
    Url(String),
    Bytes(Vec<u8>),
}

/// One transcribed note event, times in quarter-note beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawNoteEvent {
    pub note: u8,
    pub time: f64,
    pub duration: f64,
    pub velocity: u8,
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Pending,
    Succeeded(Vec<RawNoteEvent>),
    Failed(String),
}

/// The remote audio-analysis collaborator: jobs are submitted, then
/// polled until they reach a terminal state.
pub trait TranscriptionBackend {
    fn submit(&self, source: &TranscriptionSource) -> Result<String, String>;
    fn poll(&self, job_id: &str) -> Result<JobStatus, String>;
}

pub struct TranscriptionClient<B> {
    backend: B,
    interval: Duration,
    max_attempts: u32,
}

impl<B: TranscriptionBackend> TranscriptionClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Submits the audio, polls the job at a fixed interval up to the
    /// attempt cap, and organizes the resulting raw note events into
    /// named tracks.
    pub fn transcribe(&self, source: &TranscriptionSource) -> Result<Vec<Track>, EngineError> {
        let empty = match source {
            TranscriptionSource::Url(url) => url.is_empty(),
            TranscriptionSource::Bytes(bytes) => bytes.is_empty(),
        };
        if empty {
            return Err(EngineError::InvalidInput("no audio provided".into()));
        }

        let job = self
            .backend
            .submit(source)
            .map_err(EngineError::TranscriptionFailed)?;

        let mut attempts = 0;
        let events = loop {
            match self
                .backend
                .poll(&job)
                .map_err(EngineError::TranscriptionFailed)?
            {
                JobStatus::Succeeded(events) => break events,
                JobStatus::Failed(reason) => {
                    return Err(EngineError::TranscriptionFailed(reason));
                }
                JobStatus::Pending => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        return Err(EngineError::TranscriptionFailed(format!(
                            "job {job} still pending after {attempts} attempts"
                        )));
                    }
                    debug!(job = %job, attempts, "transcription pending");
                    std::thread::sleep(self.interval);
                }
            }
        };

        info!(events = events.len(), "transcription complete");
        Ok(organize_tracks(&events))
    }
}

/// Secondary pass over the raw note events: split by register into named
/// tracks carrying the shared note schema. Events outside MIDI range are
/// dropped.
pub fn organize_tracks(events: &[RawNoteEvent]) -> Vec<Track> {
    let mut lead = Vec::new();
    let mut bass = Vec::new();

    for event in events {
        let Some(pitch) = Pitch::from_midi(event.note) else {
            continue;
        };
        let note = Note {
            pitch,
            start_beat: event.time,
            duration_beats: event.duration,
            velocity: event.velocity.min(127),
        };
        if event.note < BASS_SPLIT_MIDI {
            bass.push(note);
        } else {
            lead.push(note);
        }
    }

    let mut tracks = Vec::new();
    if !lead.is_empty() {
        tracks.push(named_track("lead", "Lead", InstrumentKind::Piano, lead));
    }
    if !bass.is_empty() {
        tracks.push(named_track("bass", "Bass", InstrumentKind::Bass, bass));
    }
    tracks
}

fn named_track(id: &str, name: &str, instrument: InstrumentKind, notes: Vec<Note>) -> Track {
    Track {
        id: id.into(),
        name: name.into(),
        instrument,
        volume_db: -10.0,
        pan: 0.0,
        mute: false,
        solo: false,
        notes,
    }
}
