use super::instrument::{Polyphony, Preset};
use super::voice::Voice;
use crate::error::{ActivationError, TriggerError};
use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::sync::Arc;
use tracing::{error, info};

pub(crate) const VOICE_QUEUE_CAPACITY: usize = 4096;
const MAX_VOICES: usize = 64;

/// A note start handed from the dispatch side to the audio callback.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VoiceEvent {
    pub strip: usize,
    pub freq: f32,
    pub duration: f32,
    pub velocity: f32,
    pub preset: Preset,
}

/// Mix parameters for one track strip, as seen by the audio callback.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StripParams {
    pub gain: f32,
    pub pan_left: f32,
    pub pan_right: f32,
    pub muted: bool,
    pub active: bool,
}

/// Shared state between the control side (channels, instruments) and the
/// audio callback. Strip params are mutated under a lock and published as
/// a snapshot the callback loads without blocking.
pub(crate) struct MixerCore {
    strips: Mutex<Vec<StripParams>>,
    snapshot: ArcSwap<Vec<StripParams>>,
    events: Mutex<HeapProd<VoiceEvent>>,
}

impl MixerCore {
    pub fn new() -> (Arc<Self>, HeapCons<VoiceEvent>) {
        let (producer, consumer) = HeapRb::<VoiceEvent>::new(VOICE_QUEUE_CAPACITY).split();
        let core = Arc::new(Self {
            strips: Mutex::new(Vec::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            events: Mutex::new(producer),
        });
        (core, consumer)
    }

    pub fn alloc_strip(&self, params: StripParams) -> usize {
        let mut strips = self.strips.lock();
        let slot = match strips.iter().position(|s| !s.active) {
            Some(slot) => {
                strips[slot] = params;
                slot
            }
            None => {
                strips.push(params);
                strips.len() - 1
            }
        };
        self.snapshot.store(Arc::new(strips.clone()));
        slot
    }

    pub fn update_strip(&self, slot: usize, params: StripParams) {
        let mut strips = self.strips.lock();
        if let Some(entry) = strips.get_mut(slot) {
            *entry = params;
            self.snapshot.store(Arc::new(strips.clone()));
        }
    }

    pub fn release_strip(&self, slot: usize) {
        let mut strips = self.strips.lock();
        if let Some(entry) = strips.get_mut(slot) {
            entry.active = false;
            entry.muted = true;
            self.snapshot.store(Arc::new(strips.clone()));
        }
    }

    pub fn push_event(&self, event: VoiceEvent) -> Result<(), TriggerError> {
        self.events
            .lock()
            .try_push(event)
            .map_err(|_| TriggerError::QueueFull)
    }
}

/// The capability check `play()` consumes: the audio output either becomes
/// ready or the whole attempt fails with an `ActivationError`.
pub trait OutputCapability {
    fn ensure_ready(&mut self) -> Result<(), ActivationError>;
}

/// The one shared output: mixer core plus the platform stream. Every track
/// channel routes through here; the session owns init and teardown.
pub struct MasterOutput {
    core: Arc<MixerCore>,
    consumer: Option<HeapCons<VoiceEvent>>,
    stream: Option<cpal::Stream>,
}

impl MasterOutput {
    pub fn new() -> Self {
        let (core, consumer) = MixerCore::new();
        Self {
            core,
            consumer: Some(consumer),
            stream: None,
        }
    }

    pub(crate) fn core(&self) -> &Arc<MixerCore> {
        &self.core
    }

    pub fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    /// Opens the default output device and starts the stream. Idempotent
    /// while active; fails after `dispose()`.
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let consumer = self
            .consumer
            .take()
            .ok_or_else(|| ActivationError::Stream("master output was disposed".into()))?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ActivationError::NoOutputDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| ActivationError::StreamConfig(e.to_string()))?;
        let stream_config: cpal::StreamConfig = config.into();

        let sample_rate = stream_config.sample_rate as f32;
        let channels = stream_config.channels as usize;
        info!(sample_rate, channels, "audio output active");

        let mut state = RenderState {
            consumer,
            voices: Vec::with_capacity(MAX_VOICES),
            core: self.core.clone(),
            sample_rate,
            channels,
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(data, &mut state);
                },
                |err| error!(%err, "output stream error"),
                None,
            )
            .map_err(|e| ActivationError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| ActivationError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Tears the stream down. Terminal: the output cannot be reactivated.
    pub fn dispose(&mut self) {
        self.stream = None;
    }
}

impl Default for MasterOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputCapability for MasterOutput {
    fn ensure_ready(&mut self) -> Result<(), ActivationError> {
        self.activate()
    }
}

struct RenderState {
    consumer: HeapCons<VoiceEvent>,
    voices: Vec<Voice>,
    core: Arc<MixerCore>,
    sample_rate: f32,
    channels: usize,
}

fn render(data: &mut [f32], state: &mut RenderState) {
    while let Some(event) = state.consumer.try_pop() {
        if event.preset.polyphony == Polyphony::Mono {
            for voice in state.voices.iter_mut().filter(|v| v.strip == event.strip) {
                voice.cut();
            }
        }
        if state.voices.len() < MAX_VOICES {
            state.voices.push(Voice::new(&event));
        }
    }

    let strips = state.core.snapshot.load();
    data.fill(0.0);

    for frame in data.chunks_mut(state.channels) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for voice in state.voices.iter_mut() {
            let sample = voice.next_sample(state.sample_rate);
            let Some(strip) = strips.get(voice.strip) else {
                continue;
            };
            if !strip.active || strip.muted {
                continue;
            }
            left += sample * strip.gain * strip.pan_left;
            right += sample * strip.gain * strip.pan_right;
        }
        if frame.len() >= 2 {
            frame[0] = left;
            frame[1] = right;
        } else if let Some(mono) = frame.first_mut() {
            *mono = left + right;
        }
    }

    state.voices.retain(|v| !v.finished());
}
