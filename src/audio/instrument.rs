use super::output::{MixerCore, VoiceEvent};
use crate::error::TriggerError;
use crate::score::{InstrumentKind, Pitch};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Sine,
    Triangle,
    Saw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polyphony {
    Poly,
    Mono,
}

/// Envelope times in seconds, sustain as a 0..1 level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

/// Fixed synthesis preset for one instrument kind. Pure data, no shared
/// mutable state between `SynthUnit`s built from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub polyphony: Polyphony,
    pub wave: Wave,
    pub adsr: Adsr,
}

impl Preset {
    pub fn for_kind(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Piano => Self {
                polyphony: Polyphony::Poly,
                wave: Wave::Sine,
                adsr: Adsr {
                    attack: 0.005,
                    decay: 0.2,
                    sustain: 0.3,
                    release: 1.0,
                },
            },
            InstrumentKind::Synth => Self {
                polyphony: Polyphony::Poly,
                wave: Wave::Triangle,
                adsr: Adsr {
                    attack: 0.02,
                    decay: 0.1,
                    sustain: 0.5,
                    release: 0.8,
                },
            },
            InstrumentKind::Bass => Self {
                polyphony: Polyphony::Mono,
                wave: Wave::Saw,
                adsr: Adsr {
                    attack: 0.01,
                    decay: 0.2,
                    sustain: 0.4,
                    release: 0.5,
                },
            },
            InstrumentKind::Default => Self {
                polyphony: Polyphony::Poly,
                wave: Wave::Triangle,
                adsr: Adsr {
                    attack: 0.005,
                    decay: 0.1,
                    sustain: 0.3,
                    release: 1.0,
                },
            },
        }
    }
}

/// A fresh synthesis unit bound to one track's mixer strip. Instances are
/// never shared between tracks. After `dispose()` every `trigger` is a
/// contained error, not a fault — callbacks already in flight may still
/// hold a reference.
pub struct SynthUnit {
    kind: InstrumentKind,
    preset: Preset,
    strip: usize,
    core: Arc<MixerCore>,
    disposed: AtomicBool,
}

impl SynthUnit {
    /// The instrument factory: kind → preset → fresh unit.
    pub(crate) fn create(kind: InstrumentKind, core: Arc<MixerCore>, strip: usize) -> Self {
        Self {
            kind,
            preset: Preset::for_kind(kind),
            strip,
            core,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Starts one note: `velocity` is the normalized 0..1 gain,
    /// `at_seconds` the transport time the trigger was scheduled for.
    pub fn trigger(
        &self,
        pitch: Pitch,
        duration_seconds: f64,
        at_seconds: f64,
        velocity: f64,
    ) -> Result<(), TriggerError> {
        if self.is_disposed() {
            return Err(TriggerError::Disposed);
        }
        debug!(%pitch, at_seconds, duration_seconds, "trigger");
        self.core.push_event(VoiceEvent {
            strip: self.strip,
            freq: pitch.frequency(),
            duration: duration_seconds as f32,
            velocity: velocity.clamp(0.0, 1.0) as f32,
            preset: self.preset,
        })
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_the_fixed_table() {
        let piano = Preset::for_kind(InstrumentKind::Piano);
        assert_eq!(piano.polyphony, Polyphony::Poly);
        assert_eq!(piano.wave, Wave::Sine);

        let bass = Preset::for_kind(InstrumentKind::Bass);
        assert_eq!(bass.polyphony, Polyphony::Mono);
        assert_eq!(bass.wave, Wave::Saw);

        let synth = Preset::for_kind(InstrumentKind::Synth);
        assert_eq!(synth.wave, Wave::Triangle);
    }

    #[test]
    fn trigger_after_dispose_is_contained() {
        let (core, _consumer) = MixerCore::new();
        let unit = SynthUnit::create(InstrumentKind::Piano, core, 0);
        let c4: Pitch = "C4".parse().unwrap();

        assert!(unit.trigger(c4, 1.0, 0.0, 0.8).is_ok());
        unit.dispose();
        assert_eq!(
            unit.trigger(c4, 1.0, 0.0, 0.8),
            Err(TriggerError::Disposed)
        );
    }
}
