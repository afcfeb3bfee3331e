use super::instrument::{Adsr, Wave};
use super::output::VoiceEvent;

/// One sounding note inside the audio callback. Owned exclusively by the
/// render state; the control side only ever pushes `VoiceEvent`s.
pub(crate) struct Voice {
    pub strip: usize,
    freq: f32,
    phase: f32,
    wave: Wave,
    adsr: Adsr,
    velocity: f32,
    /// Seconds since the voice started.
    age: f32,
    /// Seconds the note is held before the release stage begins.
    gate: f32,
}

impl Voice {
    pub fn new(event: &VoiceEvent) -> Self {
        Self {
            strip: event.strip,
            freq: event.freq,
            phase: 0.0,
            wave: event.preset.wave,
            adsr: event.preset.adsr,
            velocity: event.velocity,
            age: 0.0,
            gate: event.duration.max(0.0),
        }
    }

    /// Envelope level while the gate is held.
    fn held_level(&self, t: f32) -> f32 {
        let a = self.adsr.attack;
        let d = self.adsr.decay;
        if t < a {
            if a == 0.0 { 1.0 } else { t / a }
        } else if t < a + d {
            let progress = if d == 0.0 { 1.0 } else { (t - a) / d };
            1.0 - (1.0 - self.adsr.sustain) * progress
        } else {
            self.adsr.sustain
        }
    }

    fn envelope(&self) -> f32 {
        if self.age < self.gate {
            self.held_level(self.age)
        } else {
            let r = self.adsr.release;
            let progress = if r == 0.0 {
                1.0
            } else {
                ((self.age - self.gate) / r).min(1.0)
            };
            self.held_level(self.gate) * (1.0 - progress)
        }
    }

    pub fn finished(&self) -> bool {
        self.age >= self.gate + self.adsr.release
    }

    /// Forces the release stage to begin now. Used to cut a still-sounding
    /// voice when a monophonic instrument retriggers.
    pub fn cut(&mut self) {
        if self.age < self.gate {
            self.gate = self.age;
        }
    }

    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        let raw = match self.wave {
            Wave::Sine => (self.phase * 2.0 * std::f32::consts::PI).sin(),
            Wave::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            Wave::Saw => 2.0 * self.phase - 1.0,
        };

        let sample = raw * self.envelope() * self.velocity;

        self.phase += self.freq / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.age += 1.0 / sample_rate;

        sample
    }
}
