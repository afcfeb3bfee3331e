mod channel;
mod instrument;
mod output;
mod voice;

pub use channel::TrackChannel;
pub use instrument::{Adsr, Polyphony, Preset, SynthUnit, Wave};
pub use output::{MasterOutput, OutputCapability};

pub(crate) use output::MixerCore;

pub fn db_to_gain(db: f64) -> f32 {
    10.0_f32.powf(db as f32 / 20.0)
}

/// Equal-power pan law: -1 hard left, 0 center, +1 hard right.
pub fn pan_gains(pan: f64) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0) as f32;
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_at_zero_db() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn pan_extremes() {
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);

        let (l, r) = pan_gains(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);

        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
    }
}
