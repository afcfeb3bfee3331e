use super::output::{MixerCore, StripParams};
use super::{db_to_gain, pan_gains};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
struct ChannelSettings {
    volume_db: f64,
    pan: f64,
    muted: bool,
}

/// Per-track mix node: volume, pan, mute. Construction binds a strip on
/// the shared master output; `dispose()` releases it.
///
/// Muted tracks are never scheduled in the first place; the strip mute is
/// for hosts that flip it while playback is in flight.
pub struct TrackChannel {
    core: Arc<MixerCore>,
    strip: usize,
    settings: Mutex<ChannelSettings>,
    disposed: AtomicBool,
}

impl TrackChannel {
    pub(crate) fn new(core: Arc<MixerCore>, volume_db: f64, pan: f64, muted: bool) -> Self {
        let settings = ChannelSettings {
            volume_db,
            pan,
            muted,
        };
        let strip = core.alloc_strip(strip_params(settings));
        Self {
            core,
            strip,
            settings: Mutex::new(settings),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn strip(&self) -> usize {
        self.strip
    }

    pub fn volume_db(&self) -> f64 {
        self.settings.lock().volume_db
    }

    pub fn pan(&self) -> f64 {
        self.settings.lock().pan
    }

    pub fn is_muted(&self) -> bool {
        self.settings.lock().muted
    }

    pub fn set_volume_db(&self, volume_db: f64) {
        self.apply(|s| s.volume_db = volume_db);
    }

    pub fn set_pan(&self, pan: f64) {
        self.apply(|s| s.pan = pan.clamp(-1.0, 1.0));
    }

    pub fn set_mute(&self, muted: bool) {
        self.apply(|s| s.muted = muted);
    }

    fn apply(&self, update: impl FnOnce(&mut ChannelSettings)) {
        let mut settings = self.settings.lock();
        update(&mut settings);
        if !self.disposed.load(Ordering::Acquire) {
            self.core.update_strip(self.strip, strip_params(*settings));
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Releases the strip routing. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.core.release_strip(self.strip);
        }
    }
}

impl Drop for TrackChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn strip_params(settings: ChannelSettings) -> StripParams {
    let (pan_left, pan_right) = pan_gains(settings.pan);
    StripParams {
        gain: db_to_gain(settings.volume_db),
        pan_left,
        pan_right,
        muted: settings.muted,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_take_distinct_strips() {
        let (core, _consumer) = MixerCore::new();
        let a = TrackChannel::new(core.clone(), -10.0, 0.0, false);
        let b = TrackChannel::new(core.clone(), -10.0, 0.5, false);
        assert_ne!(a.strip(), b.strip());
    }

    #[test]
    fn dispose_frees_the_strip_for_reuse() {
        let (core, _consumer) = MixerCore::new();
        let a = TrackChannel::new(core.clone(), -10.0, 0.0, false);
        let slot = a.strip();
        a.dispose();
        a.dispose();

        let b = TrackChannel::new(core.clone(), 0.0, 0.0, false);
        assert_eq!(b.strip(), slot);
    }

    #[test]
    fn setters_update_settings() {
        let (core, _consumer) = MixerCore::new();
        let channel = TrackChannel::new(core, -10.0, 0.0, false);
        channel.set_volume_db(-6.0);
        channel.set_pan(2.0);
        channel.set_mute(true);
        assert_eq!(channel.volume_db(), -6.0);
        assert_eq!(channel.pan(), 1.0);
        assert!(channel.is_muted());
    }
}
