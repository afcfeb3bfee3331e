use crate::audio::{MixerCore, SynthUnit, TrackChannel};
use crate::score::{InstrumentKind, Track};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub struct ResourceEntry {
    pub instrument_kind: InstrumentKind,
    pub instrument: Arc<SynthUnit>,
    pub channel: Arc<TrackChannel>,
}

/// Owns every per-track (instrument, channel) pair, keyed by track id.
/// Entries persist across rebuilds while `(trackId, instrumentType)` is
/// unchanged and are disposed when a track is removed, its instrument
/// changes, or the engine is torn down. Only the scheduler mutates this
/// map.
pub struct ResourceManager {
    core: Arc<MixerCore>,
    entries: HashMap<String, ResourceEntry>,
}

impl ResourceManager {
    pub(crate) fn new(core: Arc<MixerCore>) -> Self {
        Self {
            core,
            entries: HashMap::new(),
        }
    }

    /// Returns the track's (instrument, channel) pair, building or
    /// rebuilding it if the track is new or its instrument changed. A
    /// reused channel gets the track's current volume/pan/mute applied.
    pub fn ensure(&mut self, track: &Track) -> (Arc<SynthUnit>, Arc<TrackChannel>) {
        if let Some(entry) = self.entries.get(&track.id) {
            if entry.instrument_kind == track.instrument {
                entry.channel.set_volume_db(track.volume_db);
                entry.channel.set_pan(track.pan);
                entry.channel.set_mute(track.mute);
                return (entry.instrument.clone(), entry.channel.clone());
            }
        }

        if let Some(old) = self.entries.remove(&track.id) {
            debug!(track = %track.id, from = old.instrument_kind.tag(),
                   to = track.instrument.tag(), "instrument changed, rebuilding");
            dispose_entry(&old);
        }

        let channel = Arc::new(TrackChannel::new(
            self.core.clone(),
            track.volume_db,
            track.pan,
            track.mute,
        ));
        let instrument = Arc::new(SynthUnit::create(
            track.instrument,
            self.core.clone(),
            channel.strip(),
        ));

        self.entries.insert(
            track.id.clone(),
            ResourceEntry {
                instrument_kind: track.instrument,
                instrument: instrument.clone(),
                channel: channel.clone(),
            },
        );
        (instrument, channel)
    }

    /// Disposes entries whose track id is no longer part of the
    /// composition.
    pub fn prune(&mut self, keep: &HashSet<&str>) {
        self.entries.retain(|id, entry| {
            if keep.contains(id.as_str()) {
                true
            } else {
                debug!(track = %id, "track removed, disposing resources");
                dispose_entry(entry);
                false
            }
        });
    }

    pub fn dispose_all(&mut self) {
        for entry in self.entries.values() {
            dispose_entry(entry);
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.entries.contains_key(track_id)
    }
}

fn dispose_entry(entry: &ResourceEntry) {
    entry.instrument.dispose();
    entry.channel.dispose();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Note;

    fn track(id: &str, instrument: InstrumentKind) -> Track {
        Track {
            id: id.into(),
            name: id.into(),
            instrument,
            volume_db: -10.0,
            pan: 0.0,
            mute: false,
            solo: false,
            notes: Vec::<Note>::new(),
        }
    }

    fn manager() -> ResourceManager {
        let (core, _consumer) = MixerCore::new();
        ResourceManager::new(core)
    }

    #[test]
    fn unchanged_track_reuses_the_same_instances() {
        let mut resources = manager();
        let t = track("t1", InstrumentKind::Piano);

        let (synth_a, channel_a) = resources.ensure(&t);
        let (synth_b, channel_b) = resources.ensure(&t);

        assert!(Arc::ptr_eq(&synth_a, &synth_b));
        assert!(Arc::ptr_eq(&channel_a, &channel_b));
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn reuse_applies_current_mix_settings() {
        let mut resources = manager();
        let mut t = track("t1", InstrumentKind::Piano);
        let (_, channel) = resources.ensure(&t);

        t.volume_db = -3.0;
        t.pan = 0.5;
        let (_, reused) = resources.ensure(&t);

        assert!(Arc::ptr_eq(&channel, &reused));
        assert_eq!(reused.volume_db(), -3.0);
        assert_eq!(reused.pan(), 0.5);
    }

    #[test]
    fn instrument_change_disposes_and_rebuilds() {
        let mut resources = manager();
        let (old_synth, old_channel) = resources.ensure(&track("t1", InstrumentKind::Piano));

        let (new_synth, _) = resources.ensure(&track("t1", InstrumentKind::Bass));

        assert!(!Arc::ptr_eq(&old_synth, &new_synth));
        assert!(old_synth.is_disposed());
        assert!(old_channel.is_disposed());
        assert_eq!(new_synth.kind(), InstrumentKind::Bass);
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn prune_disposes_removed_tracks_only() {
        let mut resources = manager();
        let (kept, _) = resources.ensure(&track("keep", InstrumentKind::Synth));
        let (dropped, _) = resources.ensure(&track("drop", InstrumentKind::Synth));

        resources.prune(&HashSet::from(["keep"]));

        assert!(resources.contains("keep"));
        assert!(!resources.contains("drop"));
        assert!(!kept.is_disposed());
        assert!(dropped.is_disposed());
    }

    #[test]
    fn dispose_all_empties_the_map() {
        let mut resources = manager();
        let (synth, _) = resources.ensure(&track("t1", InstrumentKind::Synth));
        resources.dispose_all();
        assert!(resources.is_empty());
        assert!(synth.is_disposed());
    }
}
