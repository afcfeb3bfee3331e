use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A symbolic pitch ("C4", "F#3", "Bb2"), stored as its MIDI note number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(u8);

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl Pitch {
    pub fn from_midi(midi: u8) -> Option<Self> {
        (midi <= 127).then_some(Self(midi))
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    pub fn frequency(self) -> f32 {
        440.0 * 2.0_f32.powf((self.0 as f32 - 69.0) / 12.0)
    }
}

impl FromStr for Pitch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let letter = bytes
            .first()
            .ok_or_else(|| "empty pitch name".to_string())?
            .to_ascii_uppercase();
        let base: i32 = match letter {
            b'C' => 0,
            b'D' => 2,
            b'E' => 4,
            b'F' => 5,
            b'G' => 7,
            b'A' => 9,
            b'B' => 11,
            _ => return Err(format!("unknown note letter in {:?}", s)),
        };

        let mut idx = 1;
        let mut accidental = 0i32;
        while let Some(&c) = bytes.get(idx) {
            match c {
                b'#' => accidental += 1,
                b'b' => accidental -= 1,
                _ => break,
            }
            idx += 1;
        }

        let octave: i32 = s[idx..]
            .parse()
            .map_err(|_| format!("bad octave in pitch {:?}", s))?;

        // MIDI 0 is C-1, so C4 = 60.
        let midi = (octave + 1) * 12 + base + accidental;
        if (0..=127).contains(&midi) {
            Ok(Self(midi as u8))
        } else {
            Err(format!("pitch {:?} is out of MIDI range", s))
        }
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = NOTE_NAMES[(self.0 % 12) as usize];
        let octave = (self.0 / 12) as i32 - 1;
        write!(f, "{}{}", name, octave)
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pitch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Closed set of synthesis presets a track can ask for. Unknown wire tags
/// collapse to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Piano,
    Synth,
    Bass,
    Default,
}

impl InstrumentKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "piano" => Self::Piano,
            "synth" => Self::Synth,
            "bass" => Self::Bass,
            _ => Self::Default,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Piano => "piano",
            Self::Synth => "synth",
            Self::Bass => "bass",
            Self::Default => "default",
        }
    }
}

impl Serialize for InstrumentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for InstrumentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&s))
    }
}

/// One timed note. Wire names and defaults follow the shared note schema:
/// `{"note": "C4", "start": 0, "duration": 1, "velocity": 100}`, times in
/// quarter-note beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "note")]
    pub pitch: Pitch,
    #[serde(rename = "start", default)]
    pub start_beat: f64,
    #[serde(rename = "duration", default = "default_duration")]
    pub duration_beats: f64,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_duration() -> f64 {
    1.0
}

fn default_velocity() -> u8 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_instrument")]
    pub instrument: InstrumentKind,
    #[serde(rename = "volume", default = "default_volume_db")]
    pub volume_db: f64,
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
}

fn default_instrument() -> InstrumentKind {
    InstrumentKind::Synth
}

fn default_volume_db() -> f64 {
    -10.0
}

/// A full score: tempo plus an ordered set of tracks. Treated as immutable
/// input to one scheduler build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(rename = "tempo", default)]
    pub tempo_bpm: f64,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Composition {
    pub fn new(tempo_bpm: f64, tracks: Vec<Track>) -> Self {
        let mut composition = Self { tempo_bpm, tracks };
        composition.normalize();
        composition
    }

    /// Fills in missing track ids and names. Wire documents (and generated
    /// compositions in particular) carry no ids; playback needs them unique
    /// and stable for the lifetime of a build.
    pub fn normalize(&mut self) {
        let mut seen: Vec<String> = Vec::with_capacity(self.tracks.len());
        for (i, track) in self.tracks.iter_mut().enumerate() {
            if track.name.is_empty() {
                track.name = format!("Track {}", i + 1);
            }
            if track.id.is_empty() || seen.iter().any(|s| s == &track.id) {
                let mut n = i + 1;
                let mut candidate = format!("track-{}", n);
                while seen.iter().any(|s| s == &candidate) {
                    n += 1;
                    candidate = format!("track-{}", n);
                }
                track.id = candidate;
            }
            seen.push(track.id.clone());
        }
    }

    /// Length of the score in beats: the latest note end over all tracks.
    pub fn length_beats(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.start_beat + n.duration_beats)
            .fold(0.0, f64::max)
    }
}
