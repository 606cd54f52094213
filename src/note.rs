use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::TranceError;

/// Octave the scale generator places its notes in.
pub const REFERENCE_OCTAVE: i8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl PitchClass {
    /// Chromatic table, indexed by semitones above C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Db,
        PitchClass::D,
        PitchClass::Eb,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Gb,
        PitchClass::G,
        PitchClass::Ab,
        PitchClass::A,
        PitchClass::Bb,
        PitchClass::B,
    ];

    /// Wraps around the chromatic table, so 12 is C again.
    pub fn from_semitone(semitone: u8) -> Self {
        Self::ALL[(semitone % 12) as usize]
    }

    pub fn semitone(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Db => "Db",
            PitchClass::D => "D",
            PitchClass::Eb => "Eb",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Gb => "Gb",
            PitchClass::G => "G",
            PitchClass::Ab => "Ab",
            PitchClass::A => "A",
            PitchClass::Bb => "Bb",
            PitchClass::B => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Note {
    pub pitch: PitchClass,
    pub octave: i8,
}

impl Note {
    pub const fn new(pitch: PitchClass, octave: i8) -> Self {
        Note { pitch, octave }
    }

    /// Note at the reference octave for a chromatic offset from C.
    pub fn from_semitone(semitone: u8) -> Self {
        Note::new(PitchClass::from_semitone(semitone), REFERENCE_OCTAVE)
    }

    /// Equal-tempered frequency in Hz, A4 = 440.
    pub fn frequency(&self) -> f32 {
        let midi = (self.octave as i32 + 1) * 12 + self.pitch.semitone() as i32;
        440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.pitch.name(), self.octave)
    }
}

impl From<Note> for String {
    fn from(note: Note) -> Self {
        note.to_string()
    }
}

impl TryFrom<String> for Note {
    type Error = TranceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_note(&value)
    }
}

impl FromStr for Note {
    type Err = TranceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_note(s)
    }
}

/// Parses names like `C4`, `Db4`, `F#3` or `C0`. A missing octave means the
/// reference octave.
pub fn parse_note(note_str: &str) -> Result<Note, TranceError> {
    let note_str = note_str.trim();
    let mut chars = note_str.chars();

    let mut semitone: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('C') => 0,
        Some('D') => 2,
        Some('E') => 4,
        Some('F') => 5,
        Some('G') => 7,
        Some('A') => 9,
        Some('B') => 11,
        _ => return Err(TranceError::Parse(format!("Invalid note: '{}'", note_str))),
    };

    let rest = chars.as_str();
    let octave_str = match rest.chars().next() {
        Some('#') | Some('s') => {
            semitone += 1;
            &rest[1..]
        }
        Some('b') => {
            semitone -= 1;
            &rest[1..]
        }
        _ => rest,
    };

    let octave = if octave_str.is_empty() {
        REFERENCE_OCTAVE
    } else {
        octave_str
            .parse::<i8>()
            .map_err(|_| TranceError::Parse(format!("Invalid octave in note: '{}'", note_str)))?
    };

    // Cb and B# cross the octave boundary
    let (semitone, octave) = match semitone {
        -1 => (11, octave.checked_sub(1)),
        12 => (0, octave.checked_add(1)),
        s => (s, Some(octave)),
    };
    let octave = octave.ok_or_else(|| TranceError::Parse(format!("Octave out of range in note: '{}'", note_str)))?;

    Ok(Note::new(PitchClass::from_semitone(semitone as u8), octave))
}

/// Duration symbols in transport subdivisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteLength {
    #[serde(rename = "32n")]
    ThirtySecond,
    #[serde(rename = "16n")]
    Sixteenth,
    #[serde(rename = "8n")]
    Eighth,
    #[serde(rename = "4n")]
    Quarter,
}

impl NoteLength {
    pub fn symbol(self) -> &'static str {
        match self {
            NoteLength::ThirtySecond => "32n",
            NoteLength::Sixteenth => "16n",
            NoteLength::Eighth => "8n",
            NoteLength::Quarter => "4n",
        }
    }

    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        match self {
            NoteLength::ThirtySecond => 0.125,
            NoteLength::Sixteenth => 0.25,
            NoteLength::Eighth => 0.5,
            NoteLength::Quarter => 1.0,
        }
    }

    pub fn seconds(self, bpm: f32) -> f64 {
        self.beats() * 60.0 / bpm as f64
    }
}

impl fmt::Display for NoteLength {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
