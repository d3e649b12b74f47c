//! Musical key arithmetic over (pitch class, mode) pairs.
//!
//! Pitch classes are integers modulo 12 with C = 0. The provider reports an
//! unknown key as -1, which is kept representable at the edges of this module
//! (`key_label`) but never enters [`MusicalKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

const MAJOR_NOTES: [&str; 12] = [
    "C", "D♭", "D", "E♭", "E", "F", "F♯", "G", "A♭", "A", "B♭", "B",
];
const MINOR_NOTES: [&str; 12] = [
    "C", "C♯", "D", "E♭", "E", "F", "F♯", "G", "G♯", "A", "B♭", "B",
];

/// Semitones from a major key to its relative minor.
const MAJOR_TO_RELATIVE_MINOR: u8 = 9;
/// Semitones from a minor key to its relative major.
const MINOR_TO_RELATIVE_MAJOR: u8 = 3;
/// Semitones in a perfect fifth.
const FIFTH: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PitchClass(u8);

impl PitchClass {
    /// Returns `None` for anything outside `0..=11`, including the provider's -1.
    pub fn new(value: i32) -> Option<Self> {
        if (0..12).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn transpose(self, semitones: u8) -> Self {
        Self((self.0 + semitones % 12) % 12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mode {
    Minor,
    Major,
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode.as_raw()
    }
}

impl TryFrom<u8> for Mode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Mode::from_raw(value as i32).ok_or_else(|| format!("invalid mode {}", value))
    }
}

impl Mode {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Mode::Minor),
            1 => Some(Mode::Major),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Mode::Minor => 0,
            Mode::Major => 1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Mode::Minor => Mode::Major,
            Mode::Major => Mode::Minor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MusicalKey {
    pub pitch_class: PitchClass,
    pub mode: Mode,
}

impl MusicalKey {
    pub fn new(pitch_class: PitchClass, mode: Mode) -> Self {
        Self { pitch_class, mode }
    }

    /// Builds a key from the provider's raw integers.
    pub fn from_raw(key: i32, mode: i32) -> Option<Self> {
        Some(Self::new(PitchClass::new(key)?, Mode::from_raw(mode)?))
    }

    /// The same key expressed in major: identity for major keys.
    pub fn as_major(self) -> PitchClass {
        match self.mode {
            Mode::Major => self.pitch_class,
            Mode::Minor => relative_key(self.pitch_class, Mode::Minor),
        }
    }

    pub fn label(self) -> String {
        key_label(self.pitch_class.value() as i32, Some(self.mode))
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Human-readable key name.
///
/// Negative pitch classes render as `"?"`. With no mode both spellings are
/// given, the major one first: `key_label(0, None) == "C / Am"`.
pub fn key_label(pitch_class: i32, mode: Option<Mode>) -> String {
    if pitch_class < 0 {
        return "?".to_string();
    }
    let pitch = PitchClass((pitch_class % 12) as u8);
    match mode {
        Some(Mode::Major) => MAJOR_NOTES[pitch.value() as usize].to_string(),
        Some(Mode::Minor) => format!("{}m", MINOR_NOTES[pitch.value() as usize]),
        None => {
            let minor = relative_key(pitch, Mode::Major);
            format!(
                "{} / {}m",
                MAJOR_NOTES[pitch.value() as usize],
                MINOR_NOTES[minor.value() as usize]
            )
        }
    }
}

/// The pitch class of the relative key in the opposite mode.
///
/// `relative_key(relative_key(p, m), m.opposite()) == p` for every `p` and `m`.
pub fn relative_key(pitch_class: PitchClass, mode: Mode) -> PitchClass {
    match mode {
        Mode::Major => pitch_class.transpose(MAJOR_TO_RELATIVE_MINOR),
        Mode::Minor => pitch_class.transpose(MINOR_TO_RELATIVE_MAJOR),
    }
}

/// The two keys one step clockwise on the circle of fifths from `current`:
/// the next major key and its relative minor, in that order.
pub fn next_key_candidates(current: MusicalKey) -> [MusicalKey; 2] {
    let next_major = current.as_major().transpose(FIFTH);
    [
        MusicalKey::new(next_major, Mode::Major),
        MusicalKey::new(relative_key(next_major, Mode::Major), Mode::Minor),
    ]
}
