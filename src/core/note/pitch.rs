use std::fmt;
use std::str::FromStr;

use super::InvalidToken;
use crate::utils::helpers::midi_note_to_freq;

/// Token used in song files for a silent note
pub const REST_TOKEN: &str = "REST";
/// Highest octave a song may use
pub const MAX_OCTAVE: u8 = 9;

/// Pitch classes a song can name, spelled with sharps only
///
/// There is no A sharp: song files have no token for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    B,
}

impl PitchClass {
    /// Semitones above C within the octave (C=0, C#=1, ... B=11)
    pub fn semitone(self) -> u8 {
        match self {
            PitchClass::C => 0,
            PitchClass::CSharp => 1,
            PitchClass::D => 2,
            PitchClass::DSharp => 3,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::FSharp => 6,
            PitchClass::G => 7,
            PitchClass::GSharp => 8,
            PitchClass::A => 9,
            PitchClass::B => 11,
        }
    }

    fn from_letter(letter: char, sharp: bool) -> Option<Self> {
        let class = match (letter, sharp) {
            ('C', false) => PitchClass::C,
            ('C', true) => PitchClass::CSharp,
            ('D', false) => PitchClass::D,
            ('D', true) => PitchClass::DSharp,
            ('E', false) => PitchClass::E,
            ('F', false) => PitchClass::F,
            ('F', true) => PitchClass::FSharp,
            ('G', false) => PitchClass::G,
            ('G', true) => PitchClass::GSharp,
            ('A', false) => PitchClass::A,
            ('B', false) => PitchClass::B,
            // no E, A or B sharps
            _ => return None,
        };
        Some(class)
    }

    fn letter(self) -> char {
        match self {
            PitchClass::C | PitchClass::CSharp => 'C',
            PitchClass::D | PitchClass::DSharp => 'D',
            PitchClass::E => 'E',
            PitchClass::F | PitchClass::FSharp => 'F',
            PitchClass::G | PitchClass::GSharp => 'G',
            PitchClass::A => 'A',
            PitchClass::B => 'B',
        }
    }

    fn is_sharp(self) -> bool {
        matches!(
            self,
            PitchClass::CSharp
                | PitchClass::DSharp
                | PitchClass::FSharp
                | PitchClass::GSharp
        )
    }
}

/// Identity of a note in a song: a rest or a concrete tone
///
/// Pitches are the worker registry key, so equality and hashing are by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pitch {
    Rest,
    Tone { class: PitchClass, octave: u8 },
}

impl Pitch {
    /// Build a tone, rejecting octaves outside `0..=MAX_OCTAVE`
    ///
    /// The top octave only holds A and B.
    pub fn tone(class: PitchClass, octave: u8) -> Option<Self> {
        if octave > MAX_OCTAVE {
            return None;
        }
        if octave == MAX_OCTAVE && !matches!(class, PitchClass::A | PitchClass::B) {
            return None;
        }
        Some(Pitch::Tone { class, octave })
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Pitch::Rest)
    }

    /// MIDI note number (C4 = 60, A4 = 69), `None` for a rest
    pub fn midi_note(&self) -> Option<u8> {
        match *self {
            Pitch::Rest => None,
            Pitch::Tone { class, octave } => Some(12 * (octave + 1) + class.semitone()),
        }
    }

    /// Equal-tempered frequency with A4 at 440 Hz, `None` for a rest
    pub fn frequency(&self) -> Option<f32> {
        self.midi_note().map(midi_note_to_freq)
    }
}

impl FromStr for Pitch {
    type Err = InvalidToken;

    /// Parse a song token such as `REST`, `C4` or `F3S`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == REST_TOKEN {
            return Ok(Pitch::Rest);
        }

        let invalid = || InvalidToken::pitch(s);
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let octave = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)? as u8;
        let sharp = match chars.as_str() {
            "" => false,
            "S" => true,
            _ => return Err(invalid()),
        };

        let class = PitchClass::from_letter(letter, sharp).ok_or_else(invalid)?;
        Pitch::tone(class, octave).ok_or_else(invalid)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Pitch::Rest => f.write_str(REST_TOKEN),
            Pitch::Tone { class, octave } => {
                write!(f, "{}{}", class.letter(), octave)?;
                if class.is_sharp() {
                    f.write_str("S")?;
                }
                Ok(())
            }
        }
    }
}
