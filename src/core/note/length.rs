use std::fmt;
use std::str::FromStr;

use super::InvalidToken;

/// Note length as written in a song file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteLength {
    Whole,
    Half,
    Quarter,
    Eighth,
}

impl NoteLength {
    pub const ALL: [NoteLength; 4] = [
        NoteLength::Whole,
        NoteLength::Half,
        NoteLength::Quarter,
        NoteLength::Eighth,
    ];

    /// How many of this length fit in one measure
    pub fn divisor(self) -> u32 {
        match self {
            NoteLength::Whole => 1,
            NoteLength::Half => 2,
            NoteLength::Quarter => 4,
            NoteLength::Eighth => 8,
        }
    }

    fn index(self) -> usize {
        match self {
            NoteLength::Whole => 0,
            NoteLength::Half => 1,
            NoteLength::Quarter => 2,
            NoteLength::Eighth => 3,
        }
    }
}

impl FromStr for NoteLength {
    type Err = InvalidToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(NoteLength::Whole),
            "2" => Ok(NoteLength::Half),
            "4" => Ok(NoteLength::Quarter),
            "8" => Ok(NoteLength::Eighth),
            _ => Err(InvalidToken::length(s)),
        }
    }
}

impl fmt::Display for NoteLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.divisor())
    }
}

/// Millisecond value of every note length, fixed once from the measure length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteLengths {
    measure_length_ms: u32,
    times_ms: [u32; 4],
}

impl NoteLengths {
    pub fn new(measure_length_ms: u32) -> Self {
        let mut times_ms = [0; 4];
        for length in NoteLength::ALL {
            times_ms[length.index()] = measure_length_ms / length.divisor();
        }
        Self {
            measure_length_ms,
            times_ms,
        }
    }

    pub fn measure_length_ms(&self) -> u32 {
        self.measure_length_ms
    }

    pub fn time_ms(&self, length: NoteLength) -> u32 {
        self.times_ms[length.index()]
    }
}
