mod length;
mod pitch;

pub use self::length::{NoteLength, NoteLengths};
pub use self::pitch::{Pitch, PitchClass, MAX_OCTAVE, REST_TOKEN};

use thiserror::Error;

/// A song token that names no known pitch or note length
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} `{token}`")]
pub struct InvalidToken {
    pub kind: &'static str,
    pub token: String,
}

impl InvalidToken {
    fn pitch(token: &str) -> Self {
        Self {
            kind: "note",
            token: token.to_string(),
        }
    }

    fn length(token: &str) -> Self {
        Self {
            kind: "note length",
            token: token.to_string(),
        }
    }
}

/// One line of a song: what to play and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteEvent {
    pub pitch: Pitch,
    pub length: NoteLength,
}

impl NoteEvent {
    pub fn new(pitch: Pitch, length: NoteLength) -> Self {
        Self { pitch, length }
    }
}
