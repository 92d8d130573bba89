//! Song file loading
//!
//! Format: one note per line, two whitespace-separated tokens
//!
//! ```text
//! C4 4
//! REST 8
//! F3S 2
//! ```
//!
//! The first token is a pitch (`REST` or `<Letter><Octave>[S]`), the second
//! a note length (`1`, `2`, `4` or `8`). Any malformed line rejects the whole
//! file.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::note::{NoteEvent, NoteLength, Pitch};

/// Why a song's text was rejected. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("the song file is empty")]
    EmptyFile,
    #[error("invalid line format on line {line_number}: `{line}` (expected `<note> <length>`)")]
    InvalidLine { line_number: usize, line: String },
    #[error("invalid note `{token}` on line {line_number}: `{line}`")]
    UnknownPitch {
        line_number: usize,
        line: String,
        token: String,
    },
    #[error("invalid note length `{token}` on line {line_number}: `{line}`")]
    UnknownLength {
        line_number: usize,
        line: String,
        token: String,
    },
}

impl ParseError {
    /// The offending line, if the error is tied to one
    pub fn line_number(&self) -> Option<usize> {
        match self {
            ParseError::EmptyFile => None,
            ParseError::InvalidLine { line_number, .. }
            | ParseError::UnknownPitch { line_number, .. }
            | ParseError::UnknownLength { line_number, .. } => Some(*line_number),
        }
    }
}

#[derive(Debug, Error)]
pub enum SongError {
    #[error("could not read song file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Parse a single song line
fn parse_line(line_number: usize, line: &str) -> Result<NoteEvent, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [pitch_token, length_token] = tokens[..] else {
        return Err(ParseError::InvalidLine {
            line_number,
            line: line.to_string(),
        });
    };

    let pitch: Pitch = pitch_token
        .parse()
        .map_err(|_| ParseError::UnknownPitch {
            line_number,
            line: line.to_string(),
            token: pitch_token.to_string(),
        })?;

    let length: NoteLength = length_token
        .parse()
        .map_err(|_| ParseError::UnknownLength {
            line_number,
            line: line.to_string(),
            token: length_token.to_string(),
        })?;

    Ok(NoteEvent::new(pitch, length))
}

/// Parse full song text into events in playback order
pub fn parse_song(text: &str) -> Result<Vec<NoteEvent>, ParseError> {
    let mut song = Vec::new();

    for (index, line) in text.lines().enumerate() {
        song.push(parse_line(index + 1, line)?);
    }

    if song.is_empty() {
        return Err(ParseError::EmptyFile);
    }

    Ok(song)
}

/// Read and parse a song file
pub fn load_song(path: &Path) -> Result<Vec<NoteEvent>, SongError> {
    let text = fs::read_to_string(path).map_err(|source| SongError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_song(&text)?)
}

/// Distinct pitches of a song in order of first appearance
pub fn distinct_pitches(song: &[NoteEvent]) -> Vec<Pitch> {
    let mut pitches = Vec::new();
    for event in song {
        if !pitches.contains(&event.pitch) {
            pitches.push(event.pitch);
        }
    }
    pitches
}
