//! A sequential note player
//!
//! A song is a text file of `<pitch> <length>` lines. Every distinct pitch
//! gets its own long-lived worker thread; the conductor hands each note to
//! the right worker in turn and waits for it to finish before moving on.

pub mod app;
pub mod core;
pub mod messaging;
pub mod settings;
pub mod utils;
