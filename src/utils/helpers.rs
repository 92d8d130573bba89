/// Convert a MIDI note number to its frequency in Hz
pub fn midi_note_to_freq(note: u8) -> f32 {
    // A4 (note 69) is 440 Hz
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Number of samples covering `ms` milliseconds at `sample_rate`
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Format a time value with appropriate unit suffix (ms, s)
pub fn format_time(time_in_seconds: f32) -> String {
    if time_in_seconds >= 1.0 {
        format!("{:.2} s", time_in_seconds)
    } else {
        format!("{:.0} ms", time_in_seconds * 1000.0)
    }
}
