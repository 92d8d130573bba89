use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use log::debug;

use crate::core::note::Pitch;
use crate::utils::helpers::ms_to_samples;

/// One measure of 8-bit signed waveform for a single pitch
///
/// Built once and never written again, so any number of workers may read it
/// concurrently.
pub type SampleBuffer = Arc<[i8]>;

/// Loudest sample an 8-bit signed buffer can hold
pub const MAX_AMPLITUDE: u8 = 127;

/// Precomputed sample buffers, one per pitch
pub struct ToneSource {
    sample_rate: u32,
    buffer_len: usize,
    amplitude: f64,
    silence: SampleBuffer,
    buffers: HashMap<Pitch, SampleBuffer>,
}

impl ToneSource {
    /// Create an empty table whose buffers span one measure
    pub fn new(sample_rate: u32, measure_length_ms: u32, amplitude: u8) -> Self {
        let buffer_len = ms_to_samples(measure_length_ms, sample_rate);
        Self {
            sample_rate,
            buffer_len,
            amplitude: amplitude.min(MAX_AMPLITUDE) as f64,
            silence: vec![0; buffer_len].into(),
            buffers: HashMap::new(),
        }
    }

    /// Build the buffers for every given pitch up front
    pub fn for_pitches<I>(sample_rate: u32, measure_length_ms: u32, amplitude: u8, pitches: I) -> Self
    where
        I: IntoIterator<Item = Pitch>,
    {
        let mut tones = Self::new(sample_rate, measure_length_ms, amplitude);
        for pitch in pitches {
            tones.prepare(pitch);
        }
        debug!(
            "Precomputed {} tone buffers ({} bytes each)",
            tones.buffers.len(),
            tones.buffer_len
        );
        tones
    }

    /// Buffer for `pitch`, computing it on first request
    pub fn prepare(&mut self, pitch: Pitch) -> SampleBuffer {
        if let Some(buffer) = self.buffers.get(&pitch) {
            return Arc::clone(buffer);
        }

        let buffer: SampleBuffer = match pitch.frequency() {
            None => Arc::clone(&self.silence),
            Some(frequency) => {
                render_sine(frequency as f64, self.sample_rate, self.buffer_len, self.amplitude).into()
            }
        };
        self.buffers.insert(pitch, Arc::clone(&buffer));
        buffer
    }

    /// Buffer for `pitch` if it has been prepared
    pub fn buffer(&self, pitch: Pitch) -> Option<SampleBuffer> {
        self.buffers.get(&pitch).cloned()
    }

    /// A measure of silence, also used between notes
    pub fn silence(&self) -> SampleBuffer {
        Arc::clone(&self.silence)
    }

    /// Samples per buffer
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Number of prepared pitches
    pub fn pitch_count(&self) -> usize {
        self.buffers.len()
    }

    /// Bytes held by prepared buffers, shared silence counted once
    pub fn memory_footprint(&self) -> usize {
        let tones = self.buffers.keys().filter(|pitch| !pitch.is_rest()).count();
        (tones + 1) * self.buffer_len
    }
}

fn render_sine(frequency: f64, sample_rate: u32, len: usize, amplitude: f64) -> Vec<i8> {
    let step = 2.0 * PI * frequency / sample_rate as f64;
    (0..len)
        .map(|i| ((i as f64 * step).sin() * amplitude) as i8)
        .collect()
}
