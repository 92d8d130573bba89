use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use super::{PlaybackSink, SinkError};

/// Renders a song into an 8-bit mono WAV file instead of a live device
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: usize,
}

impl WavSink {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            writer: None,
            samples_written: 0,
        }
    }

    fn writer(&mut self) -> Result<&mut WavWriter<BufWriter<File>>, SinkError> {
        self.writer.as_mut().ok_or(SinkError::NotOpen)
    }
}

impl PlaybackSink for WavSink {
    fn open(&mut self) -> Result<(), SinkError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 8,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&self.path, spec)
            .map_err(|e| SinkError::Open(format!("{}: {}", self.path.display(), e)))?;
        self.writer = Some(writer);
        self.samples_written = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.writer().map(|_| ())
    }

    fn write(&mut self, samples: &[i8]) -> Result<(), SinkError> {
        let writer = self.writer()?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| SinkError::Write(e.to_string()))?;
        }
        self.samples_written += samples.len();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.writer()?
            .flush()
            .map_err(|e| SinkError::Drain(e.to_string()))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| SinkError::Close(e.to_string()))?;
            info!(
                "Wrote {} samples to {}",
                self.samples_written,
                self.path.display()
            );
        }
        Ok(())
    }
}
