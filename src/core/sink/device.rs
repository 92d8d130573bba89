use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, Stream};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use super::{PlaybackSink, SinkError};
use crate::utils::helpers::ms_to_samples;

/// Samples per chunk handed to the audio callback
const CHUNK_SAMPLES: usize = 1024;
/// How often `drain` checks whether the callback has caught up
const DRAIN_POLL: Duration = Duration::from_millis(5);
/// Time left for the device's own buffer to play out after the queue empties
const DRAIN_TAIL: Duration = Duration::from_millis(100);

enum Control {
    Start(Sender<Result<(), SinkError>>),
    Close,
}

/// Live output through the default cpal device
///
/// `cpal::Stream` cannot leave the thread that built it, so the stream lives
/// on a dedicated device thread. The sink itself only holds channels and can
/// be moved between note workers.
pub struct DeviceSink {
    sample_rate: u32,
    buffer_ms: u32,
    device: Option<DeviceHandle>,
}

struct DeviceHandle {
    samples: Sender<Vec<i8>>,
    control: Sender<Control>,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl DeviceSink {
    /// `buffer_ms` bounds how far writes may run ahead of the speaker
    pub fn new(sample_rate: u32, buffer_ms: u32) -> Self {
        Self {
            sample_rate,
            buffer_ms,
            device: None,
        }
    }

    fn handle(&self) -> Result<&DeviceHandle, SinkError> {
        self.device.as_ref().ok_or(SinkError::NotOpen)
    }

    fn queue_capacity(&self) -> usize {
        (ms_to_samples(self.buffer_ms, self.sample_rate) / CHUNK_SAMPLES).max(1)
    }
}

impl PlaybackSink for DeviceSink {
    fn open(&mut self) -> Result<(), SinkError> {
        if self.device.is_some() {
            return Ok(());
        }

        let (sample_tx, sample_rx) = bounded(self.queue_capacity());
        let (control_tx, control_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let pending = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let source_rate = self.sample_rate;
        let playhead_pending = Arc::clone(&pending);
        let stream_failed = Arc::clone(&failed);
        let thread = thread::Builder::new()
            .name("audio-device".into())
            .spawn(move || {
                run_device(
                    source_rate,
                    sample_rx,
                    control_rx,
                    playhead_pending,
                    stream_failed,
                    ready_tx,
                )
            })
            .map_err(|e| SinkError::Open(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.device = Some(DeviceHandle {
                    samples: sample_tx,
                    control: control_tx,
                    pending,
                    failed,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                thread.join().ok();
                Err(e)
            }
            Err(_) => {
                thread.join().ok();
                Err(SinkError::Open("audio device thread exited".to_string()))
            }
        }
    }

    fn start(&mut self) -> Result<(), SinkError> {
        let handle = self.handle()?;
        let (reply_tx, reply_rx) = bounded(1);
        handle
            .control
            .send(Control::Start(reply_tx))
            .map_err(|_| SinkError::Start("audio device thread exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| SinkError::Start("audio device thread exited".to_string()))?
    }

    fn write(&mut self, samples: &[i8]) -> Result<(), SinkError> {
        let handle = self.handle()?;
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            if handle.failed.load(Ordering::Acquire) {
                return Err(SinkError::Write("audio stream reported an error".to_string()));
            }
            handle.pending.fetch_add(chunk.len(), Ordering::AcqRel);
            // Blocks while the queue holds `buffer_ms` worth of audio
            if handle.samples.send(chunk.to_vec()).is_err() {
                handle.pending.fetch_sub(chunk.len(), Ordering::AcqRel);
                return Err(SinkError::Write("audio device thread exited".to_string()));
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let handle = self.handle()?;
        while handle.pending.load(Ordering::Acquire) > 0 {
            if handle.failed.load(Ordering::Acquire) {
                return Err(SinkError::Drain("audio stream reported an error".to_string()));
            }
            thread::sleep(DRAIN_POLL);
        }
        thread::sleep(DRAIN_TAIL);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(handle) = self.device.take() {
            let DeviceHandle {
                samples,
                control,
                thread,
                ..
            } = handle;
            control.send(Control::Close).ok();
            drop(samples);
            if thread.join().is_err() {
                return Err(SinkError::Close("audio device thread panicked".to_string()));
            }
            debug!("Audio device closed");
        }
        Ok(())
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

fn run_device(
    source_rate: u32,
    samples: Receiver<Vec<i8>>,
    control: Receiver<Control>,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
    ready: Sender<Result<(), SinkError>>,
) {
    let stream = match build_stream(source_rate, samples, pending, failed) {
        Ok(stream) => {
            ready.send(Ok(())).ok();
            stream
        }
        Err(e) => {
            ready.send(Err(e)).ok();
            return;
        }
    };

    for command in control.iter() {
        match command {
            Control::Start(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| SinkError::Start(e.to_string()));
                reply.send(result).ok();
            }
            Control::Close => break,
        }
    }

    drop(stream);
}

fn build_stream(
    source_rate: u32,
    samples: Receiver<Vec<i8>>,
    pending: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
) -> Result<Stream, SinkError> {
    let host = cpal::default_host();
    debug!("Using audio host: {}", host.id().name());

    let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
    info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string())
    );

    let config = device
        .default_output_config()
        .map_err(|e| SinkError::Open(e.to_string()))?;
    debug!("Device config: {:?}", config);

    let sample_format = config.sample_format();
    let config = cpal::StreamConfig::from(config);
    let playhead = Playhead::new(samples, source_rate, config.sample_rate.0, pending);

    match sample_format {
        SampleFormat::F32 => create_stream::<f32>(&config, &device, playhead, failed),
        SampleFormat::I16 => create_stream::<i16>(&config, &device, playhead, failed),
        SampleFormat::U16 => create_stream::<u16>(&config, &device, playhead, failed),
        SampleFormat::I8 => create_stream::<i8>(&config, &device, playhead, failed),
        other => Err(SinkError::Open(format!("unsupported sample format {other:?}"))),
    }
}

fn create_stream<T>(
    config: &cpal::StreamConfig,
    device: &cpal::Device,
    mut playhead: Playhead,
    failed: Arc<AtomicBool>,
) -> Result<Stream, SinkError>
where
    T: Sample + Send + 'static + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = move |err: cpal::StreamError| {
        error!("an error occurred on the audio stream: {}", err);
        failed.store(true, Ordering::Release);
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Mono source copied to every output channel
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(playhead.next_sample());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| SinkError::Open(e.to_string()))
}

/// Reads queued chunks at the source rate while the device asks at its own
///
/// Rate conversion is nearest-sample stepping. An empty queue plays silence.
struct Playhead {
    receiver: Receiver<Vec<i8>>,
    chunk: Vec<i8>,
    index: usize,
    step: f64,
    position: f64,
    pending: Arc<AtomicUsize>,
}

impl Playhead {
    fn new(receiver: Receiver<Vec<i8>>, source_rate: u32, device_rate: u32, pending: Arc<AtomicUsize>) -> Self {
        Self {
            receiver,
            chunk: Vec::new(),
            index: 0,
            step: source_rate as f64 / device_rate as f64,
            position: 0.0,
            pending,
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.index >= self.chunk.len() {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.index = 0;
                }
                Err(_) => return 0.0,
            }
            if self.chunk.is_empty() {
                return 0.0;
            }
        }

        let value = self.chunk[self.index] as f32 / 128.0;
        self.position += self.step;
        while self.position >= 1.0 && self.index < self.chunk.len() {
            self.position -= 1.0;
            self.index += 1;
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        value
    }
}
