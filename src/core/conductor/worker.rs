use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use log::{debug, error, trace};

use crate::core::note::{NoteEvent, NoteLengths, Pitch};
use crate::core::sink::{BoxedSink, PlaybackSink, SinkError};
use crate::core::tone::SampleBuffer;
use crate::messaging::{CompletionNotifier, WorkerCommand};
use crate::utils::helpers::ms_to_samples;

/// Where a worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Rendering,
    Stopped,
}

/// Timing shared by every worker of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub lengths: NoteLengths,
    /// Silence written after every note
    pub gap_ms: u32,
}

impl RenderSettings {
    /// Samples rendered for `event`, never more than one measure
    pub fn note_samples(&self, event: &NoteEvent) -> usize {
        let ms = self
            .lengths
            .time_ms(event.length)
            .min(self.lengths.measure_length_ms());
        ms_to_samples(ms, self.sample_rate)
    }

    pub fn gap_samples(&self) -> usize {
        ms_to_samples(self.gap_ms, self.sample_rate)
    }
}

/// What a worker did over its lifetime, returned when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub notes_rendered: usize,
    pub samples_written: usize,
}

/// A long-lived thread that plays every occurrence of one pitch
///
/// Commands arrive through a single-slot mailbox. The conductor never submits
/// a note while the previous one is in flight, so the slot is always empty
/// when `submit` runs; the channel's own lock still covers the case where the
/// worker is just about to park.
pub struct NoteWorker {
    pitch: Pitch,
    mailbox: Sender<WorkerCommand>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<WorkerState>>,
    thread: Option<JoinHandle<WorkerStats>>,
}

impl NoteWorker {
    /// Start the worker thread, parked until the first note arrives
    pub fn spawn(
        pitch: Pitch,
        tone: SampleBuffer,
        silence: SampleBuffer,
        settings: RenderSettings,
    ) -> io::Result<Self> {
        let (mailbox, inbox) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(WorkerState::Idle));

        let worker_loop = WorkerLoop {
            pitch,
            tone,
            silence,
            settings,
            inbox,
            running: Arc::clone(&running),
            state: Arc::clone(&state),
            stats: WorkerStats::default(),
        };
        let thread = thread::Builder::new()
            .name(format!("note-{}", pitch))
            .spawn(move || worker_loop.run())?;

        Ok(Self {
            pitch,
            mailbox,
            running,
            state,
            thread: Some(thread),
        })
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a note and the sink to the worker and wake it
    ///
    /// If the worker thread is gone the sink comes back as the error.
    pub fn submit(
        &self,
        event: NoteEvent,
        sink: BoxedSink,
        completion: CompletionNotifier,
    ) -> Result<(), BoxedSink> {
        debug_assert_eq!(event.pitch, self.pitch);
        let command = WorkerCommand::Play {
            event,
            sink,
            completion,
        };
        match self.mailbox.send(command) {
            Ok(()) => Ok(()),
            Err(SendError(WorkerCommand::Play { sink, .. })) => Err(sink),
            Err(SendError(WorkerCommand::Stop)) => unreachable!("sent a play command"),
        }
    }

    /// Stop the worker and wait for its thread to finish
    ///
    /// Only called once every note has completed, so it never interrupts a
    /// render. `None` if the thread had panicked.
    pub fn stop(mut self) -> Option<WorkerStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<WorkerStats> {
        let thread = self.thread.take()?;

        self.running.store(false, Ordering::Release);
        // Wakes a parked worker; fails only if it already exited
        self.mailbox.send(WorkerCommand::Stop).ok();

        match thread.join() {
            Ok(stats) => {
                debug!(
                    "Worker {} stopped after {} notes",
                    self.pitch, stats.notes_rendered
                );
                Some(stats)
            }
            Err(_) => {
                error!("Worker {} panicked", self.pitch);
                None
            }
        }
    }
}

impl Drop for NoteWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerLoop {
    pitch: Pitch,
    tone: SampleBuffer,
    silence: SampleBuffer,
    settings: RenderSettings,
    inbox: Receiver<WorkerCommand>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<WorkerState>>,
    stats: WorkerStats,
}

impl WorkerLoop {
    fn run(mut self) -> WorkerStats {
        while self.running.load(Ordering::Acquire) {
            // A closed mailbox means the conductor is gone
            let Ok(command) = self.inbox.recv() else {
                break;
            };

            match command {
                WorkerCommand::Play {
                    event,
                    mut sink,
                    completion,
                } => {
                    self.set_state(WorkerState::Rendering);
                    let result = self.render(&event, sink.as_mut());
                    self.set_state(WorkerState::Idle);
                    completion.complete(sink, result);
                }
                WorkerCommand::Stop => break,
            }
        }

        self.set_state(WorkerState::Stopped);
        self.stats
    }

    fn render(&mut self, event: &NoteEvent, sink: &mut dyn PlaybackSink) -> Result<(), SinkError> {
        let note = self.settings.note_samples(event).min(self.tone.len());
        let gap = self.settings.gap_samples().min(self.silence.len());
        trace!("{} renders {} + {} samples", self.pitch, note, gap);

        sink.write(&self.tone[..note])?;
        sink.write(&self.silence[..gap])?;

        self.stats.notes_rendered += 1;
        self.stats.samples_written += note + gap;
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
