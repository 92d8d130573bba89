//! Sequential playback: one worker thread per pitch, one note at a time
//!
//! The conductor owns the worker registry and the sink. For every note it
//! looks up (or starts) the worker for that pitch, moves the sink into the
//! worker together with a fresh completion signal, and blocks until the worker
//! hands the sink back. Only then is the next note dispatched, so no two notes
//! ever overlap even though different threads play them.
//!
//! The registry is only ever touched from the conductor's thread; workers
//! never see it.

mod worker;

pub use worker::{NoteWorker, RenderSettings, WorkerState, WorkerStats};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;

use log::{debug, info, warn};
use thiserror::Error;

use crate::core::note::{NoteEvent, Pitch};
use crate::core::sink::{BoxedSink, SinkError};
use crate::core::tone::{SampleBuffer, ToneSource};
use crate::messaging::{completion_signal, Completion};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Device(#[from] SinkError),
    #[error("the worker for {0} exited before finishing its note")]
    WorkerLost(Pitch),
    #[error("failed to start a worker thread for {pitch}: {source}")]
    Spawn {
        pitch: Pitch,
        #[source]
        source: io::Error,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub notes_played: usize,
    pub workers_spawned: usize,
    pub samples_written: usize,
    /// Notes rendered by each pitch's worker
    pub notes_by_pitch: HashMap<Pitch, usize>,
}

/// Owns the sink for the length of a run and closes it on every exit path
///
/// While a note is in flight the sink is out with the worker and the guard is
/// empty. The only way it stays empty is a worker dying mid-note, which drops
/// the sink along with the worker's stack.
struct SinkGuard {
    sink: Option<BoxedSink>,
    opened: bool,
}

impl SinkGuard {
    fn new(sink: BoxedSink) -> Self {
        Self {
            sink: Some(sink),
            opened: false,
        }
    }

    fn open_and_start(&mut self) -> Result<(), SinkError> {
        let sink = self.sink.as_mut().ok_or(SinkError::NotOpen)?;
        sink.open()?;
        self.opened = true;
        sink.start()
    }

    fn take(&mut self) -> Result<BoxedSink, SinkError> {
        self.sink.take().ok_or(SinkError::NotOpen)
    }

    fn restore(&mut self, sink: BoxedSink) {
        self.sink = Some(sink);
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.sink.as_mut().ok_or(SinkError::NotOpen)?.drain()
    }

    fn close(&mut self) -> Result<(), SinkError> {
        match self.sink.as_mut() {
            Some(sink) if self.opened => {
                self.opened = false;
                sink.close()
            }
            _ => Ok(()),
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

type SpawnWorker = fn(Pitch, SampleBuffer, SampleBuffer, RenderSettings) -> io::Result<NoteWorker>;

pub struct Conductor {
    tones: ToneSource,
    settings: RenderSettings,
    workers: HashMap<Pitch, NoteWorker>,
    spawn_worker: SpawnWorker,
}

impl Conductor {
    pub fn new(tones: ToneSource, settings: RenderSettings) -> Self {
        Self {
            tones,
            settings,
            workers: HashMap::new(),
            spawn_worker: NoteWorker::spawn,
        }
    }

    /// Number of workers currently registered
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker(&self, pitch: Pitch) -> Option<&NoteWorker> {
        self.workers.get(&pitch)
    }

    /// The worker for `pitch`, started on first use
    pub fn get_or_create_worker(&mut self, pitch: Pitch) -> Result<&NoteWorker, PlaybackError> {
        match self.workers.entry(pitch) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let tone = self.tones.prepare(pitch);
                let worker = (self.spawn_worker)(pitch, tone, self.tones.silence(), self.settings)
                    .map_err(|source| PlaybackError::Spawn { pitch, source })?;
                debug!("Started worker for {}", pitch);
                Ok(entry.insert(worker))
            }
        }
    }

    /// Play `song` through `sink`, one note after another
    ///
    /// The sink is opened and started first and always closed before
    /// returning. After the last note it is drained, then every worker is
    /// stopped. On a device error the run stops at the failing note; workers
    /// are still stopped and the sink closed.
    pub fn play_song(&mut self, song: &[NoteEvent], sink: BoxedSink) -> Result<PlaybackReport, PlaybackError> {
        if song.is_empty() {
            info!("Nothing to play");
            return Ok(PlaybackReport::default());
        }

        let mut sink = SinkGuard::new(sink);
        let played = sink
            .open_and_start()
            .map_err(PlaybackError::from)
            .and_then(|()| self.dispatch_all(song, &mut sink))
            .and_then(|played| {
                sink.drain()?;
                Ok(played)
            });

        let stats = self.stop_workers();
        let closed = sink.close();
        let notes_played = played?;
        closed?;

        let stopped: HashMap<Pitch, WorkerStats> = stats
            .iter()
            .filter_map(|(pitch, stats)| stats.map(|stats| (*pitch, stats)))
            .collect();
        let report = PlaybackReport {
            notes_played,
            workers_spawned: stats.len(),
            samples_written: stopped.values().map(|s| s.samples_written).sum(),
            notes_by_pitch: stopped
                .iter()
                .map(|(pitch, s)| (*pitch, s.notes_rendered))
                .collect(),
        };
        Ok(report)
    }

    fn dispatch_all(&mut self, song: &[NoteEvent], sink: &mut SinkGuard) -> Result<usize, PlaybackError> {
        for (index, event) in song.iter().enumerate() {
            let worker = self.get_or_create_worker(event.pitch)?;
            let handle = sink.take()?;

            let (signal, notifier) = completion_signal();
            if let Err(handle) = worker.submit(*event, handle, notifier) {
                sink.restore(handle);
                return Err(PlaybackError::WorkerLost(event.pitch));
            }

            match signal.wait() {
                Completion::Finished { sink: handle, result } => {
                    sink.restore(handle);
                    result?;
                }
                Completion::Abandoned => return Err(PlaybackError::WorkerLost(event.pitch)),
            }
            debug!("Played note {}/{}: {} {}", index + 1, song.len(), event.pitch, event.length);
        }
        Ok(song.len())
    }

    /// Stop and join every registered worker, emptying the registry
    fn stop_workers(&mut self) -> HashMap<Pitch, Option<WorkerStats>> {
        self.workers
            .drain()
            .map(|(pitch, worker)| (pitch, worker.stop()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::{NoteLength, NoteLengths};
    use crate::core::sink::testing::{RecordingSink, SinkCall, SinkLog};
    use crate::core::song::{distinct_pitches, parse_song};
    use std::collections::HashSet;
    use std::thread::ThreadId;
    use std::time::Duration;

    const RATE: u32 = 8000;

    fn settings() -> RenderSettings {
        RenderSettings {
            sample_rate: RATE,
            lengths: NoteLengths::new(1000),
            gap_ms: 50,
        }
    }

    fn conductor_for(song: &[NoteEvent]) -> Conductor {
        let tones = ToneSource::for_pitches(RATE, 1000, 127, distinct_pitches(song));
        Conductor::new(tones, settings())
    }

    /// Note writes only, skipping the gap written after each note
    fn note_writes(log: &SinkLog) -> Vec<crate::core::sink::testing::WriteSpan> {
        log.writes().into_iter().step_by(2).collect()
    }

    #[test]
    fn plays_notes_in_file_order() {
        let song = parse_song("C4 4\nE4 8\nG4 2\nE4 4\nREST 8\nC4 1").unwrap();
        let mut conductor = conductor_for(&song);
        let expected: Vec<Vec<i8>> = song
            .iter()
            .map(|event| {
                let tone = conductor.tones.buffer(event.pitch).unwrap();
                tone[..settings().note_samples(event)].to_vec()
            })
            .collect();

        let (sink, log) = RecordingSink::new();
        let report = conductor.play_song(&song, Box::new(sink)).unwrap();

        assert_eq!(report.notes_played, song.len());
        let played: Vec<Vec<i8>> = note_writes(&log).into_iter().map(|w| w.samples).collect();
        assert_eq!(played, expected);
    }

    #[test]
    fn writes_of_different_notes_never_overlap() {
        let song = parse_song("C4 8\nD4 8\nE4 8\nC4 8\nD4 8\nF4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();
        let sink = sink.with_write_delay(Duration::from_millis(5));

        conductor.play_song(&song, Box::new(sink)).unwrap();

        let writes = log.writes();
        assert_eq!(writes.len(), song.len() * 2);
        for pair in writes.windows(2) {
            assert!(
                pair[0].finished <= pair[1].started,
                "write spans overlap"
            );
        }
    }

    #[test]
    fn one_worker_thread_per_distinct_pitch() {
        let song = parse_song("A4 8\nB4 8\nA4 8\nA4 8\nB4 8\nREST 8\nA4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();

        let report = conductor.play_song(&song, Box::new(sink)).unwrap();

        assert_eq!(report.workers_spawned, 3);
        let a4: Pitch = "A4".parse().unwrap();
        let b4: Pitch = "B4".parse().unwrap();
        assert_eq!(report.notes_by_pitch[&a4], 4);
        assert_eq!(report.notes_by_pitch[&b4], 2);
        assert_eq!(report.notes_by_pitch[&Pitch::Rest], 1);

        let mut thread_of: HashMap<Pitch, ThreadId> = HashMap::new();
        for (event, write) in song.iter().zip(note_writes(&log)) {
            let thread = *thread_of.entry(event.pitch).or_insert(write.thread);
            assert_eq!(thread, write.thread, "{} moved threads", event.pitch);
        }
        let threads: HashSet<ThreadId> = thread_of.values().copied().collect();
        assert_eq!(threads.len(), 3);
        assert!(!threads.contains(&std::thread::current().id()));
    }

    #[test]
    fn quarter_note_length_is_independent_of_pitch() {
        let song = parse_song("C2 4\nA4 4\nG7S 4\nREST 4").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();

        conductor.play_song(&song, Box::new(sink)).unwrap();

        // 250 ms at 8 kHz
        for write in note_writes(&log) {
            assert_eq!(write.samples.len(), 2000);
        }
    }

    #[test]
    fn quarter_note_at_default_rate_is_a_quarter_second() {
        let rate = 48 * 1024;
        let settings = RenderSettings {
            sample_rate: rate,
            lengths: NoteLengths::new(1000),
            gap_ms: 50,
        };
        let quarter = NoteEvent::new("C4".parse().unwrap(), NoteLength::Quarter);
        assert_eq!(settings.note_samples(&quarter), rate as usize / 4);
        assert_eq!(settings.gap_samples(), 2457);
    }

    #[test]
    fn drains_before_closing_and_stops_every_worker() {
        let song = parse_song("C4 8\nD4 8\nC4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();

        let report = conductor.play_song(&song, Box::new(sink)).unwrap();

        let calls = log.calls();
        assert_eq!(calls.first(), Some(&SinkCall::Open));
        assert_eq!(calls[1], SinkCall::Start);
        assert_eq!(&calls[calls.len() - 2..], &[SinkCall::Drain, SinkCall::Close]);
        assert_eq!(calls.iter().filter(|c| **c == SinkCall::Close).count(), 1);

        assert_eq!(report.workers_spawned, 2);
        // every worker joined cleanly and reported its notes
        assert_eq!(report.notes_by_pitch.len(), 2);
        assert_eq!(conductor.worker_count(), 0);
    }

    #[test]
    fn registry_reuses_workers() {
        let mut conductor = conductor_for(&[]);
        let c4: Pitch = "C4".parse().unwrap();
        conductor.get_or_create_worker(c4).unwrap();
        conductor.get_or_create_worker(c4).unwrap();
        conductor.get_or_create_worker(Pitch::Rest).unwrap();
        assert_eq!(conductor.worker_count(), 2);
        assert_eq!(conductor.worker(c4).unwrap().state(), WorkerState::Idle);
    }

    #[test]
    fn device_error_releases_conductor_and_stops_workers() {
        let song = parse_song("C4 8\nD4 8\nE4 8\nF4 8").unwrap();
        let mut conductor = conductor_for(&song);
        // write 2 is D4's note write
        let (sink, log) = RecordingSink::new();
        let sink = sink.failing_write(2);

        let err = conductor.play_song(&song, Box::new(sink)).unwrap_err();

        assert!(matches!(err, PlaybackError::Device(SinkError::Write(_))));
        assert_eq!(conductor.worker_count(), 0);
        let calls = log.calls();
        assert_eq!(calls.last(), Some(&SinkCall::Close));
        assert!(!calls.contains(&SinkCall::Drain));
        // E4 and F4 were never dispatched
        assert_eq!(log.writes().len(), 2);
    }

    #[test]
    fn worker_dying_mid_note_is_reported_as_lost() {
        let song = parse_song("C4 8\nD4 8\nE4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();
        let sink = sink.panicking_write(2);

        let err = conductor.play_song(&song, Box::new(sink)).unwrap_err();

        let d4: Pitch = "D4".parse().unwrap();
        assert!(matches!(err, PlaybackError::WorkerLost(pitch) if pitch == d4));
        assert_eq!(conductor.worker_count(), 0);
        // the sink went down with the D4 worker; E4 was never dispatched
        assert_eq!(log.writes().len(), 2);
        assert!(!log.calls().contains(&SinkCall::Drain));
    }

    #[test]
    fn spawn_failure_still_closes_the_sink() {
        let song = parse_song("C4 8\nD4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let d4: Pitch = "D4".parse().unwrap();
        conductor.spawn_worker = |pitch, tone, silence, settings| {
            if pitch.to_string() == "D4" {
                return Err(io::Error::new(io::ErrorKind::Other, "thread limit reached"));
            }
            NoteWorker::spawn(pitch, tone, silence, settings)
        };
        let (sink, log) = RecordingSink::new();

        let err = conductor.play_song(&song, Box::new(sink)).unwrap_err();

        assert!(matches!(err, PlaybackError::Spawn { pitch, .. } if pitch == d4));
        assert_eq!(conductor.worker_count(), 0);
        let calls = log.calls();
        assert_eq!(calls.last(), Some(&SinkCall::Close));
        assert_eq!(calls.iter().filter(|c| **c == SinkCall::Close).count(), 1);
        // only C4 played
        assert_eq!(log.writes().len(), 2);
    }

    #[test]
    fn open_failure_plays_nothing() {
        let song = parse_song("C4 8").unwrap();
        let mut conductor = conductor_for(&song);
        let (sink, log) = RecordingSink::new();

        let err = conductor.play_song(&song, Box::new(sink.failing_open())).unwrap_err();

        assert!(matches!(err, PlaybackError::Device(SinkError::NoDevice)));
        assert_eq!(log.calls(), vec![SinkCall::Open]);
        assert_eq!(conductor.worker_count(), 0);
    }

    #[test]
    fn empty_song_does_not_touch_the_sink() {
        let mut conductor = conductor_for(&[]);
        let (sink, log) = RecordingSink::new();
        let report = conductor.play_song(&[], Box::new(sink)).unwrap();
        assert_eq!(report, PlaybackReport::default());
        assert!(log.calls().is_empty());
    }

    #[test]
    fn tones_missing_from_the_table_are_built_on_demand() {
        let song = parse_song("C4 8\nD4 8").unwrap();
        let mut conductor = Conductor::new(ToneSource::new(RATE, 1000, 127), settings());
        let (sink, log) = RecordingSink::new();

        conductor.play_song(&song, Box::new(sink)).unwrap();

        assert_eq!(conductor.tones.pitch_count(), 2);
        assert_eq!(note_writes(&log).len(), 2);
    }

    #[test]
    fn conductor_can_play_more_than_one_song() {
        let song = parse_song("C4 8\nC4 8").unwrap();
        let mut conductor = conductor_for(&song);
        for _ in 0..2 {
            let (sink, _log) = RecordingSink::new();
            let report = conductor.play_song(&song, Box::new(sink)).unwrap();
            assert_eq!(report.workers_spawned, 1);
            assert_eq!(report.notes_by_pitch[&"C4".parse::<Pitch>().unwrap()], 2);
        }
    }
}
