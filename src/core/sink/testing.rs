//! Instrumented sink for exercising the playback protocol without a device

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use super::{PlaybackSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Open,
    Start,
    Write(usize),
    Drain,
    Close,
}

/// One `write` call: who made it, when, and what was written
#[derive(Debug, Clone)]
pub struct WriteSpan {
    pub thread: ThreadId,
    pub started: Instant,
    pub finished: Instant,
    pub samples: Vec<i8>,
}

#[derive(Default)]
struct Log {
    calls: Vec<SinkCall>,
    writes: Vec<WriteSpan>,
}

/// Shared view of everything a `RecordingSink` saw
#[derive(Clone, Default)]
pub struct SinkLog {
    inner: Arc<Mutex<Log>>,
}

impl SinkLog {
    fn lock(&self) -> MutexGuard<'_, Log> {
        self.inner.lock().expect("sink log mutex poisoned")
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().calls.clone()
    }

    pub fn writes(&self) -> Vec<WriteSpan> {
        self.lock().writes.clone()
    }
}

pub struct RecordingSink {
    log: SinkLog,
    write_delay: Duration,
    fail_write: Option<usize>,
    panic_write: Option<usize>,
    fail_open: bool,
    writes_seen: usize,
}

impl RecordingSink {
    pub fn new() -> (Self, SinkLog) {
        let log = SinkLog::default();
        let sink = Self {
            log: log.clone(),
            write_delay: Duration::ZERO,
            fail_write: None,
            panic_write: None,
            fail_open: false,
            writes_seen: 0,
        };
        (sink, log)
    }

    /// Make every write take at least `delay`, widening the write spans
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Fail the write with this 0-based index
    pub fn failing_write(mut self, index: usize) -> Self {
        self.fail_write = Some(index);
        self
    }

    /// Panic inside the write with this 0-based index, killing the caller
    pub fn panicking_write(mut self, index: usize) -> Self {
        self.panic_write = Some(index);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn record(&self, call: SinkCall) {
        self.log.lock().calls.push(call);
    }
}

impl PlaybackSink for RecordingSink {
    fn open(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Open);
        if self.fail_open {
            return Err(SinkError::NoDevice);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Start);
        Ok(())
    }

    fn write(&mut self, samples: &[i8]) -> Result<(), SinkError> {
        let index = self.writes_seen;
        self.writes_seen += 1;
        self.record(SinkCall::Write(samples.len()));
        if self.fail_write == Some(index) {
            return Err(SinkError::Write("device unplugged".to_string()));
        }
        if self.panic_write == Some(index) {
            panic!("sink write {} panicked", index);
        }

        let started = Instant::now();
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        let span = WriteSpan {
            thread: thread::current().id(),
            started,
            finished: Instant::now(),
            samples: samples.to_vec(),
        };
        self.log.lock().writes.push(span);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Drain);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Close);
        Ok(())
    }
}
