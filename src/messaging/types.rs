use super::CompletionNotifier;
use crate::core::note::NoteEvent;
use crate::core::sink::BoxedSink;

/// Message types for communication between the conductor and a note worker
pub enum WorkerCommand {
    /// Render one note into `sink`, then complete `completion`
    Play {
        event: NoteEvent,
        sink: BoxedSink,
        completion: CompletionNotifier,
    },
    /// Leave the worker loop
    Stop,
}
