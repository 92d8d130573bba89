mod completion;
mod types;

pub use completion::{completion_signal, Completion, CompletionNotifier, CompletionSignal};
pub use types::WorkerCommand;
