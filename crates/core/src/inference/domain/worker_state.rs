use std::fmt;

/// Lifecycle of the supervised worker.
///
/// `Uninitialized -> Loading -> Ready -> Busy -> Ready`; any state may fall
/// to `Failed`, which is never terminal: the next use starts a fresh load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Loading,
    Ready,
    Busy,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Uninitialized => write!(f, "uninitialized"),
            WorkerState::Loading => write!(f, "loading"),
            WorkerState::Ready => write!(f, "ready"),
            WorkerState::Busy => write!(f, "busy"),
            WorkerState::Failed => write!(f, "failed"),
        }
    }
}
