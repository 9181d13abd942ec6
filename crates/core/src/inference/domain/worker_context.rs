use crossbeam_channel::Receiver;

use super::protocol::{WorkerCommand, WorkerReply};
use super::worker_error::WorkerError;

/// Isolated execution environment hosting one engine instance.
///
/// Owned exclusively by the supervisor; nothing else holds a reference.
pub trait WorkerContext: Send {
    fn post(&mut self, command: WorkerCommand) -> Result<(), WorkerError>;

    fn replies(&self) -> &Receiver<WorkerReply>;

    /// Stop accepting work and cancel anything in flight. Idempotent.
    fn terminate(&mut self);
}

pub trait WorkerContextFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn WorkerContext>, WorkerError>;
}
