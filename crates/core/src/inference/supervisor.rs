use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::audio::domain::sample_buffer::SampleBuffer;
use crate::inference::domain::protocol::{
    EngineOutput, EngineProgress, WorkerCommand, WorkerEvent, WorkerRequest,
};
use crate::inference::domain::worker_context::{WorkerContext, WorkerContextFactory};
use crate::inference::domain::worker_error::{TranscriptionError, WorkerError};
use crate::inference::domain::worker_state::WorkerState;
use crate::shared::constants::WORKER_LOAD_TIMEOUT;
use crate::shared::progress::ProgressEvent;

/// Sole owner of the inference worker context.
///
/// Every operation runs under one lock, so at most one load or transcription
/// is in flight; a second caller blocks until the first finishes and then
/// sees its result (e.g. a worker that is already `Ready`). Any failure tears
/// the context down immediately; the next call starts a fresh one.
pub struct InferenceWorkerSupervisor {
    factory: Box<dyn WorkerContextFactory>,
    load_timeout: Duration,
    inner: Mutex<Slot>,
    state: Mutex<WorkerState>,
}

struct Slot {
    context: Option<Box<dyn WorkerContext>>,
    next_request_id: u64,
}

impl Slot {
    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    fn teardown(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.terminate();
        }
    }
}

enum Outcome {
    Ready,
    Complete(EngineOutput),
    Error(String),
    Fault(String),
    Timeout,
    Disconnected,
}

impl InferenceWorkerSupervisor {
    pub fn new(factory: Box<dyn WorkerContextFactory>) -> Self {
        Self {
            factory,
            load_timeout: WORKER_LOAD_TIMEOUT,
            inner: Mutex::new(Slot {
                context: None,
                next_request_id: 0,
            }),
            state: Mutex::new(WorkerState::Uninitialized),
        }
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the engine up if it isn't already. Idempotent.
    pub fn ensure_ready(&self, progress: &mut dyn FnMut(ProgressEvent)) -> Result<(), WorkerError> {
        let mut slot = self.lock();
        self.ensure_ready_locked(&mut slot, progress)
    }

    /// Run one transcription on the worker, loading it first if needed.
    ///
    /// The buffer is moved into the request. On any error the context has
    /// already been torn down when this returns.
    pub fn transcribe(
        &self,
        audio: SampleBuffer,
        timeout: Duration,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<EngineOutput, TranscriptionError> {
        let mut slot = self.lock();
        self.ensure_ready_locked(&mut slot, progress)?;

        let Some(mut context) = slot.context.take() else {
            self.set_state(WorkerState::Failed);
            return Err(WorkerError::Disconnected.into());
        };
        let request_id = slot.next_request_id();
        self.set_state(WorkerState::Busy);

        let command = WorkerCommand {
            request_id,
            request: WorkerRequest::Transcribe { audio },
        };
        if let Err(e) = context.post(command) {
            context.terminate();
            self.set_state(WorkerState::Failed);
            return Err(e.into());
        }

        let deadline = Instant::now() + timeout;
        let outcome = await_reply(&*context, request_id, deadline, &mut |p| {
            let message = match p.percent {
                Some(percent) => format!("{} {percent:.0}%", p.message),
                None => p.message,
            };
            progress(ProgressEvent::Transcribing { message })
        });

        match outcome {
            Outcome::Complete(output) => {
                slot.context = Some(context);
                self.set_state(WorkerState::Ready);
                Ok(output)
            }
            other => {
                context.terminate();
                self.set_state(WorkerState::Failed);
                let err = match other {
                    Outcome::Timeout => TranscriptionError::Timeout(timeout),
                    Outcome::Error(message) => TranscriptionError::Engine(message),
                    Outcome::Fault(message) => WorkerError::Fault(message).into(),
                    Outcome::Ready | Outcome::Disconnected | Outcome::Complete(_) => {
                        WorkerError::Disconnected.into()
                    }
                };
                log::warn!("Transcription request {request_id} failed: {err}");
                Err(err)
            }
        }
    }

    /// Kill the worker context and forget all cached state. Never fails.
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.teardown();
        self.set_state(WorkerState::Uninitialized);
    }

    fn ensure_ready_locked(
        &self,
        slot: &mut Slot,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<(), WorkerError> {
        if self.state() == WorkerState::Ready && slot.context.is_some() {
            return Ok(());
        }

        // Failed, Uninitialized, or a Loading/Busy left behind by a caller
        // that panicked: start over from nothing.
        slot.teardown();
        self.set_state(WorkerState::Uninitialized);

        self.set_state(WorkerState::Loading);
        let mut context = match self.factory.create() {
            Ok(context) => context,
            Err(e) => {
                self.set_state(WorkerState::Failed);
                return Err(e);
            }
        };

        let request_id = slot.next_request_id();
        let command = WorkerCommand {
            request_id,
            request: WorkerRequest::Load,
        };
        if let Err(e) = context.post(command) {
            context.terminate();
            self.set_state(WorkerState::Failed);
            return Err(e);
        }

        let deadline = Instant::now() + self.load_timeout;
        let outcome = await_reply(&*context, request_id, deadline, &mut |p| {
            progress(ProgressEvent::Loading {
                phase: p.message,
                percent: p.percent,
            })
        });

        let err = match outcome {
            Outcome::Ready => {
                slot.context = Some(context);
                self.set_state(WorkerState::Ready);
                return Ok(());
            }
            Outcome::Timeout => WorkerError::LoadTimeout(self.load_timeout),
            Outcome::Error(message) => WorkerError::Load(message),
            Outcome::Fault(message) => WorkerError::Fault(message),
            Outcome::Complete(_) | Outcome::Disconnected => WorkerError::Disconnected,
        };

        log::warn!("Inference worker failed to load: {err}");
        context.terminate();
        self.set_state(WorkerState::Failed);
        Err(err)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            log::debug!("Inference worker: {} -> {next}", *state);
            *state = next;
        }
    }
}

impl Drop for InferenceWorkerSupervisor {
    fn drop(&mut self) {
        self.lock().teardown();
    }
}

/// Wait for the terminal reply to `request_id`, forwarding its progress.
///
/// Replies to other request ids are stale leftovers and are dropped.
fn await_reply(
    context: &dyn WorkerContext,
    request_id: u64,
    deadline: Instant,
    on_progress: &mut dyn FnMut(EngineProgress),
) -> Outcome {
    loop {
        let reply = match context.replies().recv_deadline(deadline) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => return Outcome::Timeout,
            Err(RecvTimeoutError::Disconnected) => return Outcome::Disconnected,
        };

        match (reply.request_id, reply.event) {
            (None, WorkerEvent::Fault { message }) => return Outcome::Fault(message),
            (None, _) => continue,
            (Some(id), _) if id != request_id => {
                log::debug!("Dropping stale reply for request {id}");
                continue;
            }
            (Some(_), WorkerEvent::Progress(p)) => on_progress(p),
            (Some(_), WorkerEvent::Ready) => return Outcome::Ready,
            (Some(_), WorkerEvent::Complete { output }) => return Outcome::Complete(output),
            (Some(_), WorkerEvent::Error { message }) => return Outcome::Error(message),
            (Some(_), WorkerEvent::Fault { message }) => return Outcome::Fault(message),
        }
    }
}
