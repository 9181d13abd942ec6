use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::inference::domain::protocol::{
    EngineProgress, WorkerCommand, WorkerEvent, WorkerReply, WorkerRequest,
};
use crate::inference::domain::speech_engine::{ProgressSink, SpeechEngine, SpeechEngineFactory};
use crate::inference::domain::worker_context::{WorkerContext, WorkerContextFactory};
use crate::inference::domain::worker_error::WorkerError;
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::WORKER_EXIT_TIMEOUT;

/// Worker context backed by a dedicated OS thread.
///
/// The engine is created on the worker thread and never leaves it. Commands
/// and replies travel over channels. A panic while handling a command is
/// reported as a `Fault` and ends the thread.
pub struct ThreadWorkerContext {
    commands: Option<Sender<WorkerCommand>>,
    replies: Receiver<WorkerReply>,
    cancel: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadWorkerContext {
    pub fn spawn(engines: Arc<dyn SpeechEngineFactory>) -> Result<Self, WorkerError> {
        Self::start(engines, None)
    }

    fn start(
        engines: Arc<dyn SpeechEngineFactory>,
        permit: Option<EnginePermit>,
    ) -> Result<Self, WorkerError> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<WorkerCommand>();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<WorkerReply>();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("inference-worker".to_string())
            .spawn(move || {
                // Released only after the engine inside `run_worker` is dropped.
                let _permit = permit;
                run_worker(&*engines, command_rx, reply_tx, &worker_cancel);
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        Ok(Self {
            commands: Some(command_tx),
            replies: reply_rx,
            cancel,
            handle: Some(handle),
        })
    }
}

impl WorkerContext for ThreadWorkerContext {
    fn post(&mut self, command: WorkerCommand) -> Result<(), WorkerError> {
        let commands = self.commands.as_ref().ok_or(WorkerError::Disconnected)?;
        commands
            .send(command)
            .map_err(|_| WorkerError::Disconnected)
    }

    fn replies(&self) -> &Receiver<WorkerReply> {
        &self.replies
    }

    fn terminate(&mut self) {
        // The engine sees the cancel flag and returns early; closing the
        // command channel then ends the worker loop. OS threads cannot be
        // killed, so the handle is detached rather than joined.
        self.cancel.cancel();
        if self.commands.take().is_some() {
            log::debug!("Terminating inference worker context");
        }
        self.handle.take();
    }
}

impl Drop for ThreadWorkerContext {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Proof that this worker owns the factory's only engine slot. Dropping it
/// hands the slot back.
struct EnginePermit {
    release: Sender<()>,
}

impl Drop for EnginePermit {
    fn drop(&mut self) {
        let _ = self.release.try_send(());
    }
}

/// Creates a new [`ThreadWorkerContext`] per load attempt.
///
/// At most one worker thread holds an engine at a time. A new context waits
/// up to the exit timeout for a terminated worker to finish its current
/// command and drop its engine.
pub struct ThreadWorkerFactory {
    engines: Arc<dyn SpeechEngineFactory>,
    exit_timeout: Duration,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
}

impl ThreadWorkerFactory {
    pub fn new(engines: Arc<dyn SpeechEngineFactory>) -> Self {
        let (slot_tx, slot_rx) = crossbeam_channel::bounded(1);
        let _ = slot_tx.try_send(());
        Self {
            engines,
            exit_timeout: WORKER_EXIT_TIMEOUT,
            slot_tx,
            slot_rx,
        }
    }

    pub fn with_exit_timeout(mut self, exit_timeout: Duration) -> Self {
        self.exit_timeout = exit_timeout;
        self
    }

    fn acquire(&self) -> Result<EnginePermit, WorkerError> {
        if self.slot_rx.try_recv().is_err() {
            log::debug!("Waiting for the previous inference worker to exit");
            self.slot_rx.recv_timeout(self.exit_timeout).map_err(|_| {
                WorkerError::Spawn(format!(
                    "previous inference worker still running after {}s",
                    self.exit_timeout.as_secs()
                ))
            })?;
        }
        Ok(EnginePermit {
            release: self.slot_tx.clone(),
        })
    }
}

impl WorkerContextFactory for ThreadWorkerFactory {
    fn create(&self) -> Result<Box<dyn WorkerContext>, WorkerError> {
        let permit = self.acquire()?;
        Ok(Box::new(ThreadWorkerContext::start(
            Arc::clone(&self.engines),
            Some(permit),
        )?))
    }
}

fn run_worker(
    engines: &dyn SpeechEngineFactory,
    commands: Receiver<WorkerCommand>,
    replies: Sender<WorkerReply>,
    cancel: &CancellationToken,
) {
    let mut engine: Option<Box<dyn SpeechEngine>> = None;

    for command in commands {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handle_command(engines, &mut engine, command, &replies, cancel)
        }));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            log::error!("Inference worker panicked: {message}");
            let _ = replies.send(WorkerReply::fault(message));
            return;
        }
    }
}

fn handle_command(
    engines: &dyn SpeechEngineFactory,
    engine: &mut Option<Box<dyn SpeechEngine>>,
    command: WorkerCommand,
    replies: &Sender<WorkerReply>,
    cancel: &CancellationToken,
) {
    let request_id = command.request_id;
    let sink: ProgressSink = {
        let replies = replies.clone();
        Arc::new(move |p: EngineProgress| {
            let _ = replies.send(WorkerReply::to(request_id, WorkerEvent::Progress(p)));
        })
    };
    let mut progress = |p: EngineProgress| sink(p);

    let event = match command.request {
        WorkerRequest::Load => {
            if engine.is_some() {
                WorkerEvent::Ready
            } else {
                let loaded = engines.create().and_then(|mut e| {
                    e.load(&mut progress)?;
                    Ok(e)
                });
                match loaded {
                    Ok(e) => {
                        *engine = Some(e);
                        WorkerEvent::Ready
                    }
                    Err(e) => WorkerEvent::Error {
                        message: e.to_string(),
                    },
                }
            }
        }
        WorkerRequest::Transcribe { audio } => match engine.as_mut() {
            None => WorkerEvent::Error {
                message: "engine is not loaded".to_string(),
            },
            Some(e) => match e.transcribe(audio, cancel, Arc::clone(&sink)) {
                Ok(output) => WorkerEvent::Complete { output },
                Err(e) => WorkerEvent::Error {
                    message: e.to_string(),
                },
            },
        },
    };

    let _ = replies.send(WorkerReply::to(request_id, event));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::domain::sample_buffer::SampleBuffer;
    use crate::inference::domain::protocol::EngineOutput;
    use crate::inference::domain::speech_engine::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ─── Stubs ───

    struct EchoEngine;

    impl SpeechEngine for EchoEngine {
        fn load(&mut self, progress: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
            progress(EngineProgress::percent("loading", 50.0));
            Ok(())
        }

        fn transcribe(
            &mut self,
            audio: SampleBuffer,
            _: &CancellationToken,
            progress: ProgressSink,
        ) -> Result<EngineOutput, EngineError> {
            progress(EngineProgress::percent("transcribing", 100.0));
            Ok(EngineOutput {
                text: Some(format!("{} samples", audio.len())),
                chunks: None,
            })
        }
    }

    struct PanicEngine;

    impl SpeechEngine for PanicEngine {
        fn load(&mut self, _: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
            Ok(())
        }

        fn transcribe(
            &mut self,
            _: SampleBuffer,
            _: &CancellationToken,
            _: ProgressSink,
        ) -> Result<EngineOutput, EngineError> {
            panic!("engine exploded");
        }
    }

    /// Spins until cancelled, then reports how it stopped.
    struct CooperativeEngine {
        started: Sender<()>,
        stopped: Sender<()>,
    }

    impl SpeechEngine for CooperativeEngine {
        fn load(&mut self, _: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
            Ok(())
        }

        fn transcribe(
            &mut self,
            _: SampleBuffer,
            cancel: &CancellationToken,
            _: ProgressSink,
        ) -> Result<EngineOutput, EngineError> {
            let _ = self.started.send(());
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            let _ = self.stopped.send(());
            Err("aborted".into())
        }
    }

    /// Counts live engines; an engine is live from creation until dropped.
    struct TrackedEngine {
        live: Arc<AtomicUsize>,
        busy: Duration,
    }

    impl Drop for TrackedEngine {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SpeechEngine for TrackedEngine {
        fn load(&mut self, _: &mut dyn FnMut(EngineProgress)) -> Result<(), EngineError> {
            thread::sleep(self.busy);
            Ok(())
        }

        fn transcribe(
            &mut self,
            _: SampleBuffer,
            _: &CancellationToken,
            _: ProgressSink,
        ) -> Result<EngineOutput, EngineError> {
            Ok(EngineOutput::default())
        }
    }

    #[derive(Clone, Default)]
    struct TrackedEngines {
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        busy: Duration,
    }

    impl SpeechEngineFactory for TrackedEngines {
        fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(TrackedEngine {
                live: self.live.clone(),
                busy: self.busy,
            }))
        }
    }

    struct Engines<F: Fn() -> Box<dyn SpeechEngine> + Send + Sync>(F);

    impl<F: Fn() -> Box<dyn SpeechEngine> + Send + Sync> SpeechEngineFactory for Engines<F> {
        fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
            Ok((self.0)())
        }
    }

    struct BrokenEngines;

    impl SpeechEngineFactory for BrokenEngines {
        fn create(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
            Err("model file missing".into())
        }
    }

    fn recv(ctx: &ThreadWorkerContext) -> WorkerReply {
        ctx.replies()
            .recv_timeout(Duration::from_secs(5))
            .expect("worker did not reply")
    }

    fn command(request_id: u64, request: WorkerRequest) -> WorkerCommand {
        WorkerCommand {
            request_id,
            request,
        }
    }

    #[test]
    fn test_load_reports_progress_then_ready() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(|| {
            Box::new(EchoEngine) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();

        let progress = recv(&ctx);
        assert_eq!(progress.request_id, Some(1));
        assert!(matches!(
            progress.event,
            WorkerEvent::Progress(EngineProgress {
                percent: Some(p),
                ..
            }) if p == 50.0
        ));
        let ready = recv(&ctx);
        assert!(matches!(ready.event, WorkerEvent::Ready));
    }

    #[test]
    fn test_transcribe_after_load_completes() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(|| {
            Box::new(EchoEngine) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();
        ctx.post(command(
            2,
            WorkerRequest::Transcribe {
                audio: SampleBuffer::new(vec![0.0; 320], 16000),
            },
        ))
        .unwrap();

        let reply = loop {
            let reply = recv(&ctx);
            if reply.request_id == Some(2) {
                break reply;
            }
        };
        match reply.event {
            WorkerEvent::Complete { output } => {
                assert_eq!(output.text.as_deref(), Some("320 samples"))
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_transcribe_before_load_is_error() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(|| {
            Box::new(EchoEngine) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(
            7,
            WorkerRequest::Transcribe {
                audio: SampleBuffer::new(vec![0.0; 16], 16000),
            },
        ))
        .unwrap();

        let reply = recv(&ctx);
        assert_eq!(reply.request_id, Some(7));
        assert!(matches!(reply.event, WorkerEvent::Error { .. }));
    }

    #[test]
    fn test_engine_creation_failure_is_load_error() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(BrokenEngines)).unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();

        match recv(&ctx).event {
            WorkerEvent::Error { message } => assert!(message.contains("model file missing")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_panic_becomes_context_fault() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(|| {
            Box::new(PanicEngine) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();
        assert!(matches!(recv(&ctx).event, WorkerEvent::Ready));

        ctx.post(command(
            2,
            WorkerRequest::Transcribe {
                audio: SampleBuffer::new(vec![0.0; 16], 16000),
            },
        ))
        .unwrap();

        let reply = recv(&ctx);
        assert!(reply.request_id.is_none());
        match reply.event {
            WorkerEvent::Fault { message } => assert!(message.contains("engine exploded")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_post_after_terminate_is_rejected() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(BrokenEngines)).unwrap();
        ctx.terminate();
        ctx.terminate();
        assert_eq!(
            ctx.post(command(1, WorkerRequest::Load)).unwrap_err(),
            WorkerError::Disconnected
        );
    }

    #[test]
    fn test_transcribe_progress_is_tagged_with_request() {
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(|| {
            Box::new(EchoEngine) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();
        ctx.post(command(
            2,
            WorkerRequest::Transcribe {
                audio: SampleBuffer::new(vec![0.0; 16], 16000),
            },
        ))
        .unwrap();

        let progress = loop {
            let reply = recv(&ctx);
            if let WorkerEvent::Progress(p) = reply.event {
                if p.message == "transcribing" {
                    break (reply.request_id, p.percent);
                }
            }
        };
        assert_eq!(progress, (Some(2), Some(100.0)));
    }

    #[test]
    fn test_terminate_cancels_running_transcription() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (stopped_tx, stopped_rx) = crossbeam_channel::unbounded();
        let mut ctx = ThreadWorkerContext::spawn(Arc::new(Engines(move || {
            Box::new(CooperativeEngine {
                started: started_tx.clone(),
                stopped: stopped_tx.clone(),
            }) as Box<dyn SpeechEngine>
        })))
        .unwrap();
        ctx.post(command(1, WorkerRequest::Load)).unwrap();
        ctx.post(command(
            2,
            WorkerRequest::Transcribe {
                audio: SampleBuffer::new(vec![0.0; 16], 16000),
            },
        ))
        .unwrap();
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("transcription never started");

        ctx.terminate();

        assert!(stopped_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_factory_waits_for_previous_engine_to_drop() {
        let engines = TrackedEngines {
            busy: Duration::from_millis(200),
            ..TrackedEngines::default()
        };
        let factory = ThreadWorkerFactory::new(Arc::new(engines.clone()));

        let mut first = factory.create().unwrap();
        first.post(command(1, WorkerRequest::Load)).unwrap();
        // Give the first worker time to start building its engine.
        thread::sleep(Duration::from_millis(50));
        first.terminate();

        let mut second = factory.create().unwrap();
        second.post(command(1, WorkerRequest::Load)).unwrap();
        let ready = second
            .replies()
            .recv_timeout(Duration::from_secs(5))
            .expect("second worker did not reply");

        assert!(matches!(ready.event, WorkerEvent::Ready));
        assert_eq!(engines.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_refuses_second_worker_while_first_is_alive() {
        let factory = ThreadWorkerFactory::new(Arc::new(TrackedEngines::default()))
            .with_exit_timeout(Duration::from_millis(30));

        let _first = factory.create().unwrap();

        let start = std::time::Instant::now();
        assert!(matches!(factory.create(), Err(WorkerError::Spawn(_))));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
