use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::audio::domain::container_hint::ContainerHint;
use crate::pipeline::job_error::JobError;
use crate::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use crate::pipeline::transcribe_media_use_case::TranscribeMediaUseCase;
use crate::shared::progress::ProgressEvent;
use crate::transcription::domain::segment::Segment;

/// One queued file.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub input_path: PathBuf,
    pub hint: ContainerHint,
}

impl Job {
    pub fn new(id: usize, input_path: PathBuf) -> Self {
        let hint = ContainerHint::from_path(&input_path);
        Self {
            id,
            input_path,
            hint,
        }
    }
}

/// Messages sent from the worker thread to the caller.
#[derive(Debug, Clone)]
pub enum JobMessage {
    Started { job: usize },
    Progress { job: usize, event: ProgressEvent },
    Completed { job: usize, segments: Vec<Segment> },
    Failed { job: usize, error: String, retryable: bool },
    Cancelled,
    Finished,
}

/// Forwards progress to the channel and keeps the stage log.
struct ChannelLogger<'a> {
    job: usize,
    tx: &'a Sender<JobMessage>,
    inner: LogPipelineLogger,
}

impl PipelineLogger for ChannelLogger<'_> {
    fn progress(&mut self, event: &ProgressEvent) {
        self.inner.progress(event);
        let _ = self.tx.send(JobMessage::Progress {
            job: self.job,
            event: event.clone(),
        });
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.inner.timing(stage, duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.inner.metric(name, value);
    }

    fn info(&mut self, message: &str) {
        self.inner.info(message);
    }

    fn summary(&self) {
        self.inner.summary();
    }
}

/// Spawn a background worker that processes `jobs` one by one. Returns the
/// channel receiver and cancellation token.
///
/// A failing job reports `Failed` and the queue moves on. Cancellation is
/// checked between jobs; the file in flight runs to completion.
pub fn spawn(
    jobs: Vec<Job>,
    use_case: Arc<TranscribeMediaUseCase>,
) -> (Receiver<JobMessage>, Arc<AtomicBool>) {
    let (tx, rx) = crossbeam_channel::unbounded::<JobMessage>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();

    thread::spawn(move || run_queue(jobs, &use_case, &tx, &cancelled_clone));

    (rx, cancelled)
}

fn run_queue(
    jobs: Vec<Job>,
    use_case: &TranscribeMediaUseCase,
    tx: &Sender<JobMessage>,
    cancelled: &AtomicBool,
) {
    for job in jobs {
        if cancelled.load(Ordering::Relaxed) {
            log::info!("Job queue cancelled before job {}", job.id);
            let _ = tx.send(JobMessage::Cancelled);
            return;
        }

        let _ = tx.send(JobMessage::Started { job: job.id });
        let message = match run_job(tx, &job, use_case) {
            Ok(segments) => JobMessage::Completed {
                job: job.id,
                segments,
            },
            Err(e) => {
                log::error!("Job {} ({}) failed: {e}", job.id, job.input_path.display());
                JobMessage::Failed {
                    job: job.id,
                    error: e.user_message(),
                    retryable: e.is_retryable(),
                }
            }
        };
        if tx.send(message).is_err() {
            return;
        }
    }
    let _ = tx.send(JobMessage::Finished);
}

fn run_job(
    tx: &Sender<JobMessage>,
    job: &Job,
    use_case: &TranscribeMediaUseCase,
) -> Result<Vec<Segment>, JobError> {
    log::info!("Job {}: {}", job.id, job.input_path.display());
    let bytes = fs::read(&job.input_path)?;
    let mut logger = ChannelLogger {
        job: job.id,
        tx,
        inner: LogPipelineLogger::default(),
    };
    use_case.run(bytes, &job.hint, &mut logger)
}
