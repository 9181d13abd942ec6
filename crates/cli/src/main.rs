use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use voxscribe_core::audio::domain::media_decoder::MediaDecoder;
use voxscribe_core::audio::preprocessor::AudioPreprocessor;
use voxscribe_core::config::Settings;
use voxscribe_core::diarization::infrastructure::http_speaker_classifier::HttpSpeakerClassifier;
use voxscribe_core::diarization::stitcher::{DiarizationStitcher, SpeakerOffsetMode};
use voxscribe_core::inference::domain::speech_engine::SpeechEngineFactory;
use voxscribe_core::inference::infrastructure::thread_worker_context::ThreadWorkerFactory;
use voxscribe_core::inference::supervisor::InferenceWorkerSupervisor;
use voxscribe_core::pipeline::job_worker::{self, Job, JobMessage};
use voxscribe_core::pipeline::transcribe_media_use_case::TranscribeMediaUseCase;
use voxscribe_core::shared::progress::ProgressEvent;
use voxscribe_core::transcription::dispatcher::TranscriptionDispatcher;
use voxscribe_core::transcription::domain::segment::Segment;

/// Transcribe audio and video files, optionally attributing speakers.
#[derive(Parser)]
#[command(name = "voxscribe")]
struct Cli {
    /// Audio or video files to transcribe.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Settings file (default: <config dir>/voxscribe/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local ggml model file (skips the download cache).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Spoken language code passed to the engine.
    #[arg(long)]
    language: Option<String>,

    /// Speaker classification endpoint; enables diarization.
    #[arg(long)]
    diarization_url: Option<String>,

    /// Disable diarization even if the settings file configures an endpoint.
    #[arg(long)]
    no_diarization: bool,

    /// Segments per speaker classification request.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Speaker numbering across batches: previous-batch or cumulative.
    #[arg(long)]
    offset_mode: Option<String>,

    /// Write the JSON transcript here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when at least one file failed.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = load_settings(&cli)?;
    let use_case = Arc::new(build_use_case(&settings)?);

    let jobs: Vec<Job> = cli
        .inputs
        .iter()
        .enumerate()
        .map(|(id, path)| Job::new(id, path.clone()))
        .collect();

    let (rx, _cancel) = job_worker::spawn(jobs, use_case);
    let mut results: Vec<Option<Vec<Segment>>> = vec![None; cli.inputs.len()];
    let mut all_ok = true;

    for message in rx {
        match message {
            JobMessage::Started { job } => {
                log::info!("Transcribing {}", cli.inputs[job].display());
            }
            JobMessage::Progress { event, .. } => report_progress(&event),
            JobMessage::Completed { job, segments } => {
                eprintln!();
                log::info!(
                    "{}: {} segment(s)",
                    cli.inputs[job].display(),
                    segments.len()
                );
                results[job] = Some(segments);
            }
            JobMessage::Failed {
                job,
                error,
                retryable,
            } => {
                eprintln!();
                let hint = if retryable { " (retryable)" } else { "" };
                eprintln!("{}: {error}{hint}", cli.inputs[job].display());
                all_ok = false;
            }
            JobMessage::Cancelled | JobMessage::Finished => break,
        }
    }

    let transcripts: Vec<serde_json::Value> = cli
        .inputs
        .iter()
        .zip(results)
        .filter_map(|(path, segments)| {
            segments.map(|segments| {
                serde_json::json!({
                    "file": path.display().to_string(),
                    "segments": segments,
                })
            })
        })
        .collect();
    let json = serde_json::to_string_pretty(&transcripts)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("Transcript written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(all_ok)
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };

    if let Some(model) = &cli.model {
        settings.model_path = Some(model.clone());
    }
    if let Some(language) = &cli.language {
        settings.language = language.clone();
    }
    if let Some(url) = &cli.diarization_url {
        settings.diarization_url = Some(url.clone());
    }
    if cli.no_diarization {
        settings.diarization_url = None;
    }
    if let Some(batch_size) = cli.batch_size {
        settings.diarization_batch_size = batch_size;
    }
    if let Some(mode) = &cli.offset_mode {
        settings.speaker_offset_mode = parse_offset_mode(mode)?;
    }
    Ok(settings)
}

fn build_use_case(settings: &Settings) -> Result<TranscribeMediaUseCase, Box<dyn std::error::Error>> {
    let preprocessor = AudioPreprocessor::new(media_decoder()?)
        .with_target_rate(settings.target_sample_rate)
        .with_decode_timeout(settings.decode_timeout());

    let supervisor =
        InferenceWorkerSupervisor::new(Box::new(ThreadWorkerFactory::new(speech_engines(settings)?)))
            .with_load_timeout(settings.load_timeout());
    let dispatcher =
        TranscriptionDispatcher::new(Arc::new(supervisor)).with_policy(settings.timeout_policy());

    let stitcher = match &settings.diarization_url {
        Some(url) => {
            let classifier = HttpSpeakerClassifier::new(url, settings.diarization_timeout())?;
            log::info!("Speaker attribution via {}", classifier.endpoint());
            Some(
                DiarizationStitcher::new(Arc::new(classifier))
                    .with_batch_size(settings.diarization_batch_size)
                    .with_offset_mode(settings.speaker_offset_mode),
            )
        }
        None => None,
    };

    Ok(TranscribeMediaUseCase::new(preprocessor, dispatcher, stitcher))
}

#[cfg(feature = "ffmpeg")]
fn media_decoder() -> Result<Arc<dyn MediaDecoder>, Box<dyn std::error::Error>> {
    use voxscribe_core::audio::infrastructure::ffmpeg_media_decoder::FfmpegMediaDecoder;
    Ok(Arc::new(FfmpegMediaDecoder::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn media_decoder() -> Result<Arc<dyn MediaDecoder>, Box<dyn std::error::Error>> {
    Err("voxscribe was built without the `ffmpeg` feature; no media decoder available".into())
}

#[cfg(feature = "whisper")]
fn speech_engines(
    settings: &Settings,
) -> Result<Arc<dyn SpeechEngineFactory>, Box<dyn std::error::Error>> {
    use voxscribe_core::inference::infrastructure::whisper_engine::{
        ModelSource, WhisperEngineFactory,
    };
    use voxscribe_core::shared::model_store::ModelStore;

    let source = match &settings.model_path {
        Some(path) => {
            if !path.exists() {
                return Err(format!("Model file not found: {}", path.display()).into());
            }
            ModelSource::Path(path.clone())
        }
        None => ModelSource::Store {
            store: ModelStore::default_location()?,
            name: settings.model_name.clone(),
            url: settings.model_url.clone(),
        },
    };
    Ok(Arc::new(WhisperEngineFactory::new(source, &settings.language)))
}

#[cfg(not(feature = "whisper"))]
fn speech_engines(
    _settings: &Settings,
) -> Result<Arc<dyn SpeechEngineFactory>, Box<dyn std::error::Error>> {
    Err("voxscribe was built without the `whisper` feature; no speech engine available".into())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    if cli.no_diarization && cli.diarization_url.is_some() {
        return Err("--diarization-url and --no-diarization are mutually exclusive".into());
    }
    if cli.batch_size == Some(0) {
        return Err("Batch size must be at least 1".into());
    }
    if let Some(mode) = &cli.offset_mode {
        parse_offset_mode(mode)?;
    }
    Ok(())
}

fn parse_offset_mode(mode: &str) -> Result<SpeakerOffsetMode, String> {
    match mode {
        "previous-batch" => Ok(SpeakerOffsetMode::PreviousBatch),
        "cumulative" => Ok(SpeakerOffsetMode::Cumulative),
        other => Err(format!(
            "Offset mode must be 'previous-batch' or 'cumulative', got '{other}'"
        )),
    }
}

fn report_progress(event: &ProgressEvent) {
    // Clear to end of line so a shorter message does not leave a tail behind.
    eprint!("\r{event}\x1b[K");
}
