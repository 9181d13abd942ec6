pub mod thread_worker_context;
#[cfg(feature = "whisper")]
pub mod whisper_engine;
