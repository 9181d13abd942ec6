pub mod job_error;
pub mod job_worker;
pub mod pipeline_logger;
pub mod transcribe_media_use_case;
