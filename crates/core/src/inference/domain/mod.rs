pub mod protocol;
pub mod speech_engine;
pub mod worker_context;
pub mod worker_error;
pub mod worker_state;
