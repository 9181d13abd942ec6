pub mod cancellation;
pub mod constants;
pub mod model_store;
pub mod progress;
