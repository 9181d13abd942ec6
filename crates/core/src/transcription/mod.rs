pub mod dispatcher;
pub mod domain;
pub mod timeout_policy;
