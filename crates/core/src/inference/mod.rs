pub mod domain;
pub mod infrastructure;
pub mod supervisor;
