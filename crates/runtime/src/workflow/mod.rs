pub mod compile;
pub mod engine;

pub use compile::{compile, CompiledWorkflow};
pub use engine::WorkflowEngine;
