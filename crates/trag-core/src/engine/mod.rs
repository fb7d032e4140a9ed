pub mod builder;
pub mod executor;
pub mod scheduler;

pub use builder::{EngineBuilder, GitCargoBuilder, PrebuiltEngine};
pub use executor::{Invocation, TestExecutor};
pub use scheduler::{RunOptions, RunScheduler, RunSummary};
