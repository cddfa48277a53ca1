pub mod error;
pub mod executor;
pub mod recipe;
pub mod roles;
pub mod settings;
pub mod ssh;
pub mod task;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use executor::{Connector, ExecutionResult, Executor, Session};
pub use recipe::{LoadOptions, Recipe};
pub use roles::{Host, RoleRegistry};
pub use settings::{Provenance, SettingValue, Settings};
pub use task::{RunReport, Runner, TaskContext, TaskGraph};
