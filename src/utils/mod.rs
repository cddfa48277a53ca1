//! Generic utility primitives with zero domain knowledge.
//!
//! - `shell` - Shell quoting for remote commands
//! - `template` - `{{name}}` placeholder rendering

pub mod shell;
pub mod template;
