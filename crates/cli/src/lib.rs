//! posmigrate CLI library
//!
//! Subcommands, JSON input handling and terminal progress for the
//! migration engine.

pub mod commands;
pub mod input;
pub mod progress;

pub use commands::{MigrateCommand, PlanCommand, SuggestCommand, VerifyCommand};
