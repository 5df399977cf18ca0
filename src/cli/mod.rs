//! Command line interface

pub mod commands;
pub mod output;

pub use commands::{Cli, Commands};
pub use output::Output;
