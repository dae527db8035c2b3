//! Library half of the `relaychat` binary: argument parsing, error mapping
//! and logging setup, kept out of `main.rs` so they can be tested.

pub mod error;
pub mod logging;
pub mod parser;

pub use error::CliError;
pub use parser::Cli;
