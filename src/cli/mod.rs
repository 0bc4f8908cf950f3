//! Handles Command Line Interface (CLI) related functionalities.
//!
//! Includes the clap command definitions, the dispatching `App`, and the
//! dialoguer prompts behind the interactive menu shown when the binary is
//! started without arguments.

mod commands;
mod prompts;

pub use commands::*;
pub use prompts::*;
