pub mod commands;
pub mod interactive;

pub use commands::App;
pub use interactive::{handle_line, run_interactive, LineOutcome};
