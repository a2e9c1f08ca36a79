pub mod command_runner;
pub mod types;

// Re-export main types
pub use command_runner::CommandRunner;
pub use types::CommandOutput;
