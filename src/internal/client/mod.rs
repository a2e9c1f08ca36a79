#[allow(clippy::module_inception)]
pub mod client;

pub use client::McpClient;
