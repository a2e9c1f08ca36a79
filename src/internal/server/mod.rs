#[allow(clippy::module_inception)]
pub mod server;
pub mod tool;

// Re-export main types
pub use server::create_server;
pub use server::Server;
