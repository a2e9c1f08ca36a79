pub mod cli;
pub mod internal;

// Re-export commonly used types
pub use internal::config::AppConfig;
pub use internal::rpc::Dispatcher;
pub use internal::server::Server;
