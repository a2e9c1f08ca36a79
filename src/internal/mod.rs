pub mod client;
pub mod config;
pub mod logger;
pub mod mcp;
pub mod rpc;
pub mod runner;
pub mod server;
pub mod transport;
