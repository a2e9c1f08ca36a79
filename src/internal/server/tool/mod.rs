pub mod handler;
pub mod params;

pub use handler::{ToolExecutor, ToolHandler};
pub use params::{RunTestsParams, ShowCoverageParams};
