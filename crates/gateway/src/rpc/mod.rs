pub mod dispatcher;
pub mod stdio;

pub use dispatcher::{GatewayHandle, McpDispatcher};
