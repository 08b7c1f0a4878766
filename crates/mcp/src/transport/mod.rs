// MCP transports: newline-delimited stdio and streamable HTTP

pub mod http;
pub mod stdio;

pub use http::{router, HttpTransport};
pub use stdio::StdioTransport;
