// MCP (Model Context Protocol) server exposing Bitrix24 CRM tools
// to agent clients over stdio or streamable HTTP.

pub mod config;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use server::McpServer;

/// MCP protocol revision spoken by the server
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Name announced in `serverInfo`
pub const SERVER_NAME: &str = "bitrix24";

/// Crate version announced in `serverInfo`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
