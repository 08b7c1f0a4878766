//! Transport layer for the Bitrix24 client.

pub mod http;

pub use http::HttpTransport;
