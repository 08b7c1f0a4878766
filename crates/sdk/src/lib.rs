//! # b24-sdk
//!
//! Async client for the Bitrix24 REST API over an incoming webhook.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use b24_sdk::{BitrixClient, BitrixResult, EntityKind};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> BitrixResult<()> {
//!     let client = BitrixClient::builder()
//!         .webhook_url("https://portal.bitrix24.ru/rest/1/secret/")
//!         .build()?;
//!
//!     let deals = client
//!         .crm(EntityKind::Deal)
//!         .list(json!({"CLOSED": "N"}), &[])
//!         .await?;
//!     println!("Found {} open deals", deals.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! List calls follow the `next` offset of every page, so they return the
//! whole result set unless [`ClientConfig::page_limit`] caps it. Requests
//! rejected with `QUERY_LIMIT_EXCEEDED` or a 5xx status are retried with
//! exponential backoff.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use api::{DealStages, EntityKind};
pub use client::{BitrixClient, BitrixClientBuilder};
pub use config::{ClientConfig, RetryConfig};
pub use error::{BitrixError, BitrixResult};

// Re-export the record type every list call returns
pub use b24_core::Record;
