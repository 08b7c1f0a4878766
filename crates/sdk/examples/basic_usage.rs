//! Basic SDK usage example.
//!
//! Lists the deal funnels of a portal and the open deals of each stage.
//!
//! Run with: WEBHOOK=https://portal.bitrix24.ru/rest/1/secret/ cargo run --example basic_usage

use b24_sdk::{BitrixClient, BitrixResult, EntityKind};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> BitrixResult<()> {
    tracing_subscriber::fmt::init();

    let webhook = std::env::var("WEBHOOK").unwrap_or_default();
    let client = BitrixClient::builder()
        .webhook_url(webhook)
        .timeout(Duration::from_secs(30))
        .page_limit(10)
        .build()?;

    let funnels = client.statuses().all_deal_stages().await?;
    println!("Funnels: {}", funnels.categories.len());
    for stage in &funnels.stages {
        let status_id = stage.get("STATUS_ID").and_then(|v| v.as_str()).unwrap_or("?");
        let name = stage.get("NAME").and_then(|v| v.as_str()).unwrap_or("?");

        let deals = client
            .crm(EntityKind::Deal)
            .list(json!({"STAGE_ID": status_id, "CLOSED": "N"}), &["ID".to_string()])
            .await?;
        println!("  {} ({}): {} open deals", name, status_id, deals.len());
    }

    Ok(())
}
