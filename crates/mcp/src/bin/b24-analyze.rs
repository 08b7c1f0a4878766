// Offline analysis of export files produced by export_entities

use anyhow::{Context, Result};
use b24_core::analysis::render_report;
use b24_core::{analyze, load_export, AnalysisRequest, Operation};
use b24_mcp::tools::condition_from_value;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "b24-analyze")]
#[command(about = "Aggregate a Bitrix24 export file", long_about = None)]
struct Args {
    /// Export file (JSON array of records)
    file_path: PathBuf,

    /// count, sum, avg, min or max
    operation: Operation,

    /// Fields to aggregate, comma separated
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Filter expression, or a JSON object of field equalities
    #[arg(long)]
    condition: Option<String>,

    /// Fields to group by, comma separated
    #[arg(short, long, value_delimiter = ',')]
    group_by: Vec<String>,

    /// Print the raw JSON report
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let condition = match args.condition.as_deref().map(str::trim) {
        Some(raw) if raw.starts_with('{') => {
            let value: Value = serde_json::from_str(raw).context("Invalid JSON condition")?;
            condition_from_value(&value)?
        }
        Some(raw) => condition_from_value(&Value::String(raw.to_string()))?,
        None => None,
    };

    let mut request = AnalysisRequest::new(args.operation);
    if !args.fields.is_empty() {
        request = request.with_fields(args.fields);
    }
    if let Some(condition) = condition {
        request = request.with_condition(condition);
    }
    if !args.group_by.is_empty() {
        request = request.with_group_by(args.group_by);
    }

    let records = load_export(&args.file_path)?;
    let report = analyze(&records, &request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    Ok(())
}
