pub mod deals;
pub mod export;
pub mod fields;
pub mod stages;
mod registry;

pub use deals::{DealsAtRiskTool, ListDealTool};
pub use export::{condition_from_value, AnalyzeExportTool, ExportEntitiesTool};
pub use fields::GetFieldsInfoTool;
pub use registry::{
    json_schema_array, json_schema_integer, json_schema_map, json_schema_object,
    json_schema_string, parse_arguments, Tool, ToolRegistry,
};
pub use stages::{GetStagesTool, StageHistoryTool};

use b24_sdk::BitrixClient;
use std::path::PathBuf;
use std::sync::Arc;

/// Registry with every CRM tool
pub fn default_registry(client: Arc<BitrixClient>, exports_dir: PathBuf) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ListDealTool::new(client.clone())));
    registry.register(Arc::new(DealsAtRiskTool::new(client.clone())));
    registry.register(Arc::new(GetStagesTool::new(client.clone())));
    registry.register(Arc::new(StageHistoryTool::new(client.clone())));
    registry.register(Arc::new(GetFieldsInfoTool::new(client.clone())));
    registry.register(Arc::new(ExportEntitiesTool::new(client, exports_dir.clone())));
    registry.register(Arc::new(AnalyzeExportTool::new(exports_dir)));

    registry
}

#[cfg(test)]
pub(crate) mod test_support {
    use b24_sdk::{BitrixClient, RetryConfig};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Client whose webhook points at the mock server
    pub fn client_for(server: &MockServer) -> Arc<BitrixClient> {
        Arc::new(
            BitrixClient::builder()
                .webhook_url(format!("{}/rest/1/key/", server.uri()))
                .retry_config(RetryConfig::no_retry())
                .build()
                .unwrap(),
        )
    }

    /// Answer every call of a REST method with `{"result": result}`
    pub async fn mount_result(server: &MockServer, rest_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/rest/1/key/{}.json", rest_method)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": result})))
            .mount(server)
            .await;
    }
}
