//! Full-stack gateway flows: local catalog + aggregated upstreams
//! behind one JSON-RPC dispatcher.

use std::io::Write;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tg_domain::config::{Config, GatewayUpstream};
use tg_gateway::bootstrap::build_state;
use tg_gateway::state::AppState;
use tg_mcp::protocol::{JsonRpcRequest, JsonRpcResponse};

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

async fn mount_upstream(server: &MockServer, tools: Value) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(rpc_result(json!({ "capabilities": { "tools": {} } })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_result(json!({ "tools": tools })))
        .mount(server)
        .await;
}

async fn state_with_upstream(server: &MockServer) -> (AppState, tempfile::NamedTempFile) {
    let policy = {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{ "whitelist": [{ "operation_id": "echo" }] }"#)
            .unwrap();
        file.flush().unwrap();
        file
    };

    let mut config = Config::default();
    config.policy.path = Some(policy.path().to_path_buf());
    config.gateway.upstreams = vec![GatewayUpstream {
        name: "files".into(),
        endpoint: format!("{}/mcp", server.uri()),
        prefix: "fs".into(),
        enabled: true,
        auth_token_env: None,
        timeout_ms: None,
    }];
    config.gateway.per_upstream_timeout_ms = 500;

    let state = build_state(Arc::new(config)).await.unwrap();
    // The server normally does the initial build in a background task.
    state
        .gateway
        .as_ref()
        .unwrap()
        .rebuild(&CancellationToken::new())
        .await;
    (state, policy)
}

async fn dispatch(state: &AppState, request: Value) -> JsonRpcResponse {
    let request: JsonRpcRequest = serde_json::from_value(request).unwrap();
    state
        .dispatcher
        .dispatch(request, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn tools_list_merges_local_and_gateway_tools() {
    let server = MockServer::start().await;
    mount_upstream(
        &server,
        json!([{ "name": "read_file", "description": "Read a file" }]),
    )
    .await;
    let (state, _policy) = state_with_upstream(&server).await;

    let response = dispatch(&state, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })).await;
    let tools = response.into_result().unwrap()["tools"].clone();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"echo"), "{names:?}");
    assert!(names.contains(&"fs.read_file"), "{names:?}");
}

#[tokio::test]
async fn gateway_tool_call_routes_to_upstream() {
    let server = MockServer::start().await;
    mount_upstream(&server, json!([{ "name": "read_file" }])).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": { "name": "read_file" }
        })))
        .respond_with(rpc_result(json!({
            "content": [{ "type": "text", "text": "file contents" }],
            "isError": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (state, _policy) = state_with_upstream(&server).await;
    let response = dispatch(
        &state,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "fs.read_file", "arguments": { "path": "/tmp/x" } }
        }),
    )
    .await;

    let result = response.into_result().unwrap();
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["text"], "file contents");
}

#[tokio::test]
async fn unknown_gateway_tool_is_denied() {
    let server = MockServer::start().await;
    mount_upstream(&server, json!([{ "name": "read_file" }])).await;
    let (state, _policy) = state_with_upstream(&server).await;

    let response = dispatch(
        &state,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": { "name": "fs.write_file" }
        }),
    )
    .await;

    let error = response.error.unwrap();
    assert_eq!(error.code, -32001);
    assert!(error.message.contains("not found or not allowed"));
}
