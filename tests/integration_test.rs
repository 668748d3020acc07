use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

/// Helper struct to manage the server process with async I/O
struct McpClient {
    child: std::process::Child,
    tx: Sender<Value>,
    rx: Receiver<Value>,
}

impl McpClient {
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_searchcp"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null()) // Suppress log output in tests
            .spawn()
            .expect("Failed to spawn searchcp binary");

        let mut stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = child.stdout.take().expect("Failed to get stdout");

        // Channel for sending requests
        let (req_tx, req_rx) = channel::<Value>();

        // Channel for receiving responses
        let (resp_tx, resp_rx) = channel::<Value>();

        // Thread to write requests to stdin
        thread::spawn(move || {
            while let Ok(request) = req_rx.recv() {
                let request_str = serde_json::to_string(&request).expect("Failed to serialize");
                if writeln!(stdin, "{}", request_str).is_err() {
                    break;
                }
                if stdin.flush().is_err() {
                    break;
                }
            }
        });

        // Thread to read responses from stdout
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&line) {
                            if resp_tx.send(value).is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        McpClient {
            child,
            tx: req_tx,
            rx: resp_rx,
        }
    }

    fn send_request(&self, request: Value) -> Option<Value> {
        self.send_request_with_timeout(request, Duration::from_secs(2))
    }

    fn send_request_with_timeout(&self, request: Value, timeout: Duration) -> Option<Value> {
        self.tx.send(request).ok()?;
        self.rx.recv_timeout(timeout).ok()
    }

    fn send_notification(&self, notification: Value) {
        let _ = self.tx.send(notification);
        // Notifications don't have responses, give the server time to process
        thread::sleep(Duration::from_millis(50));
    }

    fn initialize(&self) {
        let initialize_request = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "id": 1,
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        });
        self.send_request(initialize_request)
            .expect("Failed to get initialize response");
        self.send_notification(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }));
    }

    fn call_tool(&self, id: u64, name: &str, arguments: Value) -> Value {
        self.call_tool_with_timeout(id, name, arguments, Duration::from_secs(2))
    }

    fn call_tool_with_timeout(
        &self,
        id: u64,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": id,
            "params": {"name": name, "arguments": arguments}
        });
        self.send_request_with_timeout(request, timeout)
            .unwrap_or_else(|| panic!("No response for tool {name}"))
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn test_initialize_handshake() {
    let client = McpClient::spawn();

    let initialize_request = json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "id": 1,
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    });

    let response = client
        .send_request(initialize_request)
        .expect("Failed to get initialize response");

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert!(response["result"].is_object());

    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert!(result["capabilities"]["tools"].is_object());
    assert_eq!(result["serverInfo"]["name"], "searchcp");
    assert!(result["serverInfo"]["version"].is_string());

    client.send_notification(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }));
}

#[test]
fn test_tool_discovery() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client
        .send_request(json!({
            "jsonrpc": "2.0",
            "method": "tools/list",
            "id": 2
        }))
        .expect("Failed to get tools/list response");

    assert_eq!(response["id"], 2);
    let tools = response["result"]["tools"]
        .as_array()
        .expect("tools should be an array");
    assert_eq!(tools.len(), 12, "Should have exactly 12 tools");

    let tool_names: Vec<String> = tools
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();

    for expected in [
        "search",
        "quick_search",
        "boolean_search",
        "semantic_search",
        "find_similar",
        "add_document",
        "add_documents",
        "remove_document",
        "record_behavior",
        "update_user_profile",
        "stats",
        "health_check",
    ] {
        assert!(
            tool_names.contains(&expected.to_string()),
            "missing tool {expected}"
        );
    }

    for tool in tools {
        assert!(tool["name"].is_string());
        assert!(tool["description"].is_string());
        assert!(tool["inputSchema"].is_object());
    }
}

#[test]
fn test_search_empty_corpus_returns_empty_with_layer_stats() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "search", json!({"query": "anything"}));
    let result = &response["result"];
    assert!(result["isError"].is_null() || result["isError"] == false);

    let data = &result["structuredContent"]["data"];
    assert_eq!(data["total_count"], 0);
    assert!(data["results"].as_array().unwrap().is_empty());
    for layer in ["layer1", "layer2", "layer3", "layer4"] {
        assert_eq!(data["layer_stats"][layer]["count"], 0, "{layer} count");
    }
}

#[test]
fn test_search_empty_query_is_validation_error() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "search", json!({"query": "   "}));
    let result = &response["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["code"], "SEARCH_ERROR");
    assert_eq!(result["structuredContent"]["field"], "query");
}

#[test]
fn test_boolean_search_unknown_operator_fails() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(
        2,
        "boolean_search",
        json!({"query": "machine deep", "operator": "XOR"}),
    );
    assert_eq!(response["result"]["isError"], true);
}

#[test]
fn test_remove_unknown_document_not_found() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "remove_document", json!({"id": "missing"}));
    let result = &response["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["code"], "REMOVE_DOCUMENT_ERROR");
}

#[test]
fn test_record_behavior_and_profile_roundtrip() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(
        2,
        "record_behavior",
        json!({"user_id": "u1", "action": "click", "data": {"document_id": "d1"}}),
    );
    let result = &response["result"];
    assert!(result["isError"].is_null() || result["isError"] == false);
    let profile = &result["structuredContent"]["profile"];
    assert_eq!(profile["user_id"], "u1");
    assert_eq!(profile["click_history_len"], 1);

    let response = client.call_tool(
        3,
        "record_behavior",
        json!({"user_id": "u1", "action": "hover", "data": {}}),
    );
    assert_eq!(response["result"]["isError"], true);

    let response = client.call_tool(
        4,
        "update_user_profile",
        json!({
            "user_id": "u1",
            "preferences": {"categories": ["technology"], "languages": [], "topics": []}
        }),
    );
    let profile = &response["result"]["structuredContent"]["profile"];
    assert_eq!(profile["preferences"]["categories"][0], "technology");
    // The click recorded earlier must survive the profile upsert
    assert_eq!(profile["click_history_len"], 1);
}

#[test]
fn test_health_check_reports_layers() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "health_check", json!({}));
    let health = &response["result"]["structuredContent"];
    assert_eq!(health["status"], "ok");
    assert!(health["version"].is_string());
    assert!(health["uptime_seconds"].is_number());
    assert_eq!(health["layers"]["lexical"], true);
    assert_eq!(health["layers"]["relevance"], true);
    assert_eq!(health["layers"]["personalization"], true);
    // The embedding model is loaded lazily; nothing has triggered it yet
    assert_eq!(health["layers"]["semantic"], false);
}

#[test]
fn test_stats_empty_corpus() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "stats", json!({}));
    let stats = &response["result"]["structuredContent"]["stats"];
    assert_eq!(stats["layer1"]["document_count"], 0);
    assert_eq!(stats["layer2"]["document_count"], 0);
    assert_eq!(stats["layer3"]["vector_count"], 0);
    assert_eq!(stats["layer4"]["profile_count"], 0);
}

/// End-to-end flow through add_document, quick_search, and boolean_search.
/// Ignored by default: add_document embeds inline, which downloads the
/// embedding model on first run.
#[test]
#[ignore = "downloads the embedding model"]
fn test_add_and_search_end_to_end() {
    let client = McpClient::spawn();
    client.initialize();

    let slow = Duration::from_secs(120);
    let response = client.call_tool_with_timeout(
        2,
        "add_document",
        json!({
            "id": "d1",
            "title": "Machine Learning",
            "content": "algorithms that learn from data"
        }),
        slow,
    );
    assert!(response["result"]["isError"].is_null() || response["result"]["isError"] == false);

    let response = client.call_tool_with_timeout(
        3,
        "add_document",
        json!({
            "id": "d2",
            "title": "Deep Learning",
            "content": "neural networks with multiple layers"
        }),
        slow,
    );
    assert!(response["result"]["isError"].is_null() || response["result"]["isError"] == false);

    // Lexical candidates: both documents contain "learning"
    let response = client.call_tool(4, "quick_search", json!({"query": "learning"}));
    let data = &response["result"]["structuredContent"]["data"];
    assert_eq!(data["total_count"], 2);

    // No document contains both "machine" and "deep"
    let response = client.call_tool(
        5,
        "boolean_search",
        json!({"query": "machine deep", "operator": "AND"}),
    );
    assert_eq!(response["result"]["structuredContent"]["total_count"], 0);

    let response = client.call_tool(
        6,
        "boolean_search",
        json!({"query": "machine deep", "operator": "OR"}),
    );
    assert_eq!(response["result"]["structuredContent"]["total_count"], 2);

    // Full cascade: "neural networks" only matches d2
    let response = client.call_tool_with_timeout(
        7,
        "search",
        json!({"query": "neural networks"}),
        slow,
    );
    let data = &response["result"]["structuredContent"]["data"];
    assert_eq!(data["results"][0]["id"], "d2");
}
