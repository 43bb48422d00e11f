//! Integration tests for the Calendar MCP Server
//!
//! These tests drive the MCP protocol handling end to end against an
//! in-process double of the Calendar API; they make no real API calls.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use gcal_mcp_server_rust::mcp::server::McpServer;

/// Helper to create a JSON-RPC request
fn make_request(id: i64, method: &str, params: Option<Value>) -> Value {
    let mut request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(p) = params {
        request["params"] = p;
    }
    request
}

/// Send one request and return the response as JSON
async fn call(server: &mut McpServer, request: Value) -> Value {
    let response = server
        .handle_message(&request.to_string())
        .await
        .expect("request should produce a response");
    serde_json::to_value(response).unwrap()
}

/// Invoke a tool and return (text, is_error)
async fn call_tool(server: &mut McpServer, name: &str, arguments: Value) -> (String, bool) {
    let response = call(
        server,
        make_request(1, "tools/call", Some(json!({"name": name, "arguments": arguments}))),
    )
    .await;
    let result = &response["result"];
    (
        result["content"][0]["text"].as_str().unwrap_or_default().to_string(),
        result["isError"].as_bool().unwrap_or(false),
    )
}

async fn server() -> (McpServer, common::TestContext) {
    let ctx = common::setup().await;
    (McpServer::new(Arc::clone(&ctx.client)), ctx)
}

mod mcp_protocol_tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_initialize_advertises_capabilities() {
        let (mut server, _ctx) = server().await;
        let response = call(
            &mut server,
            make_request(1, "initialize", Some(json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            }))),
        )
        .await;

        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        let result = &response["result"];
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "calendar");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["capabilities"]["resources"].is_object());
        assert!(result["capabilities"]["prompts"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (mut server, _ctx) = server().await;
        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(server.handle_message(&notification.to_string()).await.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_ping_and_unknown_method() {
        let (mut server, _ctx) = server().await;

        let response = call(&mut server, make_request(2, "ping", None)).await;
        assert_eq!(response["result"], json!({}));

        let response = call(&mut server, make_request(3, "calendars/delete", None)).await;
        assert_eq!(response["error"]["code"], -32601);
        assert!(response["result"].is_null());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let (mut server, _ctx) = server().await;
        let response = server.handle_message("{not json").await.unwrap();
        let response = serde_json::to_value(response).unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn test_stdio_loop_over_duplex() {
        let (mut server, _ctx) = server().await;
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);

        let task = tokio::spawn(async move {
            server
                .run(BufReader::new(server_read), server_write)
                .await
        });

        let (client_read, mut client_write) = tokio::io::split(client_side);
        let mut lines = BufReader::new(client_read).lines();

        let messages = [
            make_request(1, "initialize", Some(json!({"protocolVersion": "2024-11-05", "capabilities": {}}))),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            make_request(2, "tools/list", None),
        ];
        for message in &messages {
            client_write
                .write_all(format!("{}\n\n", message).as_bytes())
                .await
                .unwrap();
        }

        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"]["tools"].as_array().unwrap().len(), 3);

        // EOF on stdin ends the loop
        client_write.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }
}

mod tool_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_tools_schemas() {
        let (mut server, _ctx) = server().await;
        let response = call(&mut server, make_request(1, "tools/list", None)).await;
        let tools = response["result"]["tools"].as_array().unwrap();

        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["list_events", "create_event", "update_event"]);

        for tool in tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
            assert!(tool["description"].is_string());
        }

        let update = &tools[2]["inputSchema"];
        assert_eq!(update["required"], json!(["event_id"]));
    }

    #[tokio::test]
    async fn test_create_then_list_through_tools() {
        let (mut server, _ctx) = server().await;

        let (text, is_error) = call_tool(
            &mut server,
            "create_event",
            json!({
                "summary": "Planning",
                "start_datetime": "2024-03-04T09:00:00Z",
                "end_datetime": "2024-03-04T10:00:00Z",
                "location": "Room 1",
                "attendees": "a@example.com, b@example.com"
            }),
        )
        .await;
        assert!(!is_error, "{}", text);
        assert!(text.starts_with("Event created successfully!\nEvent ID: evt1\nLink: "));

        let (text, is_error) =
            call_tool(&mut server, "list_events", json!({"date_start": "2024-03-04"})).await;
        assert!(!is_error, "{}", text);
        assert!(text.contains("ID: evt1"));
        assert!(text.contains("Event: Planning"));
        assert!(text.contains("Time: 2024-03-04 09:00 UTC - 2024-03-04 10:00 UTC"));
        assert!(text.contains("Location: Room 1"));
        assert!(text.contains("Attendees: a@example.com, b@example.com"));
    }

    #[tokio::test]
    async fn test_list_inclusive_end_day() {
        let (mut server, ctx) = server().await;
        ctx.seed_event("late", "Late", "2024-03-05T22:00:00Z", "2024-03-05T23:00:00Z");
        ctx.seed_event("after", "After", "2024-03-06T09:00:00Z", "2024-03-06T10:00:00Z");

        let (text, _) = call_tool(
            &mut server,
            "list_events",
            json!({"date_start": "2024-03-04", "date_end": "2024-03-05"}),
        )
        .await;
        assert!(text.contains("ID: late"));
        assert!(!text.contains("ID: after"));
    }

    #[tokio::test]
    async fn test_create_with_inverted_range_reports_error() {
        let (mut server, ctx) = server().await;
        let (text, is_error) = call_tool(
            &mut server,
            "create_event",
            json!({
                "summary": "Backwards",
                "start_datetime": "2024-03-04T10:00:00Z",
                "end_datetime": "2024-03-04T09:00:00Z"
            }),
        )
        .await;
        assert!(is_error);
        assert!(text.starts_with("Error: "));
        assert!(ctx.state.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn test_update_tool() {
        let (mut server, ctx) = server().await;
        ctx.seed_event("evt9", "Old title", "2024-03-04T09:00:00Z", "2024-03-04T10:00:00Z");

        let (text, is_error) = call_tool(
            &mut server,
            "update_event",
            json!({"event_id": "evt9", "summary": "New title"}),
        )
        .await;
        assert!(!is_error, "{}", text);
        assert!(text.starts_with("Event updated successfully!\nEvent ID: evt9"));

        let (text, is_error) = call_tool(
            &mut server,
            "update_event",
            json!({"event_id": "nope", "summary": "x"}),
        )
        .await;
        assert!(is_error);
        assert!(text.contains("Event not found: nope"));
    }

    #[tokio::test]
    async fn test_bad_arguments_and_unknown_tool() {
        let (mut server, _ctx) = server().await;

        let (text, is_error) = call_tool(&mut server, "create_event", json!({"summary": "x"})).await;
        assert!(is_error);
        assert!(text.contains("Invalid arguments"));

        let (text, is_error) = call_tool(&mut server, "delete_event", json!({})).await;
        assert!(is_error);
        assert_eq!(text, "Error: Unknown tool: delete_event");
    }
}

mod resource_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_resources_and_templates() {
        let (mut server, _ctx) = server().await;

        let response = call(&mut server, make_request(1, "resources/list", None)).await;
        let uris: Vec<&str> = response["result"]["resources"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["uri"].as_str())
            .collect();
        assert_eq!(uris, vec!["calendar://events/today", "calendar://events/tomorrow"]);

        let response = call(&mut server, make_request(2, "resources/templates/list", None)).await;
        assert_eq!(
            response["result"]["resourceTemplates"][0]["uriTemplate"],
            "calendar://events/{date}"
        );
    }

    #[tokio::test]
    async fn test_read_day_resource() {
        let (mut server, ctx) = server().await;
        ctx.seed_event("evt1", "Standup", "2024-05-01T09:00:00Z", "2024-05-01T09:15:00Z");

        let response = call(
            &mut server,
            make_request(1, "resources/read", Some(json!({"uri": "calendar://events/2024-05-01"}))),
        )
        .await;
        let content = &response["result"]["contents"][0];
        assert_eq!(content["uri"], "calendar://events/2024-05-01");
        assert_eq!(content["mimeType"], "text/plain");
        assert!(content["text"].as_str().unwrap().contains("Event: Standup"));
    }

    #[tokio::test]
    async fn test_read_empty_day_resource() {
        let (mut server, _ctx) = server().await;
        let response = call(
            &mut server,
            make_request(1, "resources/read", Some(json!({"uri": "calendar://events/2024-05-02"}))),
        )
        .await;
        assert_eq!(response["result"]["contents"][0]["text"], "No events found.");
    }

    #[tokio::test]
    async fn test_read_bad_resource_uri() {
        let (mut server, _ctx) = server().await;

        let response = call(
            &mut server,
            make_request(1, "resources/read", Some(json!({"uri": "calendar://events/someday"}))),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["data"]["kind"], "validation");

        let response = call(
            &mut server,
            make_request(2, "resources/read", Some(json!({"uri": "calendar://nothing"}))),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["data"]["kind"], "protocol");
    }
}

mod prompt_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_get_prompts() {
        let (mut server, _ctx) = server().await;

        let response = call(&mut server, make_request(1, "prompts/list", None)).await;
        let names: Vec<&str> = response["result"]["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert_eq!(names, vec!["today_events", "schedule_meeting"]);

        let response = call(
            &mut server,
            make_request(2, "prompts/get", Some(json!({"name": "today_events"}))),
        )
        .await;
        assert_eq!(
            response["result"]["messages"][0]["content"]["text"],
            "Please show me all of my calendar events for today."
        );

        let response = call(
            &mut server,
            make_request(3, "prompts/get", Some(json!({
                "name": "schedule_meeting",
                "arguments": {"title": "Retro"}
            }))),
        )
        .await;
        let text = response["result"]["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("Title: Retro"));
        assert!(text.contains("Attendees: [Optional list of emails]"));
    }

    #[tokio::test]
    async fn test_unknown_prompt() {
        let (mut server, _ctx) = server().await;
        let response = call(
            &mut server,
            make_request(1, "prompts/get", Some(json!({"name": "weekly_report"}))),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
    }
}
