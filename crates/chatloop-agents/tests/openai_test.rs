use chatloop_agents::{LlmProvider, LlmRequest, OpenAiProvider, StreamContent, ToolDefinition};
use chatloop_common::{ChatMessage, Error};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(messages: Vec<ChatMessage>) -> LlmRequest {
    LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages,
        system: Some("You are a helpful assistant.".to_string()),
        max_tokens: None,
        temperature: None,
        tools: vec![],
    }
}

#[tokio::test]
async fn test_openai_completion() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Hello there!",
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": false,
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let response = provider
        .complete(&request(vec![ChatMessage::user("Hello")]))
        .await
        .unwrap();

    assert_eq!(response.message.content, "Hello there!");
    assert!(!response.message.has_tool_calls());
    assert_eq!(response.stop_reason.as_deref(), Some("stop"));
    assert_eq!(response.usage.map(|u| u.output_tokens), Some(12));
}

#[tokio::test]
async fn test_openai_tool_use() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {
                        "id": "call_abc123",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"query\": \"weather in Boston\"}"
                        }
                    },
                    {
                        "id": "call_def456",
                        "type": "function",
                        "function": {
                            "name": "wikipedia",
                            "arguments": "{\"query\": \"Boston\"}"
                        }
                    }
                ]
            },
            "finish_reason": "tool_calls"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "web_search"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let mut req = request(vec![ChatMessage::user("What is the weather in Boston?")]);
    req.tools.push(ToolDefinition {
        name: "web_search".to_string(),
        description: "Search the web".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            }
        }),
    });

    let response = provider.complete(&req).await.unwrap();

    assert_eq!(response.message.content, "");
    let calls = &response.message.tool_calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_abc123");
    assert_eq!(calls[0].name, "web_search");
    assert_eq!(calls[0].arguments["query"], "weather in Boston");
    assert_eq!(calls[1].name, "wikipedia");
}

#[tokio::test]
async fn test_openai_empty_tool_call_id_gets_positional_id() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-7",
        "model": "local-model",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {
                        "id": "call_kept",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{}"}
                    },
                    {
                        "id": "",
                        "type": "function",
                        "function": {"name": "nope", "arguments": "{}"}
                    }
                ]
            },
            "finish_reason": "tool_calls"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let response = provider
        .complete(&request(vec![ChatMessage::user("Hello")]))
        .await
        .unwrap();

    let ids: Vec<&str> = response
        .message
        .tool_calls
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(ids, ["call_kept", "call_1"]);
    assert!(response.message.validate().is_ok());
}

#[tokio::test]
async fn test_openai_error_status_is_model_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("bad-key".to_string(), Some(mock_server.uri()));
    let err = provider
        .complete(&request(vec![ChatMessage::user("Hello")]))
        .await
        .unwrap_err();

    match err {
        Error::ModelUnavailable(message) => {
            assert!(message.contains("status=401"));
            assert!(message.contains("invalid api key"));
        }
        other => panic!("expected ModelUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_empty_request_model_uses_provider_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider =
        OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri())).with_model("gpt-4o");
    let mut req = request(vec![ChatMessage::user("Hello")]);
    req.model = String::new();

    let response = provider.complete(&req).await.unwrap();
    assert_eq!(response.model, "gpt-4o");
}

#[tokio::test]
async fn test_openai_stream() {
    let mock_server = MockServer::start().await;

    let chunks = [
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}, "finish_reason": null}]
        }),
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": null}]
        }),
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }),
    ];
    let mut body = String::new();
    for chunk in &chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let mut stream = provider
        .complete_stream(&request(vec![ChatMessage::user("Hello")]))
        .await
        .unwrap();

    let mut text = String::new();
    let mut stop_reason = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        if let StreamContent::Text(fragment) = chunk.delta {
            text.push_str(&fragment);
        }
        if chunk.stop_reason.is_some() {
            stop_reason = chunk.stop_reason;
        }
    }

    assert_eq!(text, "Hello");
    assert_eq!(stop_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_openai_stream_tool_call_fragments() {
    let mock_server = MockServer::start().await;

    let body = [
        r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"wikipedia","arguments":""}}]},"finish_reason":null}]}"#,
        r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]},"finish_reason":null}]}"#,
        r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Rust\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        "data: [DONE]",
    ]
    .join("\r\n\r\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let stream = provider
        .complete_stream(&request(vec![ChatMessage::user("Tell me about Rust")]))
        .await
        .unwrap();
    let deltas: Vec<_> = stream.collect().await;

    let mut id = None;
    let mut name = None;
    let mut input = String::new();
    for delta in deltas {
        if let StreamContent::ToolUse(tool) = delta.unwrap().delta {
            assert_eq!(tool.index, 0);
            id = tool.id.or(id);
            name = tool.name.or(name);
            input.push_str(&tool.input);
        }
    }

    assert_eq!(id.as_deref(), Some("call_1"));
    assert_eq!(name.as_deref(), Some("wikipedia"));
    assert_eq!(input, "{\"query\":\"Rust\"}");
}
