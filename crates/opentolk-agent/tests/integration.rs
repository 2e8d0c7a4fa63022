//! Integration tests for the opentolk-agent crate.
//!
//! The HTTP client is exercised against a one-shot local server that
//! answers a single request with a canned response.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use opentolk_agent::{
    ChatModel, ChatRequest, ConversationHistory, LlmClient, LlmClientConfig, LlmResponse, Message,
    StreamEvent,
};

/// Serve exactly one HTTP request; the raw request text is sent back
/// through the returned receiver.
async fn serve_once(
    status: &'static str,
    content_type: &'static str,
    body: String,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });

    (format!("http://{addr}/v1"), rx)
}

fn client(base_url: &str) -> LlmClient {
    LlmClient::new(LlmClientConfig::openai_compatible("test-key", "test-model", base_url)).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Chat completions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chat_returns_text_and_sends_bearer_auth() {
    let body = r#"{"choices":[{"message":{"role":"assistant","content":"pong"}}]}"#.to_string();
    let (base_url, request_rx) = serve_once("200 OK", "application/json", body).await;

    let request = ChatRequest::new("", vec![Message::user("ping")]);
    let response = client(&base_url).chat(&request).await.unwrap();

    match response {
        LlmResponse::Text(text) => assert_eq!(text, "pong"),
        other => panic!("expected Text, got {other:?}"),
    }

    let raw = request_rx.await.unwrap();
    assert!(raw.starts_with("POST /v1/chat/completions"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer test-key"));
    assert!(raw.contains(r#""model":"test-model""#));
}

#[tokio::test]
async fn chat_surfaces_api_errors() {
    let (base_url, _rx) = serve_once(
        "429 Too Many Requests",
        "application/json",
        r#"{"error":{"message":"slow down"}}"#.to_string(),
    )
    .await;

    let request = ChatRequest::new("", vec![Message::user("ping")]);
    let err = client(&base_url).chat(&request).await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Streaming
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stream_yields_deltas_then_done() {
    let sse = [
        r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
        "data: [DONE]",
    ]
    .map(|line| format!("{line}\n\n"))
    .concat();
    let (base_url, request_rx) = serve_once("200 OK", "text/event-stream", sse).await;

    let request = ChatRequest::new("", vec![Message::user("hi")]);
    let mut stream = client(&base_url).stream(&request).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("Hel".into()),
            StreamEvent::Delta("lo".into()),
            StreamEvent::Done,
        ]
    );
    assert!(request_rx.await.unwrap().contains(r#""stream":true"#));
}

#[tokio::test]
async fn stream_collects_to_text() {
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\ndata: [DONE]\n\n".to_string();
    let (base_url, _rx) = serve_once("200 OK", "text/event-stream", sse).await;

    let request = ChatRequest::new("", vec![Message::user("hi")]);
    let stream = client(&base_url).stream(&request).await.unwrap();
    assert_eq!(stream.collect_text().await.unwrap(), "A");
}

// ═══════════════════════════════════════════════════════════════════════
//  History
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn history_is_isolated_per_plugin() {
    let history = ConversationHistory::with_limits(Duration::from_secs(60), 4, 10);
    history.append("com.a.chat", Message::user("a")).await;
    history.append("com.b.chat", Message::user("b")).await;
    history.clear("com.a.chat").await;

    assert!(history.read("com.a.chat").await.is_empty());
    assert_eq!(history.read("com.b.chat").await[0].content, "b");
}
