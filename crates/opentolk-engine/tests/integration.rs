//! Integration tests for the opentolk-engine crate: real subprocesses, a
//! one-shot HTTP server and scripted language models driving the Runner.

#![cfg(unix)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use opentolk_adapters::{MailMessage, MailSummary, MemoryMailbox};
use opentolk_agent::{
    ChatModel, ChatRequest, LlmResponse, Role, StreamEvent, TOOL_LIMIT_MESSAGE, TextStream,
    ToolCall,
};
use opentolk_engine::{
    ConversationView, DeliverySink, Engine, EngineError, Outcome, OutputDispatcher, Runner,
    RunnerConfig,
};
use opentolk_kernel::{Match, Router};
use opentolk_plugins::{
    Capability, Manifest, MemorySettingsStore, OutputMode, PermissionStore, PluginRegistry,
    TextFormat, parse_manifest,
};

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

fn manifest(dir: &Path, value: Value) -> Manifest {
    let mut manifest = parse_manifest(&value.to_string()).unwrap();
    manifest.dir = dir.to_path_buf();
    manifest
}

fn inline(id: &str, body: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "trigger": {"type": "keyword", "keywords": [id]},
        "execution": {"type": "script", "inline": body}
    })
}

fn runner(registry: &Arc<PluginRegistry>, data_root: &Path) -> Runner {
    Runner::new(
        Arc::clone(registry),
        RunnerConfig {
            data_root: data_root.to_path_buf(),
            ..RunnerConfig::default()
        },
    )
}

fn write_script(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

async fn complete_text(outcome: Outcome) -> String {
    match outcome {
        Outcome::Complete(result) => result.text,
        Outcome::Stream(_) => panic!("expected a complete result"),
    }
}

/// Replays queued responses and records every request it receives.
#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: &ChatRequest) -> opentolk_agent::Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| LlmResponse::Text("(no more responses)".into())))
    }

    async fn stream(&self, request: &ChatRequest) -> opentolk_agent::Result<TextStream> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(TextStream::from_events(vec![
            StreamEvent::Delta("streamed ".into()),
            StreamEvent::Delta("reply".into()),
            StreamEvent::Done,
        ]))
    }
}

/// Answer one request with `status` and `body`; resolves to the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
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
            if let Some(end) = text.find("\r\n\r\n") {
                let len = text[..end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}"), handle)
}

// ═══════════════════════════════════════════════════════════════════════
//  Script backend
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn script_receives_the_invocation_environment() {
    let plugin_dir = tempfile::tempdir().unwrap();
    let data_root = tempfile::tempdir().unwrap();
    write_script(
        plugin_dir.path(),
        "run.sh",
        "#!/bin/sh\n\
         test -d \"$OPENTOLK_DATA_DIR\" || exit 9\n\
         printf '%s|%s|%s|%s|%s' \"$OPENTOLK_INPUT\" \"$OPENTOLK_RAW_INPUT\" \
         \"$OPENTOLK_TRIGGER\" \"$OPENTOLK_SETTINGS_LANG\" \"$(basename \"$PWD\")\"\n",
    );

    let registry = Arc::new(PluginRegistry::new());
    registry
        .register(manifest(
            plugin_dir.path(),
            json!({
                "id": "com.x.note",
                "name": "Note",
                "trigger": {"type": "keyword", "keywords": ["note"]},
                "execution": {"type": "script", "command": "run.sh"},
                "settings": [{"key": "lang", "default": "en"}]
            }),
        ))
        .unwrap();
    let settings = Arc::new(MemorySettingsStore::new());
    settings.set("com.x.note", "lang", "de");

    let router = Router::from_registry(&registry, None).unwrap();
    let matched = router.route("note buy milk").await.unwrap();
    let outcome = runner(&registry, data_root.path())
        .with_settings(settings)
        .run(matched)
        .await
        .unwrap();

    let dir_name = plugin_dir.path().file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(
        complete_text(outcome).await,
        format!("buy milk|note buy milk|note|de|{dir_name}")
    );
    assert!(data_root.path().join("com.x.note").is_dir());
}

#[tokio::test]
async fn slow_script_times_out_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let sleepy = registry
        .register(manifest(
            dir.path(),
            json!({
                "id": "com.x.sleepy",
                "name": "Sleepy",
                "trigger": {"type": "catch_all"},
                "execution": {"type": "script", "inline": "sleep 5", "timeout": 1}
            }),
        ))
        .unwrap();

    let started = Instant::now();
    let err = runner(&registry, dir.path())
        .run(Match::direct(sleepy, "zzz"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { seconds: 1, .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn required_setting_must_be_present() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let keyed = registry
        .register(manifest(
            dir.path(),
            json!({
                "id": "com.x.keyed",
                "name": "Keyed",
                "trigger": {"type": "catch_all"},
                "execution": {"type": "script", "inline": "echo ok"},
                "settings": [{"key": "api_key", "type": "secret", "required": true}]
            }),
        ))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(keyed, ""))
        .await
        .unwrap_err();
    match err {
        EngineError::MissingRequiredConfig { plugin_id, field } => {
            assert_eq!(plugin_id, "com.x.keyed");
            assert_eq!(field, "api_key");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn undeclared_grant_is_denied_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let mut value = inline("com.x.net", "touch ran");
    value["permissions"] = json!(["network"]);
    let net = registry.register(manifest(dir.path(), value)).unwrap();

    let permissions = Arc::new(PermissionStore::new());
    let err = runner(&registry, dir.path())
        .with_permissions(Arc::clone(&permissions))
        .run(Match::direct(Arc::clone(&net), ""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::PermissionDenied {
            capability: Capability::Network,
            ..
        }
    ));
    assert!(!dir.path().join("ran").exists());

    permissions.grant("com.x.net", Capability::Network);
    runner(&registry, dir.path())
        .with_permissions(permissions)
        .run(Match::direct(net, ""))
        .await
        .unwrap();
}

#[tokio::test]
async fn data_directory_stays_under_the_data_root() {
    let dir = tempfile::tempdir().unwrap();
    let data_root = dir.path().join("data");
    let outside = dir.path().join("outside.dir");
    let mut escaping = manifest(dir.path(), inline("com.x.escape", "touch ran"));
    escaping.id = outside.display().to_string();

    let err = runner(&Arc::new(PluginRegistry::new()), &data_root)
        .run(Match::direct(Arc::new(escaping), ""))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Plugin(_)));
    assert!(!outside.exists());
    assert!(!dir.path().join("ran").exists());
}

// ═══════════════════════════════════════════════════════════════════════
//  Pipelines
// ═══════════════════════════════════════════════════════════════════════

fn pipeline(id: &str, steps: &[&str]) -> Value {
    json!({
        "id": id,
        "name": id,
        "trigger": {"type": "keyword", "keywords": ["chain"]},
        "execution": {
            "type": "pipeline",
            "steps": steps.iter().map(|s| json!({"plugin": s})).collect::<Vec<_>>()
        }
    })
}

#[tokio::test]
async fn pipeline_threads_text_through_installed_steps() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    // Steps are installed but never enabled.
    registry
        .install(manifest(dir.path(), inline("com.x.a", "printf A")))
        .unwrap();
    registry
        .install(manifest(
            dir.path(),
            inline("com.x.b", "sleep 0.2; printf '%sB' \"$OPENTOLK_INPUT\""),
        ))
        .unwrap();
    let chain = registry
        .register(manifest(dir.path(), pipeline("com.x.chain", &["com.x.a", "com.x.b"])))
        .unwrap();

    let outcome = runner(&registry, dir.path())
        .run(Match::direct(chain, "ignored"))
        .await
        .unwrap();
    match outcome {
        Outcome::Complete(result) => {
            assert_eq!(result.text, "AB");
            assert_eq!(result.mode, None);
        }
        Outcome::Stream(_) => panic!("pipelines never stream"),
    }
}

#[tokio::test]
async fn pipeline_with_unknown_step_names_it() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let chain = registry
        .register(manifest(dir.path(), pipeline("com.x.chain", &["com.x.ghost"])))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(chain, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PipelineTargetNotFound { ref id } if id == "com.x.ghost"));
}

#[tokio::test]
async fn failing_step_aborts_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    registry
        .install(manifest(dir.path(), inline("com.x.ok", "printf fine")))
        .unwrap();
    registry
        .install(manifest(dir.path(), inline("com.x.bad", "echo nope >&2; exit 3")))
        .unwrap();
    registry
        .install(manifest(dir.path(), inline("com.x.after", "touch after-ran")))
        .unwrap();
    let chain = registry
        .register(manifest(
            dir.path(),
            pipeline("com.x.chain", &["com.x.ok", "com.x.bad", "com.x.after"]),
        ))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(chain, ""))
        .await
        .unwrap_err();
    match &err {
        EngineError::PipelineStepFailed {
            pipeline_id, step, ..
        } => {
            assert_eq!(pipeline_id, "com.x.chain");
            assert_eq!(*step, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        err.root_cause(),
        EngineError::ProcessFailed { exit_code: 3, .. }
    ));
    assert!(!dir.path().join("after-ran").exists());
}

#[tokio::test]
async fn self_referencing_pipeline_hits_the_depth_limit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let ouroboros = registry
        .register(manifest(dir.path(), pipeline("com.x.loop", &["com.x.loop"])))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(ouroboros, ""))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), EngineError::RecursionLimit { .. }));
}

#[tokio::test]
async fn max_depth_counts_nesting_levels() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    registry
        .install(manifest(dir.path(), inline("com.x.leaf", "printf leaf")))
        .unwrap();
    registry
        .install(manifest(dir.path(), pipeline("com.x.inner", &["com.x.leaf"])))
        .unwrap();
    let outer = registry
        .register(manifest(dir.path(), pipeline("com.x.outer", &["com.x.inner"])))
        .unwrap();
    let limited = |max_depth| {
        Runner::new(
            Arc::clone(&registry),
            RunnerConfig {
                data_root: dir.path().to_path_buf(),
                max_depth,
                ..RunnerConfig::default()
            },
        )
    };

    let outcome = limited(3)
        .run(Match::direct(Arc::clone(&outer), ""))
        .await
        .unwrap();
    assert_eq!(complete_text(outcome).await, "leaf");

    let err = limited(2)
        .run(Match::direct(outer, ""))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), EngineError::RecursionLimit { depth: 2 }));
}

// ═══════════════════════════════════════════════════════════════════════
//  HTTP backend
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn http_backend_templates_the_request_and_extracts_the_path() {
    let (base, request) = serve_once("200 OK", r#"{"data":{"items":[{"text":"hola"}]}}"#).await;
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let translate = registry
        .register(manifest(
            dir.path(),
            json!({
                "id": "com.x.http",
                "name": "Http",
                "trigger": {"type": "catch_all"},
                "execution": {
                    "type": "http",
                    "url": format!("{base}/translate?to={{{{settings.lang}}}}"),
                    "headers": {"X-Lang": "{{settings.lang}}"},
                    "body": {"q": "{{input}}", "n": 1},
                    "response_path": "data.items[0].text"
                },
                "settings": [{"key": "lang", "default": "es"}]
            }),
        ))
        .unwrap();

    let outcome = runner(&registry, dir.path())
        .run(Match::direct(translate, "hello"))
        .await
        .unwrap();
    assert_eq!(complete_text(outcome).await, "hola");

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /translate?to=es "));
    assert!(raw.to_ascii_lowercase().contains("x-lang: es"));
    assert!(raw.contains(r#""q":"hello""#));
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let (base, _request) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let http = registry
        .register(manifest(
            dir.path(),
            json!({
                "id": "com.x.http",
                "name": "Http",
                "trigger": {"type": "catch_all"},
                "execution": {"type": "http", "url": base, "method": "get"}
            }),
        ))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(http, ""))
        .await
        .unwrap_err();
    match err {
        EngineError::HttpFailed { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("down"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  AI backend
// ═══════════════════════════════════════════════════════════════════════

fn ai(id: &str, execution: Value) -> Value {
    let mut execution = execution;
    execution["type"] = json!("ai");
    json!({
        "id": id,
        "name": id,
        "trigger": {"type": "catch_all"},
        "execution": execution,
        "settings": [{"key": "tone", "default": "formal"}]
    })
}

#[tokio::test]
async fn ai_without_a_model_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let chat = registry
        .register(manifest(dir.path(), ai("com.x.ai", json!({"system_prompt": "Hi"}))))
        .unwrap();

    let err = runner(&registry, dir.path())
        .run(Match::direct(chat, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingRequiredConfig { ref field, .. } if field == "llm"));
}

#[tokio::test]
async fn ai_chat_resolves_prompt_file_and_model() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("prompt.md"), "Be {{settings.tone}}.").unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let chat = registry
        .register(manifest(
            dir.path(),
            ai(
                "com.x.ai",
                json!({"system_prompt_file": "prompt.md", "model": "small", "temperature": 0.2}),
            ),
        ))
        .unwrap();
    let model = ScriptedModel::new(vec![LlmResponse::Text("Good day.".into())]);

    let runner = runner(&registry, dir.path()).with_llm(model.clone());
    let outcome = runner.run(Match::direct(chat, "hey")).await.unwrap();
    assert_eq!(complete_text(outcome).await, "Good day.");
    assert!(runner.history().read("com.x.ai").await.is_empty());

    let request = &model.requests()[0];
    assert_eq!(request.model, "small");
    assert_eq!(request.temperature, Some(0.2));
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, "Be formal.");
    assert_eq!(request.messages[1].content, "hey");
}

#[tokio::test]
async fn conversational_stream_records_both_turns() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let chat = registry
        .register(manifest(
            dir.path(),
            ai("com.x.chat", json!({"system_prompt": "Chat.", "conversational": true})),
        ))
        .unwrap();
    let model = ScriptedModel::new(Vec::new());
    let runner = runner(&registry, dir.path()).with_llm(model.clone());

    let first = runner
        .run(Match::direct(Arc::clone(&chat), "hello"))
        .await
        .unwrap();
    assert!(first.is_stream());
    assert_eq!(first.into_text().await.unwrap(), "streamed reply");

    let history = runner.history().read("com.x.chat").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].content, "streamed reply");

    // The second turn sees the first one.
    runner
        .run(Match::direct(chat, "again"))
        .await
        .unwrap()
        .into_text()
        .await
        .unwrap();
    let second = &model.requests()[1];
    let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Chat.", "hello", "streamed reply", "again"]);
}

#[tokio::test]
async fn pipeline_drains_a_streaming_step_before_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    registry
        .install(manifest(
            dir.path(),
            ai("com.x.talk", json!({"system_prompt": "Talk.", "streaming": true})),
        ))
        .unwrap();
    registry
        .install(manifest(
            dir.path(),
            inline("com.x.shout", "printf '%s!' \"$OPENTOLK_INPUT\""),
        ))
        .unwrap();
    let chain = registry
        .register(manifest(dir.path(), pipeline("com.x.chain", &["com.x.talk", "com.x.shout"])))
        .unwrap();
    let model = ScriptedModel::new(Vec::new());

    let outcome = runner(&registry, dir.path())
        .with_llm(model.clone())
        .run(Match::direct(chain, "hi"))
        .await
        .unwrap();
    assert!(!outcome.is_stream());
    assert_eq!(complete_text(outcome).await, "streamed reply!");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn tool_loop_runs_process_tools_and_nested_plugins_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "echo_args.sh",
        "#!/bin/sh\nprintf '%s|%s|' \"$OPENTOLK_TOOL_NAME\" \"$OPENTOLK_TOOL_ARGS\"\ncat\n",
    );
    let registry = Arc::new(PluginRegistry::new());
    registry
        .install(manifest(
            dir.path(),
            inline("com.x.suffix", "printf '%s!' \"$OPENTOLK_INPUT\""),
        ))
        .unwrap();
    let agent = registry
        .register(manifest(
            dir.path(),
            ai(
                "com.x.agent",
                json!({
                    "system_prompt": "Use tools.",
                    "tools": [
                        {"type": "process", "name": "echo_args", "command": "echo_args.sh"},
                        {"type": "builtin", "name": "run_plugin"},
                        {"type": "builtin", "name": "web_search"}
                    ]
                }),
            ),
        ))
        .unwrap();

    let model = ScriptedModel::new(vec![
        LlmResponse::ToolCalls(vec![
            ToolCall {
                id: "c1".into(),
                name: "echo_args".into(),
                arguments: json!({"x": 1}),
            },
            ToolCall {
                id: "c2".into(),
                name: "run_plugin".into(),
                arguments: json!({"plugin": "com.x.suffix", "input": "wow"}),
            },
            ToolCall {
                id: "c3".into(),
                name: "web_search".into(),
                arguments: json!({"query": "rust"}),
            },
        ]),
        LlmResponse::Text("all done".into()),
    ]);

    let outcome = runner(&registry, dir.path())
        .with_llm(model.clone())
        .run(Match::direct(agent, "go"))
        .await
        .unwrap();
    assert_eq!(complete_text(outcome).await, "all done");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let tool_names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tool_names, vec!["echo_args", "run_plugin", "web_search"]);

    let results: Vec<&str> = requests[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], r#"echo_args|{"x":1}|{"x":1}"#);
    assert_eq!(results[1], "wow!");
    // web_search needs the network capability declared on the manifest.
    assert!(results[2].starts_with("Error:"));
    assert!(results[2].contains("network"));
}

#[tokio::test]
async fn tool_loop_stops_at_the_round_cap() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let mut value = ai(
        "com.x.mail",
        json!({"system_prompt": "Mail.", "tools": [{"type": "builtin", "name": "mail_list"}]}),
    );
    value["permissions"] = json!(["mail"]);
    let agent = registry.register(manifest(dir.path(), value)).unwrap();

    let mailbox = Arc::new(MemoryMailbox::new());
    mailbox.deliver(MailMessage {
        summary: MailSummary {
            id: "m1".into(),
            from: "ana@example.com".into(),
            subject: "Lunch".into(),
            date: chrono::Utc::now(),
            unread: true,
        },
        to: vec!["me@example.com".into()],
        body: "Noon?".into(),
    });

    let call = || {
        LlmResponse::ToolCalls(vec![ToolCall {
            id: "again".into(),
            name: "mail_list".into(),
            arguments: json!({}),
        }])
    };
    let model = ScriptedModel::new((0..20).map(|_| call()).collect());

    let outcome = runner(&registry, dir.path())
        .with_llm(model.clone())
        .with_mailbox(mailbox)
        .run(Match::direct(agent, "check mail"))
        .await
        .unwrap();
    assert_eq!(complete_text(outcome).await, TOOL_LIMIT_MESSAGE);

    let requests = model.requests();
    assert_eq!(requests.len(), 10);
    let last_tool = requests[9]
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(last_tool.content.contains("Lunch"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Collect(Mutex<Vec<String>>);

#[async_trait]
impl DeliverySink for Collect {
    async fn deliver(&self, text: &str, _format: TextFormat) -> opentolk_engine::Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct NoView;

#[async_trait]
impl ConversationView for NoView {
    async fn begin(&self, _plugin_id: &str) {}
    async fn delta(&self, _text: &str) {}
    async fn finish(&self, _text: &str) {}
    async fn fail(&self, _reason: &str) {}
}

#[tokio::test]
async fn engine_routes_runs_and_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::new());
    let mut value = inline("com.x.upper", "printf '%s' \"$OPENTOLK_INPUT\" | tr a-z A-Z");
    value["trigger"] = json!({"type": "keyword", "keywords": ["upper"]});
    value["output"] = json!({"mode": "clipboard", "side_effects": ["store"]});
    registry.register(manifest(dir.path(), value)).unwrap();

    let clipboard = Arc::new(Collect::default());
    let store = Arc::new(Collect::default());
    let dispatcher = OutputDispatcher::new(Arc::new(NoView))
        .with_sink(OutputMode::Clipboard, clipboard.clone())
        .with_sink(OutputMode::Store, store.clone());
    let engine = Engine::new(
        Router::from_registry(&registry, None).unwrap(),
        runner(&registry, dir.path()),
        dispatcher,
    );

    let delivery = engine.handle("upper make me loud").await.unwrap().unwrap();
    assert_eq!(delivery.text, "MAKE ME LOUD");
    assert_eq!(delivery.mode, OutputMode::Clipboard);
    assert_eq!(*clipboard.0.lock().unwrap(), vec!["MAKE ME LOUD"]);
    assert_eq!(*store.0.lock().unwrap(), vec!["MAKE ME LOUD"]);

    assert!(engine.handle("nothing matches this").await.unwrap().is_none());
}
