//! In-process test doubles: MCP providers over `tokio::io::duplex`, a
//! launcher that serves them, and a scripted completion service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::agent_core::completion::{CompletionResponse, CompletionService};
use crate::agent_core::conversation::ConversationMessage;
use crate::inference::errors::InferenceError;
use crate::inference::types::ToolDefinition;
use crate::provider::errors::LaunchError;
use crate::provider::launcher::{LaunchedProvider, Launcher, StderrTail};
use crate::provider::transport::StdioTransport;
use crate::provider::types::{ProviderConfig, RawTool, PROTOCOL_VERSION};

type Reply = Arc<dyn Fn(&str, &Value) -> Option<(String, bool)> + Send + Sync>;

// ─── FakeProvider ────────────────────────────────────────────────────────────

/// A scripted MCP server.
#[derive(Clone)]
pub struct FakeProvider {
    tools: Vec<RawTool>,
    page_size: Option<usize>,
    hang_on_call: bool,
    startup_delay: Duration,
    /// `None` answers with a JSON-RPC "method not found" error.
    reply: Reply,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeProvider {
    fn new(tools: Vec<RawTool>, reply: Reply) -> Self {
        Self {
            tools,
            page_size: None,
            hang_on_call: false,
            startup_delay: Duration::ZERO,
            reply,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Tools `add(a, b)` and `lookup(query)`.
    pub fn calculator() -> Self {
        let tools = vec![
            RawTool {
                name: "add".into(),
                description: "Add two numbers".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["a", "b"]
                }),
            },
            RawTool {
                name: "lookup".into(),
                description: "Look up a constant".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            },
        ];
        Self::new(
            tools,
            Arc::new(|name: &str, args: &Value| match name {
                "add" => Some(add(args)),
                "lookup" => {
                    let query = args.get("query").and_then(|q| q.as_str()).unwrap_or("");
                    Some((format!("found: {query}"), false))
                }
                _ => None,
            }),
        )
    }

    /// Tools with no required arguments; each call answers `<label>:<tool>`.
    pub fn echo(label: &str, tools: &[&str]) -> Self {
        let raw = tools
            .iter()
            .map(|name| RawTool {
                name: name.to_string(),
                description: format!("{label} {name}"),
                input_schema: json!({ "type": "object" }),
            })
            .collect();
        let label = label.to_string();
        let known: Vec<String> = tools.iter().map(|t| t.to_string()).collect();
        Self::new(
            raw,
            Arc::new(move |name: &str, _: &Value| {
                known
                    .iter()
                    .any(|t| t == name)
                    .then(|| (format!("{label}:{name}"), false))
            }),
        )
    }

    /// Return `tools/list` in pages of `size`.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Never answer `tools/call`.
    pub fn hang_on_call(mut self) -> Self {
        self.hang_on_call = true;
        self
    }

    /// Delay the `initialize` reply.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Every `tools/call` received, as `(name, arguments)`.
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, Value)>>> {
        Arc::clone(&self.calls)
    }

    /// Answer requests from `input` on `output` until `input` closes.
    async fn serve(self, input: DuplexStream, mut output: DuplexStream) {
        let mut lines = BufReader::new(input).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            // Notifications carry no id and get no reply.
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let params = msg.get("params").cloned().unwrap_or(Value::Null);

            let reply = match msg["method"].as_str().unwrap_or("") {
                "initialize" => {
                    tokio::time::sleep(self.startup_delay).await;
                    json!({"jsonrpc": "2.0", "id": id, "result": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "fake", "version": "0.0.0" }
                    }})
                }
                "tools/list" => {
                    let start: usize = params["cursor"]
                        .as_str()
                        .and_then(|c| c.parse().ok())
                        .unwrap_or(0);
                    let size = self.page_size.unwrap_or(self.tools.len().max(1));
                    let end = (start + size).min(self.tools.len());
                    let mut result = json!({ "tools": &self.tools[start.min(end)..end] });
                    if end < self.tools.len() {
                        result["nextCursor"] = json!(end.to_string());
                    }
                    json!({"jsonrpc": "2.0", "id": id, "result": result})
                }
                "tools/call" => {
                    let name = params["name"].as_str().unwrap_or("").to_string();
                    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                    self.calls.lock().unwrap().push((name.clone(), args.clone()));
                    if self.hang_on_call {
                        continue;
                    }
                    match (self.reply)(&name, &args) {
                        Some((text, is_error)) => json!({"jsonrpc": "2.0", "id": id, "result": {
                            "content": [{ "type": "text", "text": text }],
                            "isError": is_error
                        }}),
                        None => json!({"jsonrpc": "2.0", "id": id, "error": {
                            "code": -32601,
                            "message": format!("Unknown tool: {name}")
                        }}),
                    }
                }
                other => json!({"jsonrpc": "2.0", "id": id, "error": {
                    "code": -32601,
                    "message": format!("Method not found: {other}")
                }}),
            };

            let mut out = reply.to_string();
            out.push('\n');
            if output.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
    }
}

fn add(args: &Value) -> (String, bool) {
    let (a, b) = (&args["a"], &args["b"]);
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return ((a + b).to_string(), false);
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => ((a + b).to_string(), false),
        _ => ("a and b must be numbers".to_string(), true),
    }
}

// ─── FakeLauncher ────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Behavior {
    Serve(FakeProvider),
    Fail,
    Hang,
}

/// Launches `FakeProvider`s by provider name.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    providers: HashMap<String, Behavior>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, name: &str, provider: FakeProvider) -> Self {
        self.providers
            .insert(name.to_string(), Behavior::Serve(provider));
        self
    }

    /// Spawning `name` fails.
    pub fn fail(mut self, name: &str) -> Self {
        self.providers.insert(name.to_string(), Behavior::Fail);
        self
    }

    /// `name` starts but never answers anything.
    pub fn hang(mut self, name: &str) -> Self {
        self.providers.insert(name.to_string(), Behavior::Hang);
        self
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, config: &ProviderConfig) -> Result<LaunchedProvider, LaunchError> {
        let behavior = match self.providers.get(&config.name) {
            Some(Behavior::Fail) | None => {
                return Err(LaunchError::SpawnFailed {
                    provider: config.name.clone(),
                    reason: "no such provider".into(),
                })
            }
            Some(behavior) => behavior.clone(),
        };

        let (client_out, peer_in) = duplex(64 * 1024);
        let (peer_out, client_in) = duplex(64 * 1024);

        match behavior {
            Behavior::Serve(provider) => {
                tokio::spawn(provider.serve(peer_in, peer_out));
            }
            _ => {
                tokio::spawn(async move {
                    let _peer_out = peer_out;
                    let mut lines = BufReader::new(peer_in).lines();
                    while let Ok(Some(_)) = lines.next_line().await {}
                });
            }
        }

        Ok(LaunchedProvider {
            transport: StdioTransport::new(&config.name, Box::new(client_out), Box::new(client_in)),
            process: None,
            stderr: StderrTail::default(),
        })
    }
}

// ─── ScriptedCompletion ──────────────────────────────────────────────────────

/// A completion service that replays queued responses and records what it
/// was asked.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<CompletionResponse, InferenceError>>>,
    repeat: Option<CompletionResponse>,
    histories: Mutex<Vec<Vec<ConversationMessage>>>,
    offered_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCompletion {
    /// Replay `responses` in order, then fail.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            repeat: None,
            histories: Mutex::new(Vec::new()),
            offered_tools: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `response`.
    pub fn repeating(response: CompletionResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    /// Fail the first call with `error`.
    pub fn failing(error: InferenceError) -> Self {
        let scripted = Self::new(Vec::new());
        scripted.script.lock().unwrap().push_back(Err(error));
        scripted
    }

    /// The history passed to each call.
    pub fn histories(&self) -> Vec<Vec<ConversationMessage>> {
        self.histories.lock().unwrap().clone()
    }

    /// The tool names offered on each call.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.offered_tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResponse, InferenceError> {
        self.histories.lock().unwrap().push(history.to_vec());
        self.offered_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.function.name.clone()).collect());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.repeat
            .clone()
            .ok_or_else(|| InferenceError::MalformedResponse {
                reason: "completion script exhausted".into(),
            })
    }
}
