use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Sample rate the stub speaks at; one character lasts `CHAR_MS`.
pub const SAMPLE_RATE: u32 = 1000;
pub const CHAR_MS: u64 = 50;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum StreamBehavior {
    Speak,
    Fail(&'static str),
    Reject,
}

#[derive(Debug, Clone)]
pub struct ProviderStubConfig {
    pub remaining_quota: i64,
    pub known_voices: Vec<String>,
    pub behavior: StreamBehavior,
}

impl Default for ProviderStubConfig {
    fn default() -> Self {
        Self {
            remaining_quota: 100_000,
            known_voices: vec!["voice-1".to_owned()],
            behavior: StreamBehavior::Speak,
        }
    }
}

/// Local stand-in for the speech provider: REST on tiny_http, streaming on a websocket task.
pub struct ProviderStub {
    pub api_url: String,
    pub ws_url: String,
    spoken: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    ws_task: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl ProviderStub {
    pub async fn spawn(config: ProviderStubConfig) -> Self {
        let (api_url, shutdown_tx, handle) = spawn_rest(config.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind websocket stub");
        let ws_url = format!("ws://{}", listener.local_addr().expect("websocket addr"));
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let ws_task = tokio::spawn({
            let spoken = Arc::clone(&spoken);
            let behavior = config.behavior.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let spoken = Arc::clone(&spoken);
                    let behavior = behavior.clone();
                    tokio::spawn(async move {
                        serve_stream(stream, behavior, spoken).await;
                    });
                }
            }
        });

        Self {
            api_url,
            ws_url,
            spoken,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            ws_task,
        }
    }

    /// Texts received over the websocket, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken lock").clone()
    }
}

impl Drop for ProviderStub {
    fn drop(&mut self) {
        self.ws_task.abort();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_rest(config: ProviderStubConfig) -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start provider stub server");
    let api_url = format!("http://{}", server.server_addr());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let path = request.url().to_string();
            let body = if path == "/v1/user/subscription" {
                Some(serde_json::json!({
                    "character_count": 1_000_000 - config.remaining_quota,
                    "character_limit": 1_000_000,
                }))
            } else if let Some(id) = path.strip_prefix("/v1/voices/") {
                config
                    .known_voices
                    .iter()
                    .any(|known| known == id)
                    .then(|| serde_json::json!({ "voice_id": id, "name": format!("Stub {id}") }))
            } else {
                None
            };

            let response = match body {
                Some(body) => tiny_http::Response::from_string(body.to_string())
                    .with_status_code(200)
                    .with_header(
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .expect("build header"),
                    ),
                None => tiny_http::Response::from_string("not found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    (api_url, shutdown_tx, handle)
}

async fn serve_stream(
    stream: tokio::net::TcpStream,
    behavior: StreamBehavior,
    spoken: Arc<Mutex<Vec<String>>>,
) {
    let reject = matches!(behavior, StreamBehavior::Reject);
    let callback = move |_: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if reject {
            let denied = tokio_tungstenite::tungstenite::http::Response::builder()
                .status(403)
                .body(Some("forbidden".to_owned()))
                .expect("build rejection");
            return Err(denied);
        }
        Ok(response)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let mut text = None;
    while let Some(Ok(message)) = ws.next().await {
        let Ok(payload) = message.to_text() else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        let part = value.get("text").and_then(Value::as_str).unwrap_or_default();
        if part.is_empty() {
            break;
        }
        text = Some(part.to_owned());
    }
    let text = text.unwrap_or_default();
    spoken.lock().expect("spoken lock").push(text.clone());

    let replies = match behavior {
        StreamBehavior::Fail(code) => vec![serde_json::json!({
            "error": code,
            "message": format!("stub failure: {code}"),
        })],
        _ => speech_replies(&text),
    };
    for reply in replies {
        if ws.send(Message::text(reply.to_string())).await.is_err() {
            return;
        }
    }
    let _ = ws.close(None).await;
}

fn speech_replies(text: &str) -> Vec<Value> {
    let chars = text.chars().map(String::from).collect::<Vec<_>>();
    let n = chars.len() as u64;
    let samples = (n * CHAR_MS * u64::from(SAMPLE_RATE) / 1000) as usize;
    let pcm = vec![0u8; samples * 2];
    vec![
        serde_json::json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(pcm),
            "alignment": {
                "chars": chars,
                "charStartTimesMs": (0..n).map(|i| i * CHAR_MS).collect::<Vec<_>>(),
                "charDurationsMs": vec![CHAR_MS; n as usize],
            },
            "isFinal": null,
        }),
        serde_json::json!({ "audio": null, "alignment": null, "isFinal": true }),
    ]
}
