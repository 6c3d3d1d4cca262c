#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

pub struct LspTestHarness {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    next_id: u64,
}

const BIN: &str = env!("CARGO_BIN_EXE_aiderdesk-connector");

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

/// `serve` arguments for a connector talking to AiderDesk on `port`.
fn serve_args(port: u16, log_name: &str) -> Vec<String> {
    let log_file: PathBuf = std::env::temp_dir().join(format!("{log_name}-{port}.log"));
    vec![
        "serve".to_string(),
        "--host".to_string(),
        "127.0.0.1".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--log-file".to_string(),
        log_file.to_string_lossy().into_owned(),
    ]
}

impl LspTestHarness {
    /// Start `aiderdesk-connector serve` in standalone mode against `port`.
    pub fn spawn(port: u16) -> Self {
        Self::spawn_with_args(&serve_args(port, "aiderdesk-connector-test"))
    }

    /// Start the connector in proxy mode, wrapping a second, inert connector
    /// as the language server.
    pub fn spawn_wrapping(port: u16) -> Self {
        let mut args = serve_args(port, "aiderdesk-connector-proxy");
        args.push("--".to_string());
        args.push(BIN.to_string());
        args.extend(serve_args(closed_port(), "aiderdesk-connector-wrapped"));
        Self::spawn_with_args(&args)
    }

    fn spawn_with_args(args: &[String]) -> Self {
        let mut child = Command::new(BIN)
            .args(args)
            .env("RUST_LOG", "aiderdesk_connector=debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn aiderdesk-connector");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);

        Self {
            child: Some(child),
            stdin,
            stdout,
            next_id: 1,
        }
    }

    pub fn send(&mut self, content: &str) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin closed"))?;
        let msg = format!("Content-Length: {}\r\n\r\n{}", content.len(), content);
        stdin.write_all(msg.as_bytes())?;
        stdin.flush()
    }

    pub fn read_response(&mut self) -> Option<String> {
        let stdout = self.stdout.as_mut()?;

        let mut header = String::new();
        stdout.read_line(&mut header).ok()?;

        let len: usize = header
            .trim()
            .strip_prefix("Content-Length:")?
            .trim()
            .parse()
            .ok()?;

        // Skip any further headers up to the blank line
        loop {
            let mut line = String::new();
            stdout.read_line(&mut line).ok()?;
            if line.trim().is_empty() {
                break;
            }
        }

        let mut body = vec![0u8; len];
        std::io::Read::read_exact(stdout, &mut body).ok()?;

        String::from_utf8(body).ok()
    }

    fn request(&mut self, method: &str, params: &Value) -> Option<String> {
        let id = self.next_id;
        self.next_id += 1;
        let msg = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send(&msg.to_string()).ok()?;
        self.read_response()
    }

    fn notify(&mut self, method: &str, params: &Value) {
        let msg = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params});
        let _ = self.send(&msg.to_string());
    }

    pub fn initialize(&mut self, workspace_uri: &str) -> Option<String> {
        let params = serde_json::json!({
            "processId": 1234,
            "capabilities": {},
            "rootUri": workspace_uri,
            "workspaceFolders": [{"uri": workspace_uri, "name": "workspace"}],
        });
        self.request("initialize", &params)
    }

    pub fn initialized(&mut self) {
        self.notify("initialized", &serde_json::json!({}));
    }

    pub fn did_open(&mut self, uri: &str) {
        let params = serde_json::json!({
            "textDocument": {"uri": uri, "languageId": "typescript", "version": 1, "text": ""}
        });
        self.notify("textDocument/didOpen", &params);
    }

    pub fn did_close(&mut self, uri: &str) {
        self.notify("textDocument/didClose", &serde_json::json!({"textDocument": {"uri": uri}}));
    }

    pub fn shutdown(&mut self) -> Option<String> {
        let response = self.request("shutdown", &Value::Null);
        self.notify("exit", &Value::Null);
        response
    }

    /// Wait for the process to exit on its own.
    pub fn wait_for_exit(&mut self, within: Duration) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = child.try_wait() {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        None
    }
}

impl Drop for LspTestHarness {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill();
        }
    }
}

const OPEN: &str = r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Socket.IO server standing in for AiderDesk. Collects every payload
/// emitted on the `message` channel.
pub struct FakeAiderDesk {
    pub port: u16,
    messages: mpsc::UnboundedReceiver<Value>,
    closes: mpsc::UnboundedReceiver<()>,
    kick: broadcast::Sender<()>,
}

impl FakeAiderDesk {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (tx, messages) = mpsc::unbounded_channel();
        let (close_tx, closes) = mpsc::unbounded_channel();
        let (kick, _) = broadcast::channel(4);

        let kick_tx = kick.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(
                    stream,
                    tx.clone(),
                    close_tx.clone(),
                    kick_tx.subscribe(),
                ));
            }
        });

        Self {
            port,
            messages,
            closes,
            kick,
        }
    }

    pub async fn next_message(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(5), self.messages.recv())
            .await
            .ok()
            .flatten()
    }

    /// True if nothing arrives within `within`.
    pub async fn stays_quiet(&mut self, within: Duration) -> bool {
        tokio::time::timeout(within, self.messages.recv()).await.is_err()
    }

    /// True once a client has sent a WebSocket close frame.
    pub async fn closed_cleanly(&mut self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), self.closes.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }

    /// Server-side disconnect of every connected client.
    pub fn disconnect_clients(&self) {
        let _ = self.kick.send(());
    }
}

async fn serve_client(
    stream: TcpStream,
    tx: mpsc::UnboundedSender<Value>,
    close_tx: mpsc::UnboundedSender<()>,
    mut kick: broadcast::Receiver<()>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    if ws.send(Message::Text(OPEN.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !handle_frame(&mut ws, &text, &tx).await {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = close_tx.send(());
                    // Sends the queued close reply.
                    let _ = ws.flush().await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
            _ = kick.recv() => {
                let _ = ws.send(Message::Text("41".to_string())).await;
                let _ = ws.close(None).await;
                return;
            }
        }
    }
}

async fn handle_frame(
    ws: &mut WebSocketStream<TcpStream>,
    text: &str,
    tx: &mpsc::UnboundedSender<Value>,
) -> bool {
    if text == "40" {
        return ws
            .send(Message::Text(r#"40{"sid":"client"}"#.to_string()))
            .await
            .is_ok();
    }
    if let Some(event) = text.strip_prefix("42") {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(event) {
            if items.first().and_then(Value::as_str) == Some("message") {
                if let Some(payload) = items.get(1) {
                    let _ = tx.send(payload.clone());
                }
            }
        }
    }
    true
}
