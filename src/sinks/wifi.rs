//! WiFi Shield emulator
//!
//! Two surfaces share one [`ShieldState`]:
//!
//! - an HTTP control API (`/board`, `/stream/start`, `/stream/stop`, `/tcp`)
//!   the acquisition GUI uses to discover the board and tell it where to send
//!   data
//! - a TCP worker that, while streaming is on and a target is set, connects
//!   out to that target and writes newline-terminated JSON chunks
//!
//! The HTTP side only flips flags; it never touches the sample path.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::hub::{QueuedSample, SampleHub};
use crate::protocol::NUM_CHANNELS;

/// Gain reported for every channel on `/board`
pub const CHANNEL_GAIN: u32 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct ShieldConfig {
    /// HTTP control API address
    pub bind: SocketAddr,
    /// Samples per JSON chunk
    pub chunk_size: usize,
    /// Wait between checks while streaming is off or no target is set
    pub idle_poll: Duration,
    /// Wait between hub checks while fewer than `chunk_size` samples are pending
    pub send_poll: Duration,
    /// Give up on a stream target that does not answer within this time
    pub connect_timeout: Duration,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            chunk_size: 10,
            idle_poll: Duration::from_millis(100),
            send_poll: Duration::from_millis(5),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Where the GUI asked us to stream, as posted to `/tcp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpTarget {
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_output() -> String {
    "json".to_string()
}

impl TcpTarget {
    pub fn url(&self) -> String {
        format!("tcp://{}:{}", self.ip, self.port)
    }

    fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Flags shared between the HTTP handlers and the TCP worker
#[derive(Debug, Default)]
pub struct ShieldState {
    streaming: AtomicBool,
    target: Mutex<Option<TcpTarget>>,
}

impl ShieldState {
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::SeqCst);
    }

    pub fn target(&self) -> Option<TcpTarget> {
        self.target.lock().clone()
    }

    pub fn set_target(&self, target: TcpTarget) {
        *self.target.lock() = Some(target);
    }

    /// The target to stream to, if streaming is on and one is configured
    fn active_target(&self) -> Option<TcpTarget> {
        if self.is_streaming() { self.target() } else { None }
    }
}

/// Body of `GET /board`
#[derive(Debug, Serialize)]
pub struct BoardInfo {
    pub board_type: &'static str,
    pub num_channels: usize,
    pub connected: bool,
    pub gains: [u32; NUM_CHANNELS],
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self {
            board_type: "cyton",
            num_channels: NUM_CHANNELS,
            connected: true,
            gains: [CHANNEL_GAIN; NUM_CHANNELS],
        }
    }
}

/// The HTTP control API. Anything not listed, or the wrong method on a listed
/// path, gets a bare 404.
pub fn router(state: Arc<ShieldState>) -> Router {
    Router::new()
        .route("/board", get(board_info).fallback(not_found))
        .route("/stream/start", get(start_stream).fallback(not_found))
        .route("/stream/stop", get(stop_stream).fallback(not_found))
        .route("/tcp", post(configure_tcp).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

async fn board_info() -> Json<BoardInfo> {
    debug!("GUI requested /board");
    Json(BoardInfo::default())
}

async fn start_stream(State(state): State<Arc<ShieldState>>) -> StatusCode {
    info!("GUI requested stream start");
    state.set_streaming(true);
    StatusCode::OK
}

async fn stop_stream(State(state): State<Arc<ShieldState>>) -> StatusCode {
    info!("GUI requested stream stop");
    state.set_streaming(false);
    StatusCode::OK
}

async fn configure_tcp(State(state): State<Arc<ShieldState>>, body: Bytes) -> Response {
    let target: TcpTarget = match serde_json::from_slice(&body) {
        Ok(target) => target,
        Err(e) => {
            warn!("Rejected /tcp body: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    info!("GUI configured TCP target {} (output {})", target.url(), target.output);
    let url = target.url();
    state.set_target(target);

    Json(json!({ "connected": true, "url": url })).into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// One row of a chunk: 8 raw codes, 3 zero aux values, reception time in ms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRow {
    pub channels: [i32; NUM_CHANNELS],
    pub timestamp_ms: f64,
}

impl From<QueuedSample> for ChunkRow {
    fn from(queued: QueuedSample) -> Self {
        Self {
            channels: queued.sample.channels,
            timestamp_ms: queued.received_ms,
        }
    }
}

impl Serialize for ChunkRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(NUM_CHANNELS + 4))?;
        for value in &self.channels {
            seq.serialize_element(value)?;
        }
        for _ in 0..3 {
            seq.serialize_element(&0)?;
        }
        seq.serialize_element(&self.timestamp_ms)?;
        seq.end()
    }
}

#[derive(Serialize)]
struct Chunk<'a> {
    chunk: &'a [ChunkRow],
    count: u64,
}

/// One wire line: `{"chunk":[...],"count":N}\r\n`
pub fn encode_chunk(rows: &[ChunkRow], count: u64) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&Chunk { chunk: rows, count })?;
    line.push_str("\r\n");
    Ok(line)
}

/// Stream to the configured target whenever streaming is on.
///
/// A connection error switches streaming off; the GUI has to start it again.
pub async fn run_tcp_worker(
    state: Arc<ShieldState>,
    hub: Arc<SampleHub>,
    quit: Arc<AtomicBool>,
    config: ShieldConfig,
) {
    while !quit.load(Ordering::SeqCst) {
        let Some(target) = state.active_target() else {
            tokio::time::sleep(config.idle_poll).await;
            continue;
        };

        match stream_to(&target, &state, &hub, &quit, &config).await {
            Ok(chunks) => info!("TCP stream to {} stopped after {} chunks", target.url(), chunks),
            Err(e) => {
                warn!("TCP stream to {} failed: {}", target.url(), e);
                state.set_streaming(false);
            }
        }
    }
}

async fn stream_to(
    target: &TcpTarget,
    state: &ShieldState,
    hub: &SampleHub,
    quit: &AtomicBool,
    config: &ShieldConfig,
) -> SinkResult<u64> {
    info!("Connecting to GUI at {}", target.url());
    let mut socket = tokio::time::timeout(config.connect_timeout, TcpStream::connect(target.address()))
        .await
        .map_err(|_| {
            SinkError::Connection(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
        })?
        .map_err(SinkError::Connection)?;
    socket.set_nodelay(true).map_err(SinkError::Connection)?;

    let chunk_size = config.chunk_size.max(1);
    let mut pending: Vec<ChunkRow> = Vec::new();
    let mut count: u64 = 0;

    while state.is_streaming() && !quit.load(Ordering::SeqCst) {
        pending.extend(hub.drain().into_iter().map(ChunkRow::from));

        if pending.len() < chunk_size {
            tokio::time::sleep(config.send_poll).await;
            continue;
        }

        count += 1;
        let line = encode_chunk(&pending[..chunk_size], count)?;
        pending.drain(..chunk_size);
        socket
            .write_all(line.as_bytes())
            .await
            .map_err(SinkError::Connection)?;
    }

    // The peer may already be gone
    let _ = socket.shutdown().await;
    Ok(count)
}

/// Serve the HTTP control API until `quit` is set
pub async fn serve_http(
    listener: TcpListener,
    state: Arc<ShieldState>,
    quit: Arc<AtomicBool>,
) -> SinkResult<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for(quit))
        .await
        .map_err(SinkError::Http)
}

async fn wait_for(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Run both surfaces of the emulator until `quit` is set
pub async fn run_shield(
    hub: Arc<SampleHub>,
    quit: Arc<AtomicBool>,
    config: ShieldConfig,
) -> SinkResult<()> {
    let state = Arc::new(ShieldState::default());
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(SinkError::Http)?;
    info!("WiFi Shield control API listening on http://{}", config.bind);

    let worker = tokio::spawn(run_tcp_worker(
        state.clone(),
        hub,
        quit.clone(),
        config.clone(),
    ));

    let served = serve_http(listener, state, quit.clone()).await;
    quit.store(true, Ordering::SeqCst);
    if let Err(e) = worker.await {
        warn!("TCP worker ended abnormally: {}", e);
    }
    served
}
