use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use cerelog_bridge::decoder::DecodedSample;
use cerelog_bridge::hub::SampleHub;
use cerelog_bridge::sinks::wifi::{ShieldConfig, ShieldState, router, run_tcp_worker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(5);

async fn request(app: &Router, method: Method, uri: &str, body: String) -> Result<StatusCode> {
    let request = Request::builder().method(method).uri(uri).body(Body::from(body))?;
    Ok(app.clone().oneshot(request).await?.status())
}

fn push_samples(hub: &SampleHub, range: std::ops::Range<i32>) {
    for i in range {
        hub.push(DecodedSample::new([i, -i, 2 * i, 0, 1, -1, 8_388_607, -8_388_608]));
    }
}

struct Harness {
    app: Router,
    state: Arc<ShieldState>,
    hub: Arc<SampleHub>,
    quit: Arc<AtomicBool>,
    worker: tokio::task::JoinHandle<()>,
}

fn start_worker() -> Harness {
    start_worker_with(ShieldConfig {
        idle_poll: Duration::from_millis(10),
        ..ShieldConfig::default()
    })
}

fn start_worker_with(config: ShieldConfig) -> Harness {
    let state = Arc::new(ShieldState::default());
    let hub = Arc::new(SampleHub::new(500));
    let quit = Arc::new(AtomicBool::new(false));
    let worker = tokio::spawn(run_tcp_worker(state.clone(), hub.clone(), quit.clone(), config));

    Harness {
        app: router(state.clone()),
        state,
        hub,
        quit,
        worker,
    }
}

async fn configure_and_start(harness: &Harness, port: u16) -> Result<()> {
    let body = format!(r#"{{"ip":"127.0.0.1","port":{port}}}"#);
    assert_eq!(request(&harness.app, Method::POST, "/tcp", body).await?, StatusCode::OK);
    assert_eq!(
        request(&harness.app, Method::GET, "/stream/start", String::new()).await?,
        StatusCode::OK
    );
    Ok(())
}

#[tokio::test]
async fn test_control_sequence_streams_numbered_chunks() -> Result<()> {
    let gui = TcpListener::bind("127.0.0.1:0").await?;
    let port = gui.local_addr()?.port();
    let harness = start_worker();

    configure_and_start(&harness, port).await?;
    push_samples(&harness.hub, 0..25);

    let (socket, _) = timeout(WAIT, gui.accept()).await??;
    let mut lines = BufReader::new(socket);

    for expected_count in 1..=2 {
        let mut line = String::new();
        timeout(WAIT, lines.read_line(&mut line)).await??;
        assert!(line.ends_with("\r\n"), "line not CRLF-terminated: {line:?}");

        let value: serde_json::Value = serde_json::from_str(line.trim_end())?;
        assert_eq!(value["count"], expected_count);

        let chunk = value["chunk"].as_array().expect("chunk array");
        assert!(!chunk.is_empty() && chunk.len() <= 10);
        for row in chunk {
            let row = row.as_array().expect("row array");
            assert_eq!(row.len(), 12);
            assert!(row[..11].iter().all(|v| v.is_i64()));
            assert_eq!(&row[8..11], &[0, 0, 0]);
            assert!(row[11].as_f64().is_some_and(|ms| ms > 0.0));
        }
    }

    harness.quit.store(true, Ordering::SeqCst);
    timeout(WAIT, harness.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_first_chunk_holds_oldest_samples_in_order() -> Result<()> {
    let gui = TcpListener::bind("127.0.0.1:0").await?;
    let port = gui.local_addr()?.port();
    let harness = start_worker();

    push_samples(&harness.hub, 0..10);
    configure_and_start(&harness, port).await?;

    let (socket, _) = timeout(WAIT, gui.accept()).await??;
    let mut line = String::new();
    timeout(WAIT, BufReader::new(socket).read_line(&mut line)).await??;

    let value: serde_json::Value = serde_json::from_str(line.trim_end())?;
    let firsts: Vec<i64> = value["chunk"]
        .as_array()
        .expect("chunk array")
        .iter()
        .map(|row| row[0].as_i64().expect("integer channel"))
        .collect();
    assert_eq!(firsts, (0..10).collect::<Vec<_>>());
    assert_eq!(value["chunk"][3][6], 8_388_607);
    assert_eq!(value["chunk"][3][7], -8_388_608);

    harness.quit.store(true, Ordering::SeqCst);
    timeout(WAIT, harness.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_stream_stop_closes_connection() -> Result<()> {
    let gui = TcpListener::bind("127.0.0.1:0").await?;
    let port = gui.local_addr()?.port();
    let harness = start_worker();

    configure_and_start(&harness, port).await?;
    let (socket, _) = timeout(WAIT, gui.accept()).await??;

    assert_eq!(
        request(&harness.app, Method::GET, "/stream/stop", String::new()).await?,
        StatusCode::OK
    );

    // Drain whatever was sent, then expect end of stream
    let mut lines = BufReader::new(socket);
    loop {
        let mut line = String::new();
        if timeout(WAIT, lines.read_line(&mut line)).await?? == 0 {
            break;
        }
    }
    assert!(!harness.state.is_streaming());

    harness.quit.store(true, Ordering::SeqCst);
    timeout(WAIT, harness.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_lost_peer_switches_streaming_off() -> Result<()> {
    let gui = TcpListener::bind("127.0.0.1:0").await?;
    let port = gui.local_addr()?.port();
    let harness = start_worker();

    configure_and_start(&harness, port).await?;
    let (socket, _) = timeout(WAIT, gui.accept()).await??;
    drop(socket);
    drop(gui);

    let deadline = tokio::time::Instant::now() + WAIT;
    let mut next = 0;
    while harness.state.is_streaming() {
        assert!(tokio::time::Instant::now() < deadline, "worker never noticed the lost peer");
        push_samples(&harness.hub, next..next + 10);
        next += 10;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // No reconnect until the GUI starts the stream again
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.state.is_streaming());

    harness.quit.store(true, Ordering::SeqCst);
    timeout(WAIT, harness.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_target_switches_streaming_off() -> Result<()> {
    // Bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").await?.local_addr()?.port();
    let harness = start_worker();

    configure_and_start(&harness, port).await?;

    let deadline = tokio::time::Instant::now() + WAIT;
    while harness.state.is_streaming() {
        assert!(tokio::time::Instant::now() < deadline, "connection error not reported");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    harness.quit.store(true, Ordering::SeqCst);
    timeout(WAIT, harness.worker).await??;
    Ok(())
}

#[tokio::test]
async fn test_silent_target_does_not_hold_up_shutdown() -> Result<()> {
    // A listener that never accepts and has a full queue drops further SYNs
    let socket = TcpSocket::new_v4()?;
    socket.bind("127.0.0.1:0".parse()?)?;
    let silent = socket.listen(0)?;
    let addr = silent.local_addr()?;
    let mut fillers = Vec::new();
    for _ in 0..3 {
        if let Ok(Ok(stream)) = timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            fillers.push(stream);
        }
    }

    let harness = start_worker_with(ShieldConfig {
        idle_poll: Duration::from_millis(10),
        connect_timeout: Duration::from_millis(300),
        ..ShieldConfig::default()
    });
    configure_and_start(&harness, addr.port()).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.quit.store(true, Ordering::SeqCst);
    timeout(Duration::from_secs(2), harness.worker)
        .await
        .expect("worker stuck connecting after quit")?;
    drop(fillers);
    Ok(())
}
