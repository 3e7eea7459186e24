//! Control-channel tests over a real WebSocket client.

mod common;

use std::time::Duration;

use common::{TestServer, eventually};
use futures::{SinkExt, StreamExt};
use pacer_core::partition::with_header;
use pacer_server::{FREQUENCY_PREFIX, Telemetry};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(server: &TestServer) -> Client {
    let (client, _) = connect_async(server.ws_url()).await.unwrap();
    client
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.into())).await.unwrap();
}

/// Next text frame, or `None` if nothing arrives within `timeout`.
async fn next_text(client: &mut Client, timeout: Duration) -> Option<String> {
    loop {
        let frame = tokio::time::timeout(timeout, client.next()).await.ok()??;
        if let Message::Text(text) = frame.unwrap() {
            return Some(text.as_str().to_string());
        }
    }
}

fn decode_telemetry(text: &str) -> Telemetry {
    let body = text
        .strip_prefix(FREQUENCY_PREFIX)
        .unwrap_or_else(|| panic!("not a telemetry message: {text}"));
    serde_json::from_str(body).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_telemetry_on_connect() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;

    let text = next_text(&mut client, REPLY_TIMEOUT).await.unwrap();
    assert!(text.starts_with(r#"#freq{"brain":"#), "{text}");
    assert_eq!(decode_telemetry(&text), Telemetry { brain: 0.0, gui: 0.0 });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cadence_message_is_answered_with_telemetry() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    next_text(&mut client, REPLY_TIMEOUT).await.unwrap();

    send(&mut client, r#"#freq{"brain":20,"gui":10}"#).await;
    let reply = next_text(&mut client, REPLY_TIMEOUT).await.unwrap();
    assert_eq!(decode_telemetry(&reply), Telemetry { brain: 0.0, gui: 0.0 });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_cadence_message_is_ignored() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    next_text(&mut client, REPLY_TIMEOUT).await.unwrap();

    send(&mut client, "#freq{").await;
    send(&mut client, r#"#freq{"brain":20}"#).await;
    assert_eq!(next_text(&mut client, Duration::from_millis(300)).await, None);

    // The connection survives and still answers.
    send(&mut client, r#"#freq{"brain":12.5,"gui":"25"}"#).await;
    let reply = next_text(&mut client, REPLY_TIMEOUT).await.unwrap();
    assert!(reply.starts_with(FREQUENCY_PREFIX), "{reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_submission_runs_against_the_simulation() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    next_text(&mut client, REPLY_TIMEOUT).await.unwrap();

    let program = with_header("HAL.motors.sendV(2.5)\nwhile True:\n    HAL.motors.sendW(0.5)\n", 0);
    send(&mut client, &program).await;
    let simulation = server.simulation.clone();
    assert!(eventually(REPLY_TIMEOUT, || simulation.velocity() == (2.5, 0.5)).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directives_reach_the_simulation() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    next_text(&mut client, REPLY_TIMEOUT).await.unwrap();
    let simulation = server.simulation.clone();

    send(&mut client, "#paus").await;
    assert!(eventually(REPLY_TIMEOUT, || simulation.is_paused()).await);

    send(&mut client, "#resu").await;
    assert!(eventually(REPLY_TIMEOUT, || !simulation.is_paused()).await);

    send(&mut client, "#rest").await;
    assert!(eventually(REPLY_TIMEOUT, || simulation.resets() == 1).await);
}
