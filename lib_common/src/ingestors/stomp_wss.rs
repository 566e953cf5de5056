//! # STOMP WSS Ingestor
//!
//! Durable subscription to one topic of the wearable-device microservice, spoken as STOMP
//! over a WebSocket. Each MESSAGE body is a `{type, data}` envelope that is applied to the
//! shared `SensorState` before the next frame is read, so upstream events are processed
//! strictly one at a time.
//!
//! The subscriber cycles `Disconnected -> Connecting -> Subscribed`, and on any transport or
//! broker error waits a fixed delay in `ErrorBackoff` before connecting again, forever.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::Message, Error as WsError},
};
use url::Url;

use super::stomp_frame::{parse_frames, FrameError, StompFrame};
use crate::core::SensorState;
use crate::sensors::DeviceEvent;

const SUBSCRIPTION_ID: &str = "sub-0";

/// Connection settings for the upstream broker.
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// WebSocket endpoint of the broker (for SockJS servers, the raw `/websocket` path).
    pub url: String,
    pub topic: String,
    pub login: Option<String>,
    pub passcode: Option<String>,
    /// Fixed wait between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Bound on TCP/WebSocket connect and on waiting for CONNECTED.
    pub handshake_timeout: Duration,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/websocket".to_string(),
            topic: "/topic/hub900".to_string(),
            login: None,
            passcode: None,
            reconnect_delay: Duration::from_millis(5000),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Lifecycle of the upstream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Disconnected,
    Connecting,
    Subscribed,
    ErrorBackoff,
}

#[derive(Debug, Error)]
enum SessionError {
    #[error("Invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("WebSocket error: {0}")]
    Transport(#[from] WsError),
    #[error("Broker sent ERROR: {0}")]
    Broker(String),
    #[error("Bad frame during handshake: {0}")]
    Frame(#[from] FrameError),
    #[error("Timed out connecting to the broker")]
    HandshakeTimeout,
    #[error("Connection closed by the broker")]
    Closed,
}

pub struct StompWssIngestor {
    config: StompConfig,
    state: Arc<SensorState>,
}

impl StompWssIngestor {
    pub fn new(config: StompConfig, state: Arc<SensorState>) -> Self {
        Self { config, state }
    }

    fn transition(&self, current: &mut UpstreamState, next: UpstreamState) {
        if *current != next {
            log::info!("Upstream {:?} -> {:?}", current, next);
            *current = next;
        }
    }

    /// Primary execution loop with reconnection logic. Returns only on shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut phase = UpstreamState::Disconnected;

        loop {
            self.transition(&mut phase, UpstreamState::Connecting);
            log::info!("Connecting to upstream broker: {}", self.config.url);

            match self.session(&mut phase, &mut shutdown).await {
                Ok(()) => {
                    self.transition(&mut phase, UpstreamState::Disconnected);
                    log::info!("Upstream subscriber shutting down...");
                    return;
                }
                Err(e) => {
                    log::error!("Upstream error: {}", e);
                    self.transition(&mut phase, UpstreamState::ErrorBackoff);
                    tokio::select! {
                        _ = shutdown.recv() => {
                            self.transition(&mut phase, UpstreamState::Disconnected);
                            log::info!("Upstream subscriber shutting down...");
                            return;
                        }
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// One connection: handshake, subscribe, then pump MESSAGE frames until an error.
    /// `Ok(())` means shutdown was requested.
    async fn session(
        &self,
        phase: &mut UpstreamState,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), SessionError> {
        let url = Url::parse(&self.config.url)?;
        let host = url.host_str().unwrap_or("localhost").to_string();

        let (ws_stream, _) = timeout(self.config.handshake_timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| SessionError::HandshakeTimeout)??;
        let (mut write, mut read) = ws_stream.split();

        write.send(text(&self.connect_frame(&host))).await?;
        timeout(self.config.handshake_timeout, wait_connected(&mut read))
            .await
            .map_err(|_| SessionError::HandshakeTimeout)??;

        let subscribe = StompFrame::new("SUBSCRIBE")
            .header("id", SUBSCRIPTION_ID)
            .header("destination", &self.config.topic)
            .header("ack", "auto");
        write.send(text(&subscribe)).await?;
        self.transition(phase, UpstreamState::Subscribed);
        log::info!("Subscribed to {}", self.config.topic);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = write.send(text(&StompFrame::new("DISCONNECT"))).await;
                    let _ = timeout(Duration::from_secs(1), write.close()).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(payload))) => self.handle_payload(payload.as_str()).await?,
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(payload) => self.handle_payload(payload).await?,
                            Err(_) => log::warn!("Dropping non UTF-8 binary message ({} bytes)", data.len()),
                        },
                        Some(Ok(Message::Close(_))) | None => return Err(SessionError::Closed),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn connect_frame(&self, host: &str) -> StompFrame {
        let mut frame = StompFrame::new("CONNECT")
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(login) = &self.config.login {
            frame = frame.header("login", login);
        }
        if let Some(passcode) = &self.config.passcode {
            frame = frame.header("passcode", passcode);
        }
        frame
    }

    /// Framing problems drop the payload; only a broker ERROR ends the session.
    async fn handle_payload(&self, payload: &str) -> Result<(), SessionError> {
        let frames = match parse_frames(payload) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("Dropping malformed STOMP payload: {}", e);
                return Ok(());
            }
        };

        for frame in frames {
            match frame.command.as_str() {
                "MESSAGE" => {
                    if frame.get("subscription").is_some_and(|id| id != SUBSCRIPTION_ID) {
                        log::debug!("Ignoring MESSAGE for foreign subscription");
                        continue;
                    }
                    self.handle_message(&frame.body).await;
                }
                "ERROR" => return Err(SessionError::Broker(broker_error(&frame))),
                other => log::debug!("Ignoring {} frame", other),
            }
        }
        Ok(())
    }

    async fn handle_message(&self, body: &str) {
        log::trace!("Received upstream message: {}", body);
        match DeviceEvent::from_json(body) {
            Ok(event) => {
                self.state.apply_event(&event).await;
            }
            Err(e) => log::warn!("Dropping upstream message: {}", e),
        }
    }
}

fn text(frame: &StompFrame) -> Message {
    Message::Text(frame.encode().into())
}

fn broker_error(frame: &StompFrame) -> String {
    frame
        .get("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.trim().to_string())
}

async fn wait_connected<S>(read: &mut S) -> Result<(), SessionError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = read.next().await {
        let payload = match msg? {
            Message::Text(payload) => payload.as_str().to_string(),
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => return Err(SessionError::Closed),
            _ => continue,
        };
        for frame in parse_frames(&payload)? {
            match frame.command.as_str() {
                "CONNECTED" => {
                    log::info!(
                        "Connected to upstream broker (STOMP {})",
                        frame.get("version").unwrap_or("1.0")
                    );
                    return Ok(());
                }
                "ERROR" => return Err(SessionError::Broker(broker_error(&frame))),
                _ => {}
            }
        }
    }
    Err(SessionError::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateOptions;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> StompFrame {
        loop {
            if let Message::Text(payload) = ws.next().await.unwrap().unwrap() {
                let mut frames = parse_frames(payload.as_str()).unwrap();
                if !frames.is_empty() {
                    return frames.remove(0);
                }
            }
        }
    }

    async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: StompFrame) {
        ws.send(Message::Text(frame.encode().into())).await.unwrap();
    }

    fn message(body: &str) -> StompFrame {
        StompFrame::new("MESSAGE")
            .header("destination", "/topic/hub900")
            .header("subscription", SUBSCRIPTION_ID)
            .header("message-id", "1")
            .body(body)
    }

    /// Accepts CONNECT and SUBSCRIBE, then returns the socket for the test to drive.
    async fn handshake(ws: &mut WebSocketStream<TcpStream>) {
        let connect = next_frame(ws).await;
        assert_eq!(connect.command, "CONNECT");
        assert_eq!(connect.get("heart-beat"), Some("0,0"));
        send_frame(ws, StompFrame::new("CONNECTED").header("version", "1.2")).await;

        let subscribe = next_frame(ws).await;
        assert_eq!(subscribe.command, "SUBSCRIBE");
        assert_eq!(subscribe.get("destination"), Some("/topic/hub900"));
        assert_eq!(subscribe.get("id"), Some(SUBSCRIPTION_ID));
    }

    fn config_for(listener: &TcpListener) -> StompConfig {
        StompConfig {
            url: format!("ws://{}/websocket", listener.local_addr().unwrap()),
            reconnect_delay: Duration::from_millis(50),
            handshake_timeout: Duration::from_secs(2),
            ..StompConfig::default()
        }
    }

    async fn wait_for<F>(rx: &mut crate::core::ReadingReceiver, mut done: F) -> Arc<crate::Reading>
    where
        F: FnMut(&crate::Reading) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let reading = rx.recv().await.expect("state channel closed");
                if done(&reading) {
                    return reading;
                }
            }
        })
        .await
        .expect("expected reading never arrived")
    }

    #[tokio::test]
    async fn test_applies_messages_in_order_and_skips_bad_ones() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener);
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let broker = tokio::spawn(async move {
            let mut ws = accept_ws(&listener).await;
            handshake(&mut ws).await;
            send_frame(&mut ws, message("not json")).await;
            send_frame(&mut ws, message(r#"{"type":"bleHeartRate","data":{"steps":100}}"#)).await;
            // heart-beat between frames
            ws.send(Message::Text("\n".to_string().into())).await.unwrap();
            send_frame(&mut ws, message(r#"{"type":"bleCadence","data":{"wheel":5}}"#)).await;
            let _ = done_rx.await;
        });

        let state = Arc::new(SensorState::new(None, StateOptions::default()));
        let mut rx = state.subscribe(1).await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ingestor = StompWssIngestor::new(config, state.clone());
        let handle = tokio::spawn(async move { ingestor.run(shutdown_rx).await });

        let steps = wait_for(&mut rx, |r| r.steps.is_some()).await;
        assert_eq!(steps.device_type.as_deref(), Some("bleHeartRate"));
        let cadence = wait_for(&mut rx, |r| r.cadence_wheel.is_some()).await;
        assert_eq!(cadence.steps, Some(100));
        assert_eq!(cadence.cadence_wheel, Some(5));
        assert_eq!(cadence.device_type.as_deref(), Some("bleCadence"));

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        let _ = done_tx.send(());
        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_broker_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener);
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let broker = tokio::spawn(async move {
            // First attempt is refused at the STOMP level
            let mut first = accept_ws(&listener).await;
            let connect = next_frame(&mut first).await;
            assert_eq!(connect.command, "CONNECT");
            send_frame(&mut first, StompFrame::new("ERROR").header("message", "try later")).await;

            let mut second = accept_ws(&listener).await;
            handshake(&mut second).await;
            send_frame(&mut second, message(r#"{"type":"bleSOS","data":{"deviceId":"SOS-9"}}"#)).await;
            let _ = done_rx.await;
        });

        let state = Arc::new(SensorState::new(None, StateOptions::default()));
        let mut rx = state.subscribe(1).await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ingestor = StompWssIngestor::new(config, state.clone());
        let handle = tokio::spawn(async move { ingestor.run(shutdown_rx).await });

        let sos = wait_for(&mut rx, |r| r.sos_alert).await;
        assert_eq!(sos.device_id.as_deref(), Some("SOS-9"));

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        let _ = done_tx.send(());
        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff() {
        // Nothing listens on this port once the listener is dropped
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config_for(&listener);
        config.reconnect_delay = Duration::from_secs(3600);
        drop(listener);

        let state = Arc::new(SensorState::new(None, StateOptions::default()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ingestor = StompWssIngestor::new(config, state);
        let handle = tokio::spawn(async move { ingestor.run(shutdown_rx).await });

        sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_connect_frame_carries_credentials() {
        let state = Arc::new(SensorState::new(None, StateOptions::default()));
        let ingestor = StompWssIngestor::new(
            StompConfig {
                login: Some("relay".into()),
                passcode: Some("secret".into()),
                ..StompConfig::default()
            },
            state,
        );
        let frame = ingestor.connect_frame("example.org");
        assert_eq!(frame.get("host"), Some("example.org"));
        assert_eq!(frame.get("login"), Some("relay"));
        assert_eq!(frame.get("passcode"), Some("secret"));
    }
}
