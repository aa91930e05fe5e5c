use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::Error as WsError, protocol::Message},
};
use tracing::{debug, info, warn};
use crate::error::{BackendError, Result};
use crate::realtime::protocol::{decode, ChangePayload, Incoming, PhoenixMessage, SubscriptionRequest};
use crate::traits::{ChangeFeed, RealtimeApi};

type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn resolve_ws_url(base_url: &str, anon_key: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    let ws_base = normalized
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        ws_base,
        urlencoding::encode(anon_key)
    )
}

/// Opens realtime subscriptions against `{url}/realtime/v1/websocket`
#[derive(Clone)]
pub struct RealtimeClient {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    heartbeat: Duration,
    join_timeout: Duration,
}

impl RealtimeClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            access_token: None,
            heartbeat: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub async fn connect(&self, request: SubscriptionRequest) -> Result<RealtimeSubscription> {
        let url = resolve_ws_url(&self.base_url, &self.anon_key);

        let (ws_stream, _) = match connect_async(url.as_str()).await {
            Ok(result) => result,
            Err(WsError::Http(response)) => {
                let status = response.status();
                let message = match status.as_u16() {
                    401 => "Unauthorized: realtime requires a valid API key".to_string(),
                    403 => "Forbidden: access to realtime denied".to_string(),
                    code => format!("Realtime HTTP error: {}", code),
                };
                return Err(BackendError::with_status(status.as_u16(), message));
            }
            Err(e) => {
                return Err(BackendError::new(format!("Realtime connection failed: {}", e)));
            }
        };

        let mut subscription = RealtimeSubscription {
            ws_stream,
            topic: request.topic(),
            join_ref: "1".to_string(),
            next_ref: 2,
            heartbeat: interval_at(Instant::now() + self.heartbeat, self.heartbeat),
            request,
            closed: false,
        };

        let join = PhoenixMessage::join(&subscription.request, self.access_token.as_deref(), &subscription.join_ref);
        subscription.send(&join).await?;
        match tokio::time::timeout(self.join_timeout, subscription.await_join()).await {
            Ok(joined) => joined?,
            Err(_) => {
                return Err(BackendError::new(format!(
                    "Timed out joining {} after {:?}",
                    subscription.topic, self.join_timeout
                )))
            }
        }

        info!(
            operation = "realtime_subscribe",
            topic = %subscription.topic,
            event = %subscription.request.event,
            filter = subscription.request.filter.as_deref().unwrap_or(""),
            "Joined realtime channel"
        );
        Ok(subscription)
    }
}

#[async_trait]
impl RealtimeApi for RealtimeClient {
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<Box<dyn ChangeFeed>> {
        let subscription = self.connect(request).await?;
        Ok(Box::new(subscription))
    }
}

enum Step {
    Heartbeat,
    Frame(Option<std::result::Result<Message, WsError>>),
}

/// One joined channel on its own websocket
pub struct RealtimeSubscription {
    ws_stream: WebSocketStream,
    topic: String,
    join_ref: String,
    next_ref: u64,
    heartbeat: Interval,
    request: SubscriptionRequest,
    closed: bool,
}

impl RealtimeSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn take_ref(&mut self) -> String {
        let msg_ref = self.next_ref.to_string();
        self.next_ref += 1;
        msg_ref
    }

    async fn send(&mut self, message: &PhoenixMessage) -> Result<()> {
        self.ws_stream
            .send(Message::Text(message.to_text()))
            .await
            .map_err(|e| BackendError::new(format!("Realtime send failed: {}", e)))
    }

    /// Wait for the server to acknowledge or reject our join
    async fn await_join(&mut self) -> Result<()> {
        loop {
            let text = match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(payload))) => {
                    self.ws_stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| BackendError::new(e.to_string()))?;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(BackendError::new(format!(
                        "Realtime connection closed while joining {}",
                        self.topic
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(BackendError::new(e.to_string()));
                }
            };

            match decode(&text) {
                Ok(Incoming::Reply { msg_ref, ok, message }) if msg_ref.as_deref() == Some(self.join_ref.as_str()) => {
                    if ok {
                        debug!(topic = %self.topic, "Realtime join acknowledged");
                        return Ok(());
                    }
                    self.closed = true;
                    let reason = message.unwrap_or_else(|| "join rejected".to_string());
                    return Err(BackendError::new(format!("Failed to join {}: {}", self.topic, reason)));
                }
                Ok(Incoming::ChannelClosed { reason }) => {
                    self.closed = true;
                    return Err(BackendError::new(format!("Failed to join {}: {}", self.topic, reason)));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "Skipping undecodable realtime frame");
                }
            }
        }
    }

    /// Receive the next matching change.
    ///
    /// Sends heartbeats while waiting. Returns `None` when the connection closes.
    pub async fn next(&mut self) -> Option<Result<ChangePayload>> {
        if self.closed {
            return None;
        }
        loop {
            let step = tokio::select! {
                _ = self.heartbeat.tick() => Step::Heartbeat,
                frame = self.ws_stream.next() => Step::Frame(frame),
            };

            let frame = match step {
                Step::Heartbeat => {
                    let msg_ref = self.take_ref();
                    if let Err(e) = self.send(&PhoenixMessage::heartbeat(&msg_ref)).await {
                        return Some(Err(e));
                    }
                    continue;
                }
                Step::Frame(frame) => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(Incoming::Change(change)) => {
                        if self.request.event.matches(change.event) {
                            return Some(Ok(change));
                        }
                    }
                    Ok(Incoming::Reply { msg_ref, ok, message }) => {
                        if msg_ref.as_deref() == Some(self.join_ref.as_str()) {
                            if !ok {
                                self.closed = true;
                                let reason = message.unwrap_or_else(|| "join rejected".to_string());
                                return Some(Err(BackendError::new(format!(
                                    "Failed to join {}: {}",
                                    self.topic, reason
                                ))));
                            }
                            debug!(topic = %self.topic, "Realtime join acknowledged");
                        }
                    }
                    Ok(Incoming::ChannelClosed { reason }) => {
                        self.closed = true;
                        return Some(Err(BackendError::new(format!(
                            "Realtime channel {} closed: {}",
                            self.topic, reason
                        ))));
                    }
                    Ok(Incoming::Ignored) => {}
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "Skipping undecodable realtime frame");
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = self.ws_stream.send(Message::Pong(payload)).await {
                        return Some(Err(BackendError::new(e.to_string())));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(BackendError::new(e.to_string())));
                }
            }
        }
    }

    /// Leave the channel and close the socket
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Best-effort leave before closing
        let msg_ref = self.take_ref();
        let leave = PhoenixMessage::leave(&self.topic, &msg_ref);
        let _ = self.send(&leave).await;

        self.ws_stream
            .close(None)
            .await
            .map_err(|e| BackendError::new(format!("Failed to close realtime connection: {}", e)))?;

        info!(operation = "realtime_unsubscribe", topic = %self.topic, "Left realtime channel");
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for RealtimeSubscription {
    async fn next_change(&mut self) -> Option<Result<ChangePayload>> {
        self.next().await
    }

    async fn close(&mut self) -> Result<()> {
        RealtimeSubscription::close(self).await
    }
}
