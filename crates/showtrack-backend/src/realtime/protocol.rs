//! Phoenix channel frames spoken by the realtime endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use crate::error::{BackendError, Result};

/// Database change kinds a subscription can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChangeEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[default]
    #[serde(rename = "*")]
    All,
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::Insert => "INSERT",
            ChangeEvent::Update => "UPDATE",
            ChangeEvent::Delete => "DELETE",
            ChangeEvent::All => "*",
        }
    }

    /// Whether a listener registered for `self` should see an `actual` event
    pub fn matches(&self, actual: ChangeEvent) -> bool {
        *self == ChangeEvent::All || *self == actual
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INSERT" => Ok(ChangeEvent::Insert),
            "UPDATE" => Ok(ChangeEvent::Update),
            "DELETE" => Ok(ChangeEvent::Delete),
            "*" | "ALL" => Ok(ChangeEvent::All),
            other => Err(format!("Invalid change event: {}. Use INSERT, UPDATE, DELETE or *", other)),
        }
    }
}

/// One database change as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "type", alias = "eventType")]
    pub event: ChangeEvent,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    /// Row after the change (absent for deletes)
    #[serde(default, alias = "new")]
    pub record: Option<Value>,
    /// Row before the change; only the primary key unless replica identity is full
    #[serde(default, alias = "old")]
    pub old_record: Option<Value>,
}

/// What a subscription listens to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub schema: String,
    pub table: String,
    pub event: ChangeEvent,
    /// Per-row filter such as `Show=eq.Dark`
    pub filter: Option<String>,
}

impl SubscriptionRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            event: ChangeEvent::All,
            filter: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn event(mut self, event: ChangeEvent) -> Self {
        self.event = event;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn join(request: &SubscriptionRequest, access_token: Option<&str>, msg_ref: &str) -> Self {
        let mut change = json!({
            "event": request.event.as_str(),
            "schema": request.schema,
            "table": request.table,
        });
        if let Some(filter) = &request.filter {
            change["filter"] = json!(filter);
        }

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }

        Self {
            topic: request.topic(),
            event: "phx_join".to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Decoded server frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Change(ChangePayload),
    /// Reply to one of our frames, keyed by its ref
    Reply { msg_ref: Option<String>, ok: bool, message: Option<String> },
    /// The server closed or errored the channel
    ChannelClosed { reason: String },
    /// Presence, broadcast, system notices and anything else we do not act on
    Ignored,
}

pub fn decode(text: &str) -> Result<Incoming> {
    let message: PhoenixMessage = serde_json::from_str(text)
        .map_err(|e| BackendError::new(format!("Failed to parse realtime message: {}", e)))?;

    match message.event.as_str() {
        "postgres_changes" => {
            let data = message
                .payload
                .get("data")
                .cloned()
                .ok_or_else(|| BackendError::new("Realtime change without data"))?;
            Ok(Incoming::Change(serde_json::from_value(data)?))
        }
        // Older servers push the change itself with the change kind as the event
        "INSERT" | "UPDATE" | "DELETE" => Ok(Incoming::Change(serde_json::from_value(message.payload)?)),
        "phx_reply" => {
            let ok = message.payload.get("status").and_then(|s| s.as_str()) == Some("ok");
            let reason = message
                .payload
                .get("response")
                .and_then(|r| r.get("reason").or_else(|| r.get("message")))
                .and_then(|r| r.as_str())
                .map(|s| s.to_string());
            Ok(Incoming::Reply {
                msg_ref: message.msg_ref,
                ok,
                message: reason,
            })
        }
        "phx_error" => Ok(Incoming::ChannelClosed {
            reason: "channel error".to_string(),
        }),
        "phx_close" => Ok(Incoming::ChannelClosed {
            reason: "channel closed by server".to_string(),
        }),
        "system" => {
            let failed = message.payload.get("status").and_then(|s| s.as_str()) == Some("error");
            if failed {
                let reason = message
                    .payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("subscription error")
                    .to_string();
                Ok(Incoming::ChannelClosed { reason })
            } else {
                Ok(Incoming::Ignored)
            }
        }
        _ => Ok(Incoming::Ignored),
    }
}
