//! Wire envelopes for the TV's WebSocket channels.
//!
//! Outbound frames are `{"method": ..., "params": ...}` objects. Inbound frames
//! are `{"event": ..., "data": ...}` objects; art replies arrive wrapped in a
//! `d2d_service_message` whose `data` is itself a JSON document in a string.
//! Everything here is pure and synchronous.

use crate::error::DecodeError;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Event names used on the wire
pub mod events {
    pub const CHANNEL_CONNECT: &str = "ms.channel.connect";
    pub const CHANNEL_READY: &str = "ms.channel.ready";
    pub const CHANNEL_UNAUTHORIZED: &str = "ms.channel.unauthorized";
    pub const CHANNEL_TIMEOUT: &str = "ms.channel.timeOut";
    pub const CHANNEL_CLIENT_CONNECT: &str = "ms.channel.clientConnect";
    pub const CHANNEL_CLIENT_DISCONNECT: &str = "ms.channel.clientDisconnect";
    pub const ERROR: &str = "ms.error";

    pub const TOUCH_ENABLE: &str = "ms.remote.touchEnable";
    pub const TOUCH_DISABLE: &str = "ms.remote.touchDisable";
    pub const INSTALLED_APPS: &str = "ed.installedApp.get";
    pub const APPS_LAUNCH: &str = "ed.apps.launch";
    pub const APPLICATION_GET: &str = "ms.application.get";

    pub const D2D_SERVICE_MESSAGE: &str = "d2d_service_message";
    pub const ART_APP_REQUEST: &str = "art_app_request";
}

/// Outbound command
///
/// Serializes to `{"method": "<name>", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Command {
    #[serde(rename = "ms.remote.control")]
    RemoteControl(RemoteControl),
    #[serde(rename = "ms.channel.emit")]
    ChannelEmit(ChannelEmit),
    #[serde(rename = "ms.application.start")]
    ApplicationStart(ApplicationTarget),
    #[serde(rename = "ms.application.get")]
    ApplicationGet(ApplicationTarget),
    #[serde(rename = "ms.application.stop")]
    ApplicationStop(ApplicationTarget),
}

/// Parameters of `ms.remote.control`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteControl {
    #[serde(rename = "Cmd")]
    pub cmd: String,
    #[serde(rename = "DataOfCmd", default, skip_serializing_if = "Option::is_none")]
    pub data_of_cmd: Option<String>,
    #[serde(rename = "Option", default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(rename = "TypeOfRemote", default, skip_serializing_if = "Option::is_none")]
    pub type_of_remote: Option<String>,
    #[serde(rename = "Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CursorPosition>,
}

/// Cursor target for `ProcessMouseDevice` moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "Time")]
    pub time: String,
}

/// Key action for `SendRemoteKey`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Click,
    Press,
    Release,
}

impl KeyAction {
    fn as_str(self) -> &'static str {
        match self {
            KeyAction::Click => "Click",
            KeyAction::Press => "Press",
            KeyAction::Release => "Release",
        }
    }
}

impl RemoteControl {
    /// A key event such as `KEY_POWER`
    pub fn key(action: KeyAction, code: impl Into<String>) -> Self {
        Self {
            cmd: action.as_str().to_string(),
            data_of_cmd: Some(code.into()),
            option: Some("false".to_string()),
            type_of_remote: Some("SendRemoteKey".to_string()),
            position: None,
        }
    }

    /// Text input; the text travels base64 encoded in `Cmd`
    pub fn text(text: &str) -> Self {
        Self {
            cmd: encode_payload(text.as_bytes()),
            data_of_cmd: Some("base64".to_string()),
            option: None,
            type_of_remote: Some("SendInputString".to_string()),
            position: None,
        }
    }

    /// Move the pointer to absolute coordinates
    pub fn cursor_move(x: i32, y: i32, duration_ms: u64) -> Self {
        Self {
            cmd: "Move".to_string(),
            data_of_cmd: None,
            option: None,
            type_of_remote: Some("ProcessMouseDevice".to_string()),
            position: Some(CursorPosition {
                x,
                y,
                time: duration_ms.to_string(),
            }),
        }
    }

    /// Recover the text of a `SendInputString` command
    pub fn decoded_text(&self) -> Option<String> {
        if self.type_of_remote.as_deref() != Some("SendInputString") {
            return None;
        }
        let bytes = decode_payload(&self.cmd).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Parameters of `ms.channel.emit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEmit {
    pub event: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Target of the `ms.application.*` methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTarget {
    pub id: String,
}

/// Request sent to the art application
///
/// Travels as a JSON string inside an `art_app_request` emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtRequest {
    pub request: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
    pub id: String,
}

impl ArtRequest {
    /// Create a request with a fresh correlation id
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            params: Map::new(),
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Add a request parameter
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Wrap into the channel emit the art application expects
    pub fn into_command(self) -> Result<Command, serde_json::Error> {
        let data = serde_json::to_string(&self)?;
        Ok(Command::ChannelEmit(ChannelEmit {
            event: events::ART_APP_REQUEST.to_string(),
            to: "host".to_string(),
            data: Some(Value::String(data)),
        }))
    }

    /// Extract the art request carried by a command, if any
    pub fn from_command(command: &Command) -> Option<Self> {
        match command {
            Command::ChannelEmit(emit) if emit.event == events::ART_APP_REQUEST => {
                let raw = emit.data.as_ref()?.as_str()?;
                serde_json::from_str(raw).ok()
            }
            _ => None,
        }
    }
}

impl Command {
    /// Launch an app through the remote channel
    pub fn launch_app(app_id: &str, action_type: &str, meta_tag: &str) -> Self {
        Command::ChannelEmit(ChannelEmit {
            event: events::APPS_LAUNCH.to_string(),
            to: "host".to_string(),
            data: Some(serde_json::json!({
                "appId": app_id,
                "action_type": action_type,
                "metaTag": meta_tag,
            })),
        })
    }

    /// Ask the TV for its installed application list
    pub fn installed_apps() -> Self {
        Command::ChannelEmit(ChannelEmit {
            event: events::INSTALLED_APPS.to_string(),
            to: "host".to_string(),
            data: None,
        })
    }
}

/// Serialize a command into a text frame
pub fn encode(command: &Command) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

/// Parse an outbound frame back into a command
pub fn decode_command(frame: &[u8]) -> Result<Command, DecodeError> {
    serde_json::from_slice(frame).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Event name; for art replies this is the inner event
    pub event: String,
    /// Event payload with nested JSON strings already expanded
    pub data: Value,
    /// Request id echoed inside art replies, if any
    pub request_id: Option<String>,
}

impl InboundMessage {
    /// String field of the payload
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Connection lifecycle meaning of this message, if any
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match self.event.as_str() {
            events::CHANNEL_CONNECT => Some(Lifecycle::Granted {
                token: self.data.get("token").and_then(token_value),
            }),
            events::CHANNEL_READY => Some(Lifecycle::Ready),
            events::CHANNEL_UNAUTHORIZED | events::CHANNEL_TIMEOUT => {
                Some(Lifecycle::Rejected(self.event.clone()))
            }
            _ => None,
        }
    }
}

/// Connection lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Authentication granted, possibly with a freshly issued token
    Granted { token: Option<String> },
    /// Channel ready for traffic
    Ready,
    /// The TV refused the client (unauthorized or the pairing prompt timed out)
    Rejected(String),
}

fn token_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse and validate an inbound frame
pub fn decode(frame: &[u8]) -> Result<InboundMessage, DecodeError> {
    let envelope: Value =
        serde_json::from_slice(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let event = envelope
        .get("event")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingEvent)?
        .to_string();
    let data = expand_nested(envelope.get("data").cloned().unwrap_or(Value::Null));

    if event == events::D2D_SERVICE_MESSAGE {
        let inner_event = data
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::Payload("d2d message without event".to_string()))?
            .to_string();
        let request_id = correlation_id(&data);
        return Ok(InboundMessage {
            event: inner_event,
            data,
            request_id,
        });
    }

    Ok(InboundMessage {
        event,
        data,
        request_id: None,
    })
}

/// JSON documents the TV embeds as strings are expanded in place
fn expand_nested(data: Value) -> Value {
    match data {
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(nested @ (Value::Object(_) | Value::Array(_))) => nested,
            _ => Value::String(raw),
        },
        other => other,
    }
}

fn correlation_id(data: &Value) -> Option<String> {
    data.get("request_id")
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Base64 encode a binary payload for embedding in a frame
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decode a base64 payload embedded in a frame
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| DecodeError::Payload(e.to_string()))
}
