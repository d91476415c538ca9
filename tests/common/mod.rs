//! In-process fake TV serving the remote, control, and art channels on one port.

#![allow(dead_code)]

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use samsungtv_ws::{ClientConfig, DeviceEndpoint, ReconnectConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

pub const REMOTE: &str = "/api/v2/channels/samsung.remote.control";
pub const CONTROL: &str = "/api/v2";
pub const ART: &str = "/api/v2/channels/com.samsung.art-app";

/// How the fake TV answers
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Token sent with `ms.channel.connect`
    pub issue_token: Option<String>,
    /// Answer the handshake with `ms.channel.unauthorized`
    pub reject_auth: bool,
    /// Answer art requests; otherwise reply `ms.error`
    pub art_supported: bool,
    /// Confirm `set_*` art requests
    pub confirm_sets: bool,
    /// Answer thumbnail requests
    pub answer_thumbnails: bool,
    /// Delay before any art reply
    pub reply_delay: Duration,
    /// Greet remote/control with `ms.channel.ready` instead of `ms.channel.connect`
    pub greet_with_ready: bool,
    /// Send malformed frames right after the greeting, then `ms.remote.touchEnable`
    pub noise_after_greeting: bool,
    /// Stop reading after the greeting, so pings go unanswered
    pub stall: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            issue_token: None,
            reject_auth: false,
            art_supported: true,
            confirm_sets: true,
            answer_thumbnails: true,
            reply_delay: Duration::ZERO,
            greet_with_ready: false,
            noise_after_greeting: false,
            stall: false,
        }
    }
}

/// A frame the fake TV received
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub frame: Value,
}

struct Shared {
    behavior: Mutex<Behavior>,
    received: Mutex<Vec<Received>>,
    connections: Mutex<Vec<String>>,
    kick: watch::Sender<u64>,
}

pub struct FakeTv {
    pub port: u16,
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl FakeTv {
    pub async fn start(behavior: Behavior) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (kick, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            behavior: Mutex::new(behavior),
            received: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            kick,
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_shared.clone()));
            }
        });

        Self {
            port,
            shared,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new("127.0.0.1", self.port, self.port, false, None).unwrap()
    }

    pub fn set_behavior(&self, update: impl FnOnce(&mut Behavior)) {
        update(&mut self.shared.behavior.lock());
    }

    /// Request URIs of every accepted WebSocket, in order
    pub fn connections(&self) -> Vec<String> {
        self.shared.connections.lock().clone()
    }

    pub fn connections_to(&self, path: &str) -> Vec<String> {
        self.connections()
            .into_iter()
            .filter(|uri| uri_path(uri) == path)
            .collect()
    }

    pub fn received_on(&self, path: &str) -> Vec<Value> {
        self.shared
            .received
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .map(|r| r.frame.clone())
            .collect()
    }

    /// Art requests named `request`, decoded from their emit payload
    pub fn art_requests(&self, request: &str) -> Vec<Value> {
        self.received_on(ART)
            .into_iter()
            .filter_map(|frame| art_request(&frame))
            .filter(|req| req["request"] == request)
            .collect()
    }

    /// Drop every open socket without a close frame
    pub fn drop_connections(&self) {
        self.shared.kick.send_modify(|generation| *generation += 1);
    }

    /// Stop accepting and drop every open socket
    pub fn shutdown(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        self.drop_connections();
    }
}

impl Drop for FakeTv {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Log to the test output; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("samsungtv_ws=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Client settings scaled down for tests
pub fn test_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_millis(500),
        thumbnail_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(2),
        auth_timeout: Duration::from_secs(2),
        connect_wait: Duration::from_millis(500),
        heartbeat: None,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_retries: Some(3),
        },
        ..ClientConfig::default()
    }
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn uri_path(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

fn art_request(frame: &Value) -> Option<Value> {
    if frame["method"] != "ms.channel.emit" || frame["params"]["event"] != "art_app_request" {
        return None;
    }
    serde_json::from_str(frame["params"]["data"].as_str()?).ok()
}

fn d2d(inner: Value) -> Message {
    Message::Text(json!({"event": "d2d_service_message", "data": inner.to_string()}).to_string())
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let uri_slot = Arc::new(Mutex::new(String::new()));
    let slot = uri_slot.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *slot.lock() = req.uri().to_string();
        Ok(resp)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let uri = uri_slot.lock().clone();
    let path = uri_path(&uri).to_string();
    shared.connections.lock().push(uri.clone());
    let mut kick = shared.kick.subscribe();
    let (mut write, mut read) = ws.split();

    let behavior = shared.behavior.lock().clone();
    if path == REMOTE || path == CONTROL {
        if behavior.reject_auth {
            let _ = write
                .send(Message::Text(json!({"event": "ms.channel.unauthorized"}).to_string()))
                .await;
            return;
        }
        let greeting = if behavior.greet_with_ready {
            json!({"event": "ms.channel.ready", "data": {}})
        } else {
            let mut data = json!({"id": "fake", "clients": []});
            if let Some(token) = &behavior.issue_token {
                data["token"] = json!(token);
            }
            json!({"event": "ms.channel.connect", "data": data})
        };
        if write.send(Message::Text(greeting.to_string())).await.is_err() {
            return;
        }
        if behavior.noise_after_greeting {
            let frames = [
                "not json".to_string(),
                json!({"data": {"no": "event"}}).to_string(),
                json!({"event": "d2d_service_message", "data": "{}"}).to_string(),
                json!({"event": "ms.remote.touchEnable", "data": {}}).to_string(),
            ];
            for frame in frames {
                if write.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
        }
    } else if path == ART {
        let connect = json!({"event": "ms.channel.connect", "data": {}});
        if write.send(Message::Text(connect.to_string())).await.is_err() {
            return;
        }
    }

    if behavior.stall {
        // Hold the socket open without reading; pings are never answered
        let _ = kick.changed().await;
        return;
    }

    loop {
        tokio::select! {
            _ = kick.changed() => return,
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                };
                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                shared.received.lock().push(Received {
                    path: path.clone(),
                    frame: frame.clone(),
                });

                if path != ART {
                    continue;
                }
                let behavior = shared.behavior.lock().clone();
                let Some(reply) = art_reply(&frame, &behavior) else {
                    continue;
                };
                if !behavior.reply_delay.is_zero() {
                    tokio::time::sleep(behavior.reply_delay).await;
                }
                if write.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn art_reply(frame: &Value, behavior: &Behavior) -> Option<Message> {
    let request = art_request(frame)?;
    if !behavior.art_supported {
        return Some(Message::Text(
            json!({"event": "ms.error", "data": {"message": "unrecognized method value : ms.channel.emit"}})
                .to_string(),
        ));
    }

    let mut echo = true;
    let mut inner = match request["request"].as_str()? {
        "api_version" => json!({"event": "api_version", "version": "4.3.4.0"}),
        "get_artmode_status" => json!({"event": "artmode_status", "value": "on"}),
        "get_current_artwork" => {
            json!({"event": "current_artwork", "content_id": "A1", "label": "Sunset", "matte_id": "none"})
        }
        "get_artmode_settings" => json!({
            "event": "artmode_settings",
            "data": json!([
                {"item": "brightness", "value": "5"},
                {"item": "color_temperature", "value": "2"}
            ])
            .to_string()
        }),
        "set_artmode_status" if behavior.confirm_sets => {
            json!({"event": "art_mode_changed", "value": request["value"].clone()})
        }
        "set_artmode_status" => {
            // An unrelated status broadcast instead of the confirmation
            echo = false;
            json!({"event": "artmode_status", "value": "off"})
        }
        "set_brightness" if behavior.confirm_sets => {
            json!({"event": "brightness_changed", "value": request["value"].clone()})
        }
        "change_matte" if behavior.confirm_sets => {
            json!({"event": "matte_changed", "matte_id": request["matte_id"].clone()})
        }
        "change_favorite" if behavior.confirm_sets => json!({
            "event": "favorite_changed",
            "content_id": request["content_id"].clone(),
            "status": request["status"].clone(),
        }),
        "delete_image_list" if behavior.confirm_sets => json!({
            "event": "image_deleted",
            "content_id_list": request["content_id_list"].to_string(),
        }),
        "get_matte_list" => json!({
            "event": "matte_list",
            "matte_type_list": json!([{"matte_type": "none"}, {"matte_type": "shadowbox"}]).to_string(),
            "matte_color_list": json!([{"color": "polar"}]).to_string(),
        }),
        "get_photo_filter_list" => json!({
            "event": "photo_filter_list",
            "filter_list": json!([
                {"filter_id": "none", "filter_name": "None"},
                {"filter_id": "ink", "filter_name": "Ink"}
            ])
            .to_string(),
        }),
        "get_thumbnail" if behavior.answer_thumbnails => {
            let id = request["content_id"].as_str()?;
            json!({
                "event": "thumbnail",
                "content_id": id,
                "thumbnail": BASE64_STANDARD.encode(format!("jpeg:{}", id)),
            })
        }
        _ => return None,
    };
    if echo {
        inner["request_id"] = request["id"].clone();
    }
    Some(d2d(inner))
}
