use crate::reconnect::ReconnectConfig;
use std::time::Duration;

/// WebSocket keepalive settings
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often a ping is sent
    pub interval: Duration,
    /// Silence longer than this is treated as a dropped connection
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Client behaviour knobs
///
/// Every field has a working default; override the ones you need:
///
/// ```
/// use samsungtv_ws::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     name: "Living Room Hub".to_string(),
///     thumbnail_timeout: Duration::from_secs(10),
///     ..ClientConfig::default()
/// };
/// assert_eq!(config.cache_capacity, 32);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name shown in the TV's pairing prompt
    pub name: String,
    /// Bound on art request/reply round trips
    pub request_timeout: Duration,
    /// Bound on thumbnail fetches
    pub thumbnail_timeout: Duration,
    /// Bound on opening the transport
    pub connect_timeout: Duration,
    /// Bound on the token handshake (covers the on-screen pairing prompt)
    pub auth_timeout: Duration,
    /// How long an operation waits for an in-flight (re)connect
    pub connect_wait: Duration,
    /// `None` disables pings
    pub heartbeat: Option<HeartbeatConfig>,
    pub reconnect: ReconnectConfig,
    /// Maximum number of cached thumbnails
    pub cache_capacity: usize,
    /// Delay inserted after each key click
    pub key_press_delay: Option<Duration>,
    /// Plaintext REST port used for device info and the REST launch fallback
    pub rest_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "SamsungTvRemote".to_string(),
            request_timeout: Duration::from_secs(5),
            thumbnail_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(30),
            connect_wait: Duration::from_secs(2),
            heartbeat: Some(HeartbeatConfig::default()),
            reconnect: ReconnectConfig::default(),
            cache_capacity: 32,
            key_press_delay: None,
            rest_port: crate::types::DEFAULT_PLAIN_PORT,
        }
    }
}
