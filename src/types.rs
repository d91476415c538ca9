use crate::error::{Result, TvError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application identifier as used by the TV (opaque)
pub type AppId = String;

/// Artwork content identifier (e.g. `"MY_F0003"`)
pub type ArtworkId = String;

/// Default secure port for the remote and art channels
pub const DEFAULT_TLS_PORT: u16 = 8002;

/// Default plaintext port for the application-control channel and REST API
pub const DEFAULT_PLAIN_PORT: u16 = 8001;

/// Network location of a single TV
///
/// Immutable once constructed; invalid values are rejected by [`DeviceEndpoint::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    host: String,
    remote_port: u16,
    control_port: u16,
    use_tls: bool,
    mac: Option<[u8; 6]>,
}

impl DeviceEndpoint {
    /// Create a validated endpoint
    ///
    /// `mac` accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
    pub fn new(
        host: impl Into<String>,
        remote_port: u16,
        control_port: u16,
        use_tls: bool,
        mac: Option<&str>,
    ) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(TvError::InvalidEndpoint("host is empty".to_string()));
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#') {
            return Err(TvError::InvalidEndpoint(format!("invalid host: {}", host)));
        }
        if remote_port == 0 || control_port == 0 {
            return Err(TvError::InvalidEndpoint("port must be non-zero".to_string()));
        }
        let mac = mac.map(parse_mac).transpose()?;

        Ok(Self {
            host,
            remote_port,
            control_port,
            use_tls,
            mac,
        })
    }

    /// Endpoint with the usual port layout: TLS on 8002, plaintext control on 8001
    pub fn with_defaults(host: impl Into<String>) -> Result<Self> {
        Self::new(host, DEFAULT_TLS_PORT, DEFAULT_PLAIN_PORT, true, None)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn mac(&self) -> Option<[u8; 6]> {
        self.mac
    }
}

fn parse_mac(raw: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = raw.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(TvError::InvalidEndpoint(format!("invalid MAC address: {}", raw)));
    }

    let mut mac = [0u8; 6];
    for (slot, part) in mac.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| TvError::InvalidEndpoint(format!("invalid MAC address: {}", raw)))?;
    }
    Ok(mac)
}

/// The three independent WebSocket channels a TV exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Remote-input channel (keys, text, cursor)
    Remote,
    /// Application-control channel
    Control,
    /// Frame art-mode channel
    Art,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Remote, ChannelKind::Control, ChannelKind::Art];

    /// Whether this channel runs the token handshake after opening
    pub fn requires_auth(self) -> bool {
        !matches!(self, ChannelKind::Art)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Remote => "remote",
            ChannelKind::Control => "control",
            ChannelKind::Art => "art",
        };
        f.write_str(name)
    }
}

/// Connection lifecycle state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Closing,
}

/// Terminal condition that stops automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFault {
    /// The retry ceiling was exceeded
    Unavailable,
    /// The TV refused the token
    AuthRejected,
}

/// Observable status of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Set when the supervisor has given up; cleared on the next explicit restart
    pub fault: Option<ChannelFault>,
    /// Consecutive failed connection attempts
    pub retry_count: u32,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }
}

/// Whether the TV supports art mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtSupport {
    /// Not yet determined from a device event
    #[default]
    Unknown,
    /// The TV reported it has no art mode (terminal)
    Unsupported,
    Supported,
}

/// Art mode status as reported by the TV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtModeStatus {
    On,
    Off,
    /// Supported but currently unreachable (art channel down)
    Unavailable,
    #[default]
    Unknown,
}

impl ArtModeStatus {
    pub(crate) fn from_wire(value: &str) -> Option<Self> {
        match value {
            "on" => Some(ArtModeStatus::On),
            "off" => Some(ArtModeStatus::Off),
            _ => None,
        }
    }
}

/// Slideshow (auto rotation) settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlideshowStatus {
    /// `"off"` or the rotation interval in minutes
    pub value: String,
    /// Category the slideshow draws from (e.g. `"MY-C0002"`)
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub shuffle: bool,
}

impl SlideshowStatus {
    pub fn is_enabled(&self) -> bool {
        self.value != "off" && !self.value.is_empty()
    }
}

/// Snapshot of the art-mode session
///
/// `current_artwork_id` and `current_artwork_label` always come from the same event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtSessionSnapshot {
    pub support: ArtSupport,
    pub status: ArtModeStatus,
    pub current_artwork_id: Option<ArtworkId>,
    pub current_artwork_label: Option<String>,
    /// 0-100
    pub brightness: Option<u8>,
    /// 0-100
    pub color_temperature: Option<u8>,
    pub matte_style: Option<String>,
    pub photo_filter: Option<String>,
    pub slideshow: Option<SlideshowStatus>,
    /// Art API version reported by the TV
    pub api_version: Option<String>,
}

impl ArtSessionSnapshot {
    pub fn supported(&self) -> bool {
        self.support == ArtSupport::Supported
    }
}

/// Artwork entry from the TV's content list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkInfo {
    pub content_id: ArtworkId,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub matte_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Matte styles and colors the TV offers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatteList {
    /// Matte types, e.g. `shadowbox` or `modernthin`
    pub types: Vec<String>,
    /// Matte colors, e.g. `polar` or `black`
    pub colors: Vec<String>,
}

impl MatteList {
    /// Matte id as `change_matte` expects it: `<type>_<color>`, or `none`
    pub fn matte_id(matte_type: &str, color: Option<&str>) -> String {
        match color {
            Some(color) if matte_type != "none" => format!("{}_{}", matte_type, color),
            _ => matte_type.to_string(),
        }
    }
}

/// Photo filter entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoFilter {
    #[serde(rename = "filter_id")]
    pub id: String,
    #[serde(rename = "filter_name", default)]
    pub name: Option<String>,
}

/// Power hint derived from channel activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerHint {
    #[default]
    Unknown,
    On,
    Off,
}

/// Installed application as reported by `ed.installedApp.get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(rename = "appId")]
    pub app_id: AppId,
    pub name: String,
    #[serde(default)]
    pub app_type: Option<u32>,
}

/// Reply to `ms.application.get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub id: AppId,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub visible: bool,
}

/// How `launch_app` reaches the TV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMethod {
    /// `ms.application.start` on the control channel
    #[default]
    Standard,
    /// `ed.apps.launch` emitted on the remote channel
    Remote,
    /// `POST /api/v2/applications/{id}` on the REST endpoint
    RestFallback,
}

/// Shared device state
///
/// Written only by the event dispatcher; readers get whole snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub running_app: Option<AppId>,
    pub app_visible: bool,
    pub power: PowerHint,
    pub touch_enabled: bool,
    pub installed_apps: Vec<AppInfo>,
    pub remote: ChannelStatus,
    pub control: ChannelStatus,
    pub art_channel: ChannelStatus,
    pub art: ArtSessionSnapshot,
}

impl DeviceState {
    pub fn channel(&self, kind: ChannelKind) -> &ChannelStatus {
        match kind {
            ChannelKind::Remote => &self.remote,
            ChannelKind::Control => &self.control,
            ChannelKind::Art => &self.art_channel,
        }
    }

    pub(crate) fn channel_mut(&mut self, kind: ChannelKind) -> &mut ChannelStatus {
        match kind {
            ChannelKind::Remote => &mut self.remote,
            ChannelKind::Control => &mut self.control,
            ChannelKind::Art => &mut self.art_channel,
        }
    }
}
