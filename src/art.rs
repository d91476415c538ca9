//! Art-mode vocabulary and session state machine.
//!
//! Support moves `Unknown -> Unsupported` (terminal) or
//! `Unknown -> Supported(On | Off | Unavailable)`, driven only by events the
//! TV reports. Set requests never touch the snapshot; values change when the
//! TV confirms them with its own event.

use crate::error::DecodeError;
use crate::protocol::{decode_payload, events, ArtRequest, InboundMessage};
use crate::types::{
    ArtModeStatus, ArtSessionSnapshot, ArtSupport, ArtworkInfo, MatteList, PhotoFilter,
    SlideshowStatus,
};
use bytes::Bytes;
use serde_json::Value;

/// Correlation keys for art requests
///
/// Each key names the request it belongs to, so a get and the set of the
/// same setting never share a slot.
pub mod keys {
    pub const API_VERSION: &str = "api_version";
    pub const ARTMODE_STATUS: &str = "get_artmode_status";
    pub const SET_ARTMODE: &str = "set_artmode_status";
    pub const CURRENT_ARTWORK: &str = "get_current_artwork";
    pub const SELECT_IMAGE: &str = "select_image";
    pub const SETTINGS: &str = "get_artmode_settings";
    pub const BRIGHTNESS: &str = "set_brightness";
    pub const COLOR_TEMPERATURE: &str = "set_color_temperature";
    pub const MATTE: &str = "change_matte";
    pub const PHOTO_FILTER: &str = "set_photo_filter";
    pub const SLIDESHOW: &str = "get_slideshow_status";
    pub const SET_SLIDESHOW: &str = "set_slideshow_status";
    pub const CONTENT_LIST: &str = "get_content_list";
    pub const MATTE_LIST: &str = "get_matte_list";
    pub const PHOTO_FILTER_LIST: &str = "get_photo_filter_list";

    /// Thumbnails are correlated per artwork
    pub fn thumbnail(artwork_id: &str) -> String {
        format!("get_thumbnail:{}", artwork_id)
    }

    pub fn favorite(artwork_id: &str) -> String {
        format!("change_favorite:{}", artwork_id)
    }

    pub fn delete(artwork_ids: &[&str]) -> String {
        format!("delete_image_list:{}", artwork_ids.join(","))
    }
}

/// An art request together with the reply it waits for
#[derive(Debug, Clone)]
pub struct ArtCall {
    pub request: ArtRequest,
    pub key: String,
    pub awaiting_event: &'static str,
}

impl ArtCall {
    fn new(request: ArtRequest, awaiting_event: &'static str) -> Self {
        let key = request.request.clone();
        Self::keyed(request, key, awaiting_event)
    }

    fn keyed(request: ArtRequest, key: impl Into<String>, awaiting_event: &'static str) -> Self {
        Self {
            request,
            key: key.into(),
            awaiting_event,
        }
    }

    /// Id the TV echoes in its reply
    pub fn request_id(&self) -> &str {
        &self.request.id
    }

    pub fn api_version() -> Self {
        Self::new(ArtRequest::new("api_version"), "api_version")
    }

    pub fn artmode_status() -> Self {
        Self::new(ArtRequest::new("get_artmode_status"), "artmode_status")
    }

    pub fn set_artmode(on: bool) -> Self {
        let value = if on { "on" } else { "off" };
        Self::new(
            ArtRequest::new("set_artmode_status").with_param("value", value),
            "art_mode_changed",
        )
    }

    pub fn current_artwork() -> Self {
        Self::new(ArtRequest::new("get_current_artwork"), "current_artwork")
    }

    pub fn select_image(content_id: &str, category: Option<&str>, show: bool) -> Self {
        let mut request = ArtRequest::new("select_image")
            .with_param("content_id", content_id)
            .with_param("show", show);
        if let Some(category) = category {
            request = request.with_param("category_id", category);
        }
        Self::new(request, "image_selected")
    }

    pub fn settings() -> Self {
        Self::new(ArtRequest::new("get_artmode_settings"), "artmode_settings")
    }

    pub fn set_brightness(value: u8) -> Self {
        Self::new(
            ArtRequest::new("set_brightness").with_param("value", value),
            "brightness_changed",
        )
    }

    pub fn set_color_temperature(value: u8) -> Self {
        Self::new(
            ArtRequest::new("set_color_temperature").with_param("value", value),
            "color_temperature_changed",
        )
    }

    pub fn change_matte(content_id: &str, matte_id: &str) -> Self {
        Self::new(
            ArtRequest::new("change_matte")
                .with_param("content_id", content_id)
                .with_param("matte_id", matte_id),
            "matte_changed",
        )
    }

    pub fn set_photo_filter(content_id: &str, filter_id: &str) -> Self {
        Self::new(
            ArtRequest::new("set_photo_filter")
                .with_param("content_id", content_id)
                .with_param("filter_id", filter_id),
            "photo_filter_applied",
        )
    }

    pub fn slideshow_status() -> Self {
        Self::new(ArtRequest::new("get_slideshow_status"), "slideshow_status")
    }

    /// `minutes == None` turns the slideshow off
    pub fn set_slideshow(minutes: Option<u32>, shuffle: bool, category_id: &str) -> Self {
        let value = minutes.map_or_else(|| "off".to_string(), |m| m.to_string());
        let kind = if shuffle { "shuffleslideshow" } else { "slideshow" };
        Self::new(
            ArtRequest::new("set_slideshow_status")
                .with_param("value", value)
                .with_param("category_id", category_id)
                .with_param("type", kind),
            "slideshow_changed",
        )
    }

    pub fn content_list(category: Option<&str>) -> Self {
        Self::new(
            ArtRequest::new("get_content_list").with_param("category", category),
            "content_list",
        )
    }

    pub fn thumbnail(content_id: &str) -> Self {
        Self::keyed(
            ArtRequest::new("get_thumbnail").with_param("content_id", content_id),
            keys::thumbnail(content_id),
            "thumbnail",
        )
    }

    pub fn matte_list() -> Self {
        Self::new(ArtRequest::new("get_matte_list"), "matte_list")
    }

    pub fn photo_filter_list() -> Self {
        Self::new(ArtRequest::new("get_photo_filter_list"), "photo_filter_list")
    }

    pub fn set_favorite(content_id: &str, favorite: bool) -> Self {
        Self::keyed(
            ArtRequest::new("change_favorite")
                .with_param("content_id", content_id)
                .with_param("status", if favorite { "on" } else { "off" }),
            keys::favorite(content_id),
            "favorite_changed",
        )
    }

    pub fn delete(content_ids: &[&str]) -> Self {
        let list: Vec<Value> = content_ids
            .iter()
            .map(|id| serde_json::json!({ "content_id": id }))
            .collect();
        Self::keyed(
            ArtRequest::new("delete_image_list").with_param("content_id_list", list),
            keys::delete(content_ids),
            "image_deleted",
        )
    }
}

/// Decoded art-channel event
#[derive(Debug, Clone, PartialEq)]
pub enum ArtEvent {
    Status(ArtModeStatus),
    /// The art application is absent on this TV
    Unsupported,
    CurrentArtwork {
        id: String,
        label: Option<String>,
        matte_id: Option<String>,
    },
    Brightness(u8),
    ColorTemperature(u8),
    Settings {
        brightness: Option<u8>,
        color_temperature: Option<u8>,
    },
    Matte(String),
    PhotoFilter(String),
    Slideshow(SlideshowStatus),
    ContentList(Vec<ArtworkInfo>),
    Thumbnail {
        id: String,
        bytes: Bytes,
    },
    ApiVersion(String),
    MatteList(MatteList),
    PhotoFilters(Vec<PhotoFilter>),
    Favorite {
        id: String,
        favorite: bool,
    },
    Deleted(Vec<String>),
    /// The TV rejected a request
    Error {
        request: String,
        code: String,
        content_id: Option<String>,
        /// Id of the rejected request, when the TV echoes it
        request_id: Option<String>,
    },
}

impl ArtEvent {
    /// Classify an art-channel message
    ///
    /// `Ok(None)` means the event is not part of the known vocabulary.
    pub fn parse(message: &InboundMessage) -> Result<Option<Self>, DecodeError> {
        let data = &message.data;
        let event = match message.event.as_str() {
            "artmode_status" | "get_artmode_status" | "art_mode_changed" | "set_artmode_status" => {
                let raw = str_of(data, &["value", "status"])
                    .ok_or_else(|| missing(&message.event, "value"))?;
                match ArtModeStatus::from_wire(raw) {
                    Some(status) => ArtEvent::Status(status),
                    None => return Err(DecodeError::Payload(format!("unknown art mode status: {}", raw))),
                }
            }
            "current_artwork" | "get_current_artwork" | "image_selected" => {
                let id = str_of(data, &["content_id", "id"])
                    .ok_or_else(|| missing(&message.event, "content_id"))?;
                ArtEvent::CurrentArtwork {
                    id: id.to_string(),
                    label: str_of(data, &["label", "title"]).map(str::to_string),
                    matte_id: str_of(data, &["matte_id"]).map(str::to_string),
                }
            }
            "brightness" | "get_brightness" | "brightness_changed" => ArtEvent::Brightness(
                percent(data.get("value")).ok_or_else(|| missing(&message.event, "value"))?,
            ),
            "color_temperature" | "get_color_temperature" | "color_temperature_changed" => {
                ArtEvent::ColorTemperature(
                    percent(data.get("value")).ok_or_else(|| missing(&message.event, "value"))?,
                )
            }
            "artmode_settings" | "get_artmode_settings" => parse_settings(data)?,
            "matte_changed" | "change_matte" => ArtEvent::Matte(
                str_of(data, &["matte_id"])
                    .ok_or_else(|| missing(&message.event, "matte_id"))?
                    .to_string(),
            ),
            "photo_filter_applied" | "set_photo_filter" | "filter_changed" => ArtEvent::PhotoFilter(
                str_of(data, &["filter_id"])
                    .ok_or_else(|| missing(&message.event, "filter_id"))?
                    .to_string(),
            ),
            "slideshow_status"
            | "get_slideshow_status"
            | "slideshow_changed"
            | "auto_rotation_status"
            | "get_auto_rotation_status"
            | "auto_rotation_changed" => {
                let value = str_of(data, &["value"])
                    .ok_or_else(|| missing(&message.event, "value"))?;
                ArtEvent::Slideshow(SlideshowStatus {
                    value: value.to_string(),
                    category_id: str_of(data, &["category_id"]).map(str::to_string),
                    shuffle: str_of(data, &["type"]).is_some_and(|t| t.contains("shuffle")),
                })
            }
            "content_list" | "get_content_list" => parse_content_list(data)?,
            "thumbnail" | "get_thumbnail" => {
                let id = str_of(data, &["content_id", "id"])
                    .ok_or_else(|| missing(&message.event, "content_id"))?;
                let encoded = str_of(data, &["thumbnail", "data"])
                    .ok_or_else(|| missing(&message.event, "thumbnail"))?;
                ArtEvent::Thumbnail {
                    id: id.to_string(),
                    bytes: Bytes::from(decode_payload(encoded)?),
                }
            }
            "api_version" | "get_api_version" => ArtEvent::ApiVersion(
                str_of(data, &["version"])
                    .ok_or_else(|| missing(&message.event, "version"))?
                    .to_string(),
            ),
            "matte_list" | "get_matte_list" => ArtEvent::MatteList(MatteList {
                types: string_list(data, "matte_type_list", "matte_type")?,
                colors: string_list(data, "matte_color_list", "color").unwrap_or_default(),
            }),
            "photo_filter_list" | "get_photo_filter_list" => {
                let list = nested(data.get("filter_list"))
                    .ok_or_else(|| missing(&message.event, "filter_list"))?;
                ArtEvent::PhotoFilters(
                    serde_json::from_value(list).map_err(|e| DecodeError::Payload(e.to_string()))?,
                )
            }
            "favorite_changed" | "change_favorite" => ArtEvent::Favorite {
                id: str_of(data, &["content_id"])
                    .ok_or_else(|| missing(&message.event, "content_id"))?
                    .to_string(),
                favorite: str_of(data, &["status"]) == Some("on"),
            },
            "image_deleted" | "delete_image_list" => {
                ArtEvent::Deleted(string_list(data, "content_id_list", "content_id")?)
            }
            "error" => parse_error(data),
            events::ERROR => ArtEvent::Unsupported,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Correlation key of the pending request a reply answers
///
/// Derived from the reply's own event name, so a status report never stands
/// in for the confirmation of a set.
pub fn reply_key(event_name: &str, event: &ArtEvent) -> Option<String> {
    match event {
        ArtEvent::Thumbnail { id, .. } => return Some(keys::thumbnail(id)),
        ArtEvent::Favorite { id, .. } => return Some(keys::favorite(id)),
        ArtEvent::Deleted(ids) => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            return Some(keys::delete(&ids));
        }
        ArtEvent::Error {
            request,
            content_id,
            ..
        } => return key_for_request(request, content_id.as_deref()),
        ArtEvent::Unsupported => return None,
        _ => {}
    }

    let key = match event_name {
        "api_version" | "get_api_version" => keys::API_VERSION,
        "artmode_status" | "get_artmode_status" => keys::ARTMODE_STATUS,
        "art_mode_changed" | "set_artmode_status" => keys::SET_ARTMODE,
        "current_artwork" | "get_current_artwork" => keys::CURRENT_ARTWORK,
        "image_selected" => keys::SELECT_IMAGE,
        "artmode_settings" | "get_artmode_settings" => keys::SETTINGS,
        "brightness_changed" | "set_brightness" => keys::BRIGHTNESS,
        "color_temperature_changed" | "set_color_temperature" => keys::COLOR_TEMPERATURE,
        "matte_changed" | "change_matte" => keys::MATTE,
        "photo_filter_applied" | "set_photo_filter" | "filter_changed" => keys::PHOTO_FILTER,
        "slideshow_status"
        | "get_slideshow_status"
        | "auto_rotation_status"
        | "get_auto_rotation_status" => keys::SLIDESHOW,
        "slideshow_changed" | "set_slideshow_status" | "auto_rotation_changed" => {
            keys::SET_SLIDESHOW
        }
        "content_list" | "get_content_list" => keys::CONTENT_LIST,
        "matte_list" | "get_matte_list" => keys::MATTE_LIST,
        "photo_filter_list" | "get_photo_filter_list" => keys::PHOTO_FILTER_LIST,
        _ => return None,
    };
    Some(key.to_string())
}

/// Correlation key of the request named `request`
fn key_for_request(request: &str, content_id: Option<&str>) -> Option<String> {
    match request {
        "get_api_version" => Some(keys::API_VERSION.to_string()),
        "get_thumbnail" => content_id.map(keys::thumbnail),
        "change_favorite" => content_id.map(keys::favorite),
        // Batched deletes are only matched by request id
        "delete_image_list" | "" => None,
        other => Some(other.to_string()),
    }
}

/// Whether an error reply to `request` means the art app is missing
fn is_support_probe(request: &str) -> bool {
    matches!(request, "api_version" | "get_api_version" | "get_artmode_status")
}

/// What applying an event changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub changed: bool,
    /// `(previous, current)` when the current artwork ID moved
    pub artwork_changed: Option<(Option<String>, Option<String>)>,
}

/// Apply a device event to the snapshot
pub fn apply(snapshot: &mut ArtSessionSnapshot, event: &ArtEvent) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    if snapshot.support == ArtSupport::Unsupported {
        return outcome;
    }

    let before = snapshot.clone();
    match event {
        ArtEvent::Status(status) => {
            snapshot.support = ArtSupport::Supported;
            snapshot.status = *status;
        }
        ArtEvent::ApiVersion(version) => {
            snapshot.support = ArtSupport::Supported;
            snapshot.api_version = Some(version.clone());
        }
        ArtEvent::Unsupported => {
            if snapshot.support == ArtSupport::Unknown {
                snapshot.support = ArtSupport::Unsupported;
            }
        }
        ArtEvent::Error { request, .. } => {
            if snapshot.support == ArtSupport::Unknown && is_support_probe(request) {
                snapshot.support = ArtSupport::Unsupported;
            }
        }
        ArtEvent::CurrentArtwork {
            id,
            label,
            matte_id,
        } => {
            // id and label always replace each other as a pair
            snapshot.current_artwork_id = Some(id.clone());
            snapshot.current_artwork_label = label.clone();
            if let Some(matte_id) = matte_id {
                snapshot.matte_style = Some(matte_id.clone());
            }
        }
        ArtEvent::Brightness(value) => snapshot.brightness = Some(*value),
        ArtEvent::ColorTemperature(value) => snapshot.color_temperature = Some(*value),
        ArtEvent::Settings {
            brightness,
            color_temperature,
        } => {
            if brightness.is_some() {
                snapshot.brightness = *brightness;
            }
            if color_temperature.is_some() {
                snapshot.color_temperature = *color_temperature;
            }
        }
        ArtEvent::Matte(matte_id) => snapshot.matte_style = Some(matte_id.clone()),
        ArtEvent::PhotoFilter(filter_id) => snapshot.photo_filter = Some(filter_id.clone()),
        ArtEvent::Slideshow(status) => snapshot.slideshow = Some(status.clone()),
        ArtEvent::ContentList(_)
        | ArtEvent::Thumbnail { .. }
        | ArtEvent::MatteList(_)
        | ArtEvent::PhotoFilters(_)
        | ArtEvent::Favorite { .. }
        | ArtEvent::Deleted(_) => {}
    }

    outcome.changed = *snapshot != before;
    if snapshot.current_artwork_id != before.current_artwork_id {
        outcome.artwork_changed = Some((
            before.current_artwork_id.clone(),
            snapshot.current_artwork_id.clone(),
        ));
    }
    outcome
}

/// The art channel dropped; a supported session becomes unavailable
pub fn mark_unreachable(snapshot: &mut ArtSessionSnapshot) -> bool {
    if snapshot.support == ArtSupport::Supported && snapshot.status != ArtModeStatus::Unavailable {
        snapshot.status = ArtModeStatus::Unavailable;
        return true;
    }
    false
}

fn missing(event: &str, field: &str) -> DecodeError {
    DecodeError::Payload(format!("{} without {}", event, field))
}

fn str_of<'a>(data: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|field| data.get(*field).and_then(Value::as_str))
}

/// 0-100 value sent either as a number or a numeric string
fn percent(value: Option<&Value>) -> Option<u8> {
    let raw = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    Some(raw.min(100) as u8)
}

/// Payload fields that may arrive either inline or as a JSON string
fn nested(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        other => Some(other.clone()),
    }
}

fn parse_settings(data: &Value) -> Result<ArtEvent, DecodeError> {
    let items = nested(data.get("data"))
        .ok_or_else(|| DecodeError::Payload("artmode settings without data".to_string()))?;
    let items = items
        .as_array()
        .ok_or_else(|| DecodeError::Payload("artmode settings data is not a list".to_string()))?;

    let find = |name: &str| {
        items
            .iter()
            .find(|item| item.get("item").and_then(Value::as_str) == Some(name))
            .and_then(|item| percent(item.get("value")))
    };

    Ok(ArtEvent::Settings {
        brightness: find("brightness"),
        color_temperature: find("color_temperature"),
    })
}

fn parse_content_list(data: &Value) -> Result<ArtEvent, DecodeError> {
    let list = nested(data.get("content_list"))
        .ok_or_else(|| DecodeError::Payload("content list missing".to_string()))?;
    let artworks: Vec<ArtworkInfo> =
        serde_json::from_value(list).map_err(|e| DecodeError::Payload(e.to_string()))?;
    Ok(ArtEvent::ContentList(artworks))
}

fn parse_error(data: &Value) -> ArtEvent {
    let request_data = nested(data.get("request_data")).unwrap_or(Value::Null);
    ArtEvent::Error {
        request: str_of(&request_data, &["request"])
            .unwrap_or_default()
            .to_string(),
        code: match data.get("error_code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => "unknown".to_string(),
        },
        content_id: str_of(&request_data, &["content_id"]).map(str::to_string),
        request_id: str_of(&request_data, &["request_id", "id"])
            .or_else(|| str_of(data, &["request_id", "id"]))
            .map(str::to_string),
    }
}

/// Values of `field` from a list of objects stored under `list`
fn string_list(data: &Value, list: &str, field: &str) -> Result<Vec<String>, DecodeError> {
    let items = nested(data.get(list))
        .ok_or_else(|| DecodeError::Payload(format!("{} missing", list)))?;
    let items = items
        .as_array()
        .ok_or_else(|| DecodeError::Payload(format!("{} is not a list", list)))?;
    Ok(items
        .iter()
        .filter_map(|item| item.get(field).and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}
