//! Rust library for controlling Samsung TVs over their local WebSocket API
//!
//! This library provides an async client for the three channels a Samsung
//! Smart TV exposes on the local network. It supports:
//!
//! - Remote key presses, text input, and pointer movement (remote channel)
//! - Application launch and status (control channel, remote emit, or REST)
//! - Frame TV art mode: support detection, current artwork, brightness,
//!   color temperature, mattes, photo filters, slideshow, thumbnails
//! - Token pairing with host-supplied persistence
//! - Automatic reconnection with exponential backoff per channel
//! - Real-time state update subscriptions
//! - Wake-on-LAN and the REST device description
//!
//! # Quick Start
//!
//! ```no_run
//! use samsungtv_ws::{ClientConfig, DeviceEndpoint, LaunchMethod, MemoryTokenPersistence, SamsungTv};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = DeviceEndpoint::new("192.168.1.50", 8002, 8001, true, None)?;
//!     let tokens = Arc::new(MemoryTokenPersistence::new(None));
//!     let tv = SamsungTv::new(endpoint, ClientConfig::default(), tokens)?;
//!
//!     // The first connection shows a pairing prompt on the TV
//!     tv.connect_all().await?;
//!     tv.send_key("KEY_HOME").await?;
//!     tv.launch_app("3201907018807", LaunchMethod::Standard).await?;
//!
//!     if tv.art_support_determined().await? {
//!         let art = tv.get_current_artwork().await?;
//!         if let Some(id) = art.current_artwork_id {
//!             let thumbnail = tv.get_artwork_thumbnail(&id).await?;
//!             println!("{} ({} bytes)", id, thumbnail.len());
//!         }
//!         tv.set_art_brightness(40).await?;
//!     }
//!
//!     let mut updates = tv.subscribe_state();
//!     while let Ok(update) = updates.recv().await {
//!         println!("State update: {:?}", update);
//!         break; // Just show one update
//!     }
//!
//!     tv.close_all().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: the `SamsungTv` facade composing everything below
//! - **Connection**: one supervised WebSocket per channel with pairing,
//!   heartbeat, and reconnect
//! - **Dispatcher**: the single writer of device state
//! - **Art**: art-channel requests, events, and the session state machine
//! - **Pending**: correlation of requests with asynchronous replies
//! - **Cache**: LRU artwork thumbnail cache
//! - **Protocol**: JSON frame codec
//! - **Types**: Domain types and data structures

mod art;
mod cache;
mod client;
mod config;
mod connection;
mod dispatcher;
mod error;
mod pending;
mod protocol;
mod reconnect;
mod rest;
mod subscription;
mod token;
mod types;
mod wol;

// Public exports
pub use art::{ArtCall, ArtEvent};
pub use cache::ArtworkCache;
pub use client::SamsungTv;
pub use config::{ClientConfig, HeartbeatConfig};
pub use error::{DecodeError, Result, TvError};
pub use pending::{PendingInfo, PendingRequests, PendingWaiter};
pub use protocol::{
    decode, decode_command, encode, ApplicationTarget, ArtRequest, ChannelEmit, Command,
    CursorPosition, InboundMessage, KeyAction, Lifecycle, RemoteControl,
};
pub use reconnect::{calculate_backoff, ReconnectConfig, ReconnectPolicy, RetryDecision};
pub use rest::{DeviceDetails, DeviceInfo};
pub use subscription::{StateReceiver, StateUpdate};
pub use token::{MemoryTokenPersistence, TokenPersistence, TokenStore};
pub use types::{
    AppId, AppInfo, AppStatus, ArtModeStatus, ArtSessionSnapshot, ArtSupport, ArtworkId,
    ArtworkInfo, ChannelFault, ChannelKind, ChannelState, ChannelStatus, DeviceEndpoint,
    DeviceState, LaunchMethod, MatteList, PhotoFilter, PowerHint, SlideshowStatus,
    DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT,
};
