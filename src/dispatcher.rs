//! Single consumer of everything the channels receive.
//!
//! The dispatcher is the only writer of [`DeviceState`]. It applies channel
//! status changes and device events in arrival order, resolves pending
//! requests, feeds the artwork cache, and fans changes out to observers.

use crate::art::{self, keys, ArtEvent};
use crate::cache::ArtworkCache;
use crate::connection::Inbound;
use crate::pending::PendingRequests;
use crate::protocol::{events, InboundMessage};
use crate::subscription::StateUpdate;
use crate::types::{
    AppInfo, AppStatus, ChannelFault, ChannelKind, ChannelState, ChannelStatus, DeviceState,
    PowerHint,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Correlation key for `ed.installedApp.get`
pub(crate) const INSTALLED_APPS_KEY: &str = "installed_apps";

/// Correlation key for `ms.application.get` on `app_id`
pub(crate) fn app_status_key(app_id: &str) -> String {
    format!("app_status:{}", app_id)
}

pub(crate) struct Dispatcher {
    state_tx: watch::Sender<DeviceState>,
    updates_tx: broadcast::Sender<StateUpdate>,
    pending: Arc<PendingRequests>,
    cache: Arc<ArtworkCache>,
    art_sessions: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        state_tx: watch::Sender<DeviceState>,
        updates_tx: broadcast::Sender<StateUpdate>,
        pending: Arc<PendingRequests>,
        cache: Arc<ArtworkCache>,
    ) -> Self {
        Self {
            state_tx,
            updates_tx,
            pending,
            cache,
            art_sessions: 0,
        }
    }

    /// Consume inbound traffic until shutdown
    pub(crate) async fn run(mut self, mut inbound_rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(inbound) = inbound_rx.recv().await {
            if matches!(inbound, Inbound::Shutdown) {
                break;
            }
            self.handle(inbound);
        }
        tracing::debug!("Dispatcher exiting");
    }

    pub(crate) fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Status { kind, status } => self.on_status(kind, status),
            Inbound::Message { kind, message } => match kind {
                ChannelKind::Remote | ChannelKind::Control => self.on_device_event(kind, &message),
                ChannelKind::Art => self.on_art_event(&message),
            },
            Inbound::Shutdown => {}
        }
    }

    fn on_status(&mut self, kind: ChannelKind, status: ChannelStatus) {
        let mut art_reconnected = false;
        let changed = self.state_tx.send_if_modified(|state| {
            let previous = *state.channel(kind);
            *state.channel_mut(kind) = status;

            match kind {
                ChannelKind::Remote => {
                    state.power = match (status.state, status.fault) {
                        (ChannelState::Connected, _) => PowerHint::On,
                        (_, Some(ChannelFault::Unavailable)) => PowerHint::Off,
                        _ if previous.is_connected() => PowerHint::Unknown,
                        _ => state.power,
                    };
                }
                ChannelKind::Art => {
                    if status.is_connected() && !previous.is_connected() {
                        self.art_sessions += 1;
                        art_reconnected = self.art_sessions > 1;
                    } else if previous.is_connected() && !status.is_connected() {
                        art::mark_unreachable(&mut state.art);
                    }
                }
                ChannelKind::Control => {}
            }
            true
        });

        if art_reconnected {
            tracing::debug!("Art channel re-established, clearing artwork cache");
            self.cache.clear();
        }

        let _ = self.updates_tx.send(StateUpdate::Channel { kind, status });
        if changed {
            self.publish_device();
        }
    }

    fn on_device_event(&mut self, kind: ChannelKind, message: &InboundMessage) {
        match message.event.as_str() {
            events::TOUCH_ENABLE | events::TOUCH_DISABLE => {
                let enabled = message.event == events::TOUCH_ENABLE;
                self.update_state(|state| {
                    let changed = state.touch_enabled != enabled;
                    state.touch_enabled = enabled;
                    changed
                });
            }
            events::INSTALLED_APPS => {
                let list = message.data.get("data").cloned().unwrap_or_default();
                match serde_json::from_value::<Vec<AppInfo>>(list) {
                    Ok(apps) => {
                        tracing::debug!("{} installed apps reported", apps.len());
                        self.update_state(|state| {
                            let changed = state.installed_apps != apps;
                            state.installed_apps = apps;
                            changed
                        });
                        self.pending.resolve(INSTALLED_APPS_KEY, message);
                    }
                    Err(e) => tracing::warn!("Ignoring installed app list: {}", e),
                }
            }
            events::APPLICATION_GET => {
                match serde_json::from_value::<AppStatus>(message.data.clone()) {
                    Ok(app) => {
                        self.update_state(|state| {
                            let before = (state.running_app.clone(), state.app_visible);
                            if app.running {
                                state.running_app = Some(app.id.clone());
                                state.app_visible = app.visible;
                            } else if state.running_app.as_deref() == Some(app.id.as_str()) {
                                state.running_app = None;
                                state.app_visible = false;
                            }
                            before != (state.running_app.clone(), state.app_visible)
                        });
                        self.pending.resolve(&app_status_key(&app.id), message);
                    }
                    Err(e) => tracing::warn!("Ignoring application status: {}", e),
                }
            }
            events::ERROR => {
                tracing::warn!(channel = %kind, "Device reported error: {}", message.data);
            }
            events::CHANNEL_CONNECT | events::CHANNEL_READY => {}
            events::CHANNEL_CLIENT_CONNECT | events::CHANNEL_CLIENT_DISCONNECT => {
                tracing::debug!(
                    channel = %kind,
                    event = %message.event,
                    client = ?message.str_field("id"),
                    "Another client joined or left"
                );
            }
            other => {
                tracing::trace!(channel = %kind, event = other, "Ignoring event");
            }
        }
    }

    fn on_art_event(&mut self, message: &InboundMessage) {
        let event = match ArtEvent::parse(message) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::trace!(event = %message.event, "Ignoring art event");
                return;
            }
            Err(e) => {
                tracing::warn!(event = %message.event, "Dropping art event: {}", e);
                return;
            }
        };

        if let ArtEvent::Thumbnail { id, bytes } = &event {
            self.cache.insert(id, bytes.clone());
        }

        let mut outcome = art::ApplyOutcome::default();
        self.state_tx.send_if_modified(|state| {
            outcome = art::apply(&mut state.art, &event);
            outcome.changed
        });

        if let Some((previous, current)) = outcome.artwork_changed {
            self.cache.set_current(current.as_deref());
            tracing::info!(?previous, ?current, "Current artwork changed");
            let _ = self
                .updates_tx
                .send(StateUpdate::ArtworkChanged { previous, current });
        }
        if outcome.changed {
            self.publish_device();
        }

        if let ArtEvent::Deleted(ids) = &event {
            for id in ids {
                self.cache.invalidate(id);
            }
        }

        match &event {
            ArtEvent::Error {
                request,
                code,
                request_id,
                ..
            } => {
                tracing::warn!(request = %request, code = %code, "Art request failed");
                let by_id = request_id
                    .as_deref()
                    .or(message.request_id.as_deref())
                    .is_some_and(|id| self.pending.reject_id(id, request, code));
                if !by_id {
                    if let Some(key) = art::reply_key(&message.event, &event) {
                        self.pending.reject(&key, request, code);
                    }
                }
            }
            ArtEvent::Unsupported => {
                for key in [keys::API_VERSION, keys::ARTMODE_STATUS] {
                    self.pending.reject(key, &message.event, "unsupported");
                }
            }
            _ => {
                let by_id = message
                    .request_id
                    .as_deref()
                    .is_some_and(|id| self.pending.resolve_id(id, message));
                if !by_id {
                    if let Some(key) = art::reply_key(&message.event, &event) {
                        self.pending.resolve(&key, message);
                    }
                }
            }
        }
    }

    fn update_state(&self, modify: impl FnOnce(&mut DeviceState) -> bool) {
        if self.state_tx.send_if_modified(modify) {
            self.publish_device();
        }
    }

    fn publish_device(&self) {
        let snapshot = self.state_tx.borrow().clone();
        let _ = self
            .updates_tx
            .send(StateUpdate::Device(Box::new(snapshot)));
    }
}
