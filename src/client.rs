use crate::art::{ArtCall, ArtEvent};
use crate::cache::ArtworkCache;
use crate::config::ClientConfig;
use crate::connection::{ChannelConnection, ChannelSender, Inbound};
use crate::dispatcher::{app_status_key, Dispatcher, INSTALLED_APPS_KEY};
use crate::error::{Result, TvError};
use crate::pending::{PendingInfo, PendingRequests};
use crate::protocol::{events, ApplicationTarget, Command, InboundMessage, KeyAction, RemoteControl};
use crate::rest::{DeviceInfo, RestClient};
use crate::subscription::{StateReceiver, StateUpdate};
use crate::token::{TokenPersistence, TokenStore};
use crate::types::{
    AppInfo, AppStatus, ArtSessionSnapshot, ArtSupport, ArtworkInfo, ChannelFault, ChannelKind,
    ChannelStatus, DeviceEndpoint, DeviceState, LaunchMethod, MatteList, PhotoFilter,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BROWSER_APP_ID: &str = "org.tizen.browser";
const UPDATE_CAPACITY: usize = 256;

/// Client for one Samsung TV
///
/// `SamsungTv` owns the remote, control, and art channels to a single TV,
/// the dispatcher that folds their events into [`DeviceState`], and the
/// artwork thumbnail cache. Channels reconnect on their own; operations fail
/// fast when the channel they need is not usable.
pub struct SamsungTv {
    endpoint: DeviceEndpoint,
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    pending: Arc<PendingRequests>,
    cache: Arc<ArtworkCache>,
    remote: ChannelConnection,
    control: ChannelConnection,
    art: ChannelConnection,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    state_rx: watch::Receiver<DeviceState>,
    updates_tx: broadcast::Sender<StateUpdate>,
    rest: RestClient,
    cancel: CancellationToken,
    dispatcher_task: Mutex<Option<JoinHandle<()>>>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl SamsungTv {
    /// Create a client for the TV at `endpoint`
    ///
    /// Must be called from within a Tokio runtime. Nothing is opened until
    /// [`connect_all`](Self::connect_all).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use samsungtv_ws::{ClientConfig, DeviceEndpoint, MemoryTokenPersistence, SamsungTv};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let endpoint = DeviceEndpoint::with_defaults("192.168.1.50")?;
    ///     let tokens = Arc::new(MemoryTokenPersistence::default());
    ///     let tv = SamsungTv::new(endpoint, ClientConfig::default(), tokens)?;
    ///
    ///     tv.connect_all().await?;
    ///     tv.send_key("KEY_VOLUP").await?;
    ///     tv.close_all().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(
        endpoint: DeviceEndpoint,
        config: ClientConfig,
        persistence: Arc<dyn TokenPersistence>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenStore::new(persistence));
        let pending = Arc::new(PendingRequests::new());
        let cache = Arc::new(ArtworkCache::new(config.cache_capacity));
        let rest = RestClient::new(endpoint.host(), config.rest_port, config.request_timeout)?;
        let cancel = CancellationToken::new();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DeviceState::default());
        let (updates_tx, _) = broadcast::channel(UPDATE_CAPACITY);

        let channel = |kind| {
            ChannelConnection::new(
                kind,
                endpoint.clone(),
                config.clone(),
                tokens.clone(),
                pending.clone(),
                inbound_tx.clone(),
                cancel.clone(),
            )
        };
        let remote = channel(ChannelKind::Remote);
        let control = channel(ChannelKind::Control);
        let art = channel(ChannelKind::Art);

        let dispatcher = Dispatcher::new(state_tx, updates_tx.clone(), pending.clone(), cache.clone());
        let dispatcher_task = tokio::spawn(dispatcher.run(inbound_rx));

        Ok(Self {
            endpoint,
            config,
            tokens,
            pending,
            cache,
            remote,
            control,
            art,
            inbound_tx,
            state_rx,
            updates_tx,
            rest,
            cancel,
            dispatcher_task: Mutex::new(Some(dispatcher_task)),
            probe_task: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    /// Token currently held for the remote and control channels
    pub fn token(&self) -> Option<String> {
        self.tokens.get()
    }

    /// Replace the pairing token used by the next connection attempt
    ///
    /// Pass `None` to forget a token the TV rejected; the next
    /// [`connect_all`](Self::connect_all) then pairs again.
    pub fn set_token(&self, token: Option<&str>) {
        self.tokens.replace(token);
    }

    fn channel(&self, kind: ChannelKind) -> &ChannelConnection {
        match kind {
            ChannelKind::Remote => &self.remote,
            ChannelKind::Control => &self.control,
            ChannelKind::Art => &self.art,
        }
    }

    /// Start all three channels
    ///
    /// Waits up to `connect_timeout` for the channels to come up. Channels
    /// still connecting after that keep trying in the background. Fails only
    /// when the TV rejects the client's token.
    pub async fn connect_all(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TvError::ConnectionClosed);
        }
        for kind in ChannelKind::ALL {
            self.channel(kind).start();
        }
        self.spawn_art_probe();

        let settle = |kind: ChannelKind| {
            let mut status_rx = self.channel(kind).watch_status();
            async move {
                loop {
                    let status = *status_rx.borrow_and_update();
                    if status.is_connected() || status.fault.is_some() {
                        return status;
                    }
                    if status_rx.changed().await.is_err() {
                        return status;
                    }
                }
            }
        };

        let wait = async {
            tokio::join!(
                settle(ChannelKind::Remote),
                settle(ChannelKind::Control),
                settle(ChannelKind::Art)
            )
        };
        if tokio::time::timeout(self.config.connect_timeout, wait)
            .await
            .is_err()
        {
            tracing::warn!("Not all channels connected in time, continuing in background");
        }

        for kind in [ChannelKind::Remote, ChannelKind::Control] {
            if self.channel(kind).status().fault == Some(ChannelFault::AuthRejected) {
                return Err(TvError::AuthRejected(kind));
            }
        }
        tracing::info!(
            remote = ?self.remote.status().state,
            control = ?self.control.status().state,
            art = ?self.art.status().state,
            "Channels started"
        );
        Ok(())
    }

    /// Query art support, status, and current artwork whenever the art
    /// channel (re)connects
    fn spawn_art_probe(&self) {
        let mut probe_task = self.probe_task.lock();
        if probe_task.is_some() {
            return;
        }

        let mut status_rx = self.art.watch_status();
        let cancel = self.cancel.clone();
        let prober = ArtProber {
            art: self.art.sender(),
            pending: self.pending.clone(),
            bound: self.config.request_timeout,
        };
        *probe_task = Some(tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                let connected = status_rx.borrow_and_update().is_connected();
                if connected && !was_connected {
                    prober.probe().await;
                }
                was_connected = connected;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    async fn channel_ready(&self, kind: ChannelKind) -> Result<&ChannelConnection> {
        if self.cancel.is_cancelled() {
            return Err(TvError::ConnectionClosed);
        }
        let channel = self.channel(kind);
        channel.ensure_ready(self.config.connect_wait).await?;
        Ok(channel)
    }

    async fn send(&self, kind: ChannelKind, command: &Command) -> Result<()> {
        self.channel_ready(kind).await?.send(command)
    }

    /// Send a request that expects a correlated reply and wait for it
    ///
    /// With `coalesce`, a caller finding the same request in flight shares its
    /// reply; otherwise a duplicate fails with `Busy`.
    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        kind: ChannelKind,
        key: &str,
        awaiting_event: &str,
        request_id: Option<&str>,
        command: Command,
        bound: Duration,
        coalesce: bool,
    ) -> Result<InboundMessage> {
        let channel = self.channel_ready(kind).await?;
        let (waiter, is_new) = if coalesce {
            self.pending
                .join_or_register(key, kind, awaiting_event, request_id, bound)
        } else {
            (
                self.pending
                    .register(key, kind, awaiting_event, request_id, bound)?,
                true,
            )
        };

        if is_new {
            if let Err(e) = channel.send(&command) {
                self.pending.cancel(key);
                return Err(e);
            }
        }
        waiter.wait(&self.pending).await
    }

    async fn art_request(&self, call: ArtCall, coalesce: bool) -> Result<InboundMessage> {
        self.art_request_within(call, self.config.request_timeout, coalesce)
            .await
    }

    async fn art_request_within(
        &self,
        call: ArtCall,
        bound: Duration,
        coalesce: bool,
    ) -> Result<InboundMessage> {
        let ArtCall {
            request,
            key,
            awaiting_event,
        } = call;
        let request_id = request.id.clone();
        let command = request.into_command()?;
        self.request(
            ChannelKind::Art,
            &key,
            awaiting_event,
            Some(&request_id),
            command,
            bound,
            coalesce,
        )
        .await
    }

    // --- remote channel ---

    /// Press and release a key, e.g. `KEY_POWER`
    pub async fn send_key(&self, code: &str) -> Result<()> {
        validate_non_empty("key code", code)?;
        let command = Command::RemoteControl(RemoteControl::key(KeyAction::Click, code));
        self.send(ChannelKind::Remote, &command).await?;
        if let Some(delay) = self.config.key_press_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Hold a key down for `duration`
    pub async fn hold_key(&self, code: &str, duration: Duration) -> Result<()> {
        validate_non_empty("key code", code)?;
        self.send(
            ChannelKind::Remote,
            &Command::RemoteControl(RemoteControl::key(KeyAction::Press, code)),
        )
        .await?;
        tokio::time::sleep(duration).await;
        self.send(
            ChannelKind::Remote,
            &Command::RemoteControl(RemoteControl::key(KeyAction::Release, code)),
        )
        .await
    }

    /// Type text into the focused input field
    pub async fn send_text(&self, text: &str) -> Result<()> {
        validate_non_empty("text", text)?;
        self.send(
            ChannelKind::Remote,
            &Command::RemoteControl(RemoteControl::text(text)),
        )
        .await
    }

    /// Move the pointer by `(x, y)` over `duration`
    pub async fn move_cursor(&self, x: i32, y: i32, duration: Duration) -> Result<()> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.send(
            ChannelKind::Remote,
            &Command::RemoteControl(RemoteControl::cursor_move(x, y, millis)),
        )
        .await
    }

    /// Open `url` in the TV's browser
    pub async fn open_browser(&self, url: &str) -> Result<()> {
        validate_non_empty("url", url)?;
        self.send(
            ChannelKind::Remote,
            &Command::launch_app(BROWSER_APP_ID, "NATIVE_LAUNCH", url),
        )
        .await
    }

    /// Launch an application by its opaque id
    pub async fn launch_app(&self, app_id: &str, method: LaunchMethod) -> Result<()> {
        validate_non_empty("app id", app_id)?;
        tracing::info!(app_id, ?method, "Launching app");
        match method {
            LaunchMethod::Standard => {
                let command = Command::ApplicationStart(ApplicationTarget {
                    id: app_id.to_string(),
                });
                self.send(ChannelKind::Control, &command).await
            }
            LaunchMethod::Remote => {
                self.send(
                    ChannelKind::Remote,
                    &Command::launch_app(app_id, "DEEP_LINK", ""),
                )
                .await
            }
            LaunchMethod::RestFallback => self.rest.run_app(app_id).await,
        }
    }

    /// Fetch the installed application list
    pub async fn request_installed_apps(&self) -> Result<Vec<AppInfo>> {
        self.request(
            ChannelKind::Remote,
            INSTALLED_APPS_KEY,
            events::INSTALLED_APPS,
            None,
            Command::installed_apps(),
            self.config.request_timeout,
            true,
        )
        .await?;
        Ok(self.state_rx.borrow().installed_apps.clone())
    }

    // --- control channel ---

    /// Ask whether an application is running and visible
    pub async fn request_app_status(&self, app_id: &str) -> Result<AppStatus> {
        validate_non_empty("app id", app_id)?;
        let command = Command::ApplicationGet(ApplicationTarget {
            id: app_id.to_string(),
        });
        let reply = self
            .request(
                ChannelKind::Control,
                &app_status_key(app_id),
                events::APPLICATION_GET,
                None,
                command,
                self.config.request_timeout,
                true,
            )
            .await?;
        Ok(serde_json::from_value(reply.data)?)
    }

    /// Close a running application
    ///
    /// `Standard` sends `ms.application.stop` on the control channel;
    /// `RestFallback` issues `DELETE /api/v2/applications/{id}`. The remote
    /// channel has no close command, so `Remote` uses the control channel too.
    pub async fn close_app(&self, app_id: &str, method: LaunchMethod) -> Result<()> {
        validate_non_empty("app id", app_id)?;
        tracing::info!(app_id, ?method, "Closing app");
        match method {
            LaunchMethod::Standard | LaunchMethod::Remote => {
                let command = Command::ApplicationStop(ApplicationTarget {
                    id: app_id.to_string(),
                });
                self.send(ChannelKind::Control, &command).await
            }
            LaunchMethod::RestFallback => self.rest.close_app(app_id).await,
        }
    }

    // --- art channel ---

    /// Whether the TV is known to support art mode
    pub fn get_art_support(&self) -> bool {
        self.state_rx.borrow().art.supported()
    }

    /// Wait until art support has been determined
    ///
    /// Resolves once the art channel has answered a probe. Fails if the art
    /// channel gives up first or the client is closed.
    pub async fn art_support_determined(&self) -> Result<bool> {
        let mut state_rx = self.state_rx.clone();
        let mut status_rx = self.art.watch_status();
        loop {
            match state_rx.borrow_and_update().art.support {
                ArtSupport::Supported => return Ok(true),
                ArtSupport::Unsupported => return Ok(false),
                ArtSupport::Unknown => {}
            }
            match status_rx.borrow_and_update().fault {
                Some(ChannelFault::Unavailable) => {
                    return Err(TvError::ChannelUnavailable(ChannelKind::Art))
                }
                Some(ChannelFault::AuthRejected) => {
                    return Err(TvError::AuthRejected(ChannelKind::Art))
                }
                None => {}
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TvError::ConnectionClosed),
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Err(TvError::ConnectionClosed);
                    }
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return Err(TvError::ConnectionClosed);
                    }
                }
            }
        }
    }

    /// Refresh and return the current artwork
    pub async fn get_current_artwork(&self) -> Result<ArtSessionSnapshot> {
        self.art_request(ArtCall::current_artwork(), true).await?;
        Ok(self.art_snapshot())
    }

    /// Thumbnail bytes of an artwork
    ///
    /// Served from the cache when present. Concurrent misses for the same ID
    /// share a single device request; a timeout caches nothing.
    pub async fn get_artwork_thumbnail(&self, artwork_id: &str) -> Result<Bytes> {
        validate_non_empty("artwork id", artwork_id)?;
        if let Some(bytes) = self.cache.get(artwork_id) {
            tracing::trace!(artwork_id, "Thumbnail cache hit");
            return Ok(bytes);
        }

        let reply = self
            .art_request_within(
                ArtCall::thumbnail(artwork_id),
                self.config.thumbnail_timeout,
                true,
            )
            .await?;

        match ArtEvent::parse(&reply)? {
            Some(ArtEvent::Thumbnail { bytes, .. }) => Ok(bytes),
            _ => Err(TvError::InvalidResponse(format!(
                "unexpected reply to thumbnail request: {}",
                reply.event
            ))),
        }
    }

    /// Set art mode brightness (0-100)
    ///
    /// Returns once the TV confirms; the snapshot changes only then.
    pub async fn set_art_brightness(&self, value: u8) -> Result<()> {
        validate_percent("brightness", value)?;
        self.art_request(ArtCall::set_brightness(value), false)
            .await
            .map(|_| ())
    }

    /// Set art mode color temperature (0-100)
    pub async fn set_art_color_temperature(&self, value: u8) -> Result<()> {
        validate_percent("color temperature", value)?;
        self.art_request(ArtCall::set_color_temperature(value), false)
            .await
            .map(|_| ())
    }

    /// Apply a matte to the current artwork
    pub async fn select_matte(&self, matte_id: &str) -> Result<()> {
        validate_non_empty("matte", matte_id)?;
        let content_id = self.current_artwork_id().await?;
        self.art_request(ArtCall::change_matte(&content_id, matte_id), false)
            .await
            .map(|_| ())
    }

    /// Apply a photo filter to the current artwork
    pub async fn select_photo_filter(&self, filter_id: &str) -> Result<()> {
        validate_non_empty("photo filter", filter_id)?;
        let content_id = self.current_artwork_id().await?;
        self.art_request(ArtCall::set_photo_filter(&content_id, filter_id), false)
            .await
            .map(|_| ())
    }

    async fn current_artwork_id(&self) -> Result<String> {
        if let Some(id) = self.art_snapshot().current_artwork_id {
            return Ok(id);
        }
        self.get_current_artwork()
            .await?
            .current_artwork_id
            .ok_or_else(|| TvError::InvalidResponse("TV reported no current artwork".to_string()))
    }

    /// Turn art mode on or off
    pub async fn set_art_mode(&self, on: bool) -> Result<()> {
        self.art_request(ArtCall::set_artmode(on), false)
            .await
            .map(|_| ())
    }

    /// List stored artworks, optionally restricted to a category
    pub async fn get_artwork_list(&self, category: Option<&str>) -> Result<Vec<ArtworkInfo>> {
        let reply = self
            .art_request(ArtCall::content_list(category), true)
            .await?;
        match ArtEvent::parse(&reply)? {
            Some(ArtEvent::ContentList(artworks)) => Ok(artworks),
            _ => Err(TvError::InvalidResponse(format!(
                "unexpected reply to content list request: {}",
                reply.event
            ))),
        }
    }

    /// Display an artwork
    pub async fn select_artwork(&self, artwork_id: &str, show: bool) -> Result<()> {
        validate_non_empty("artwork id", artwork_id)?;
        self.art_request(ArtCall::select_image(artwork_id, None, show), false)
            .await
            .map(|_| ())
    }

    /// Configure the slideshow; `minutes == None` turns it off
    pub async fn set_slideshow(
        &self,
        minutes: Option<u32>,
        shuffle: bool,
        category_id: &str,
    ) -> Result<()> {
        validate_non_empty("category", category_id)?;
        self.art_request(ArtCall::set_slideshow(minutes, shuffle, category_id), false)
            .await
            .map(|_| ())
    }

    /// Matte types and colors the TV offers for [`select_matte`](Self::select_matte)
    pub async fn get_matte_list(&self) -> Result<MatteList> {
        let reply = self.art_request(ArtCall::matte_list(), true).await?;
        match ArtEvent::parse(&reply)? {
            Some(ArtEvent::MatteList(list)) => Ok(list),
            _ => Err(TvError::InvalidResponse(format!(
                "unexpected reply to matte list request: {}",
                reply.event
            ))),
        }
    }

    /// Photo filters the TV offers for [`select_photo_filter`](Self::select_photo_filter)
    pub async fn get_photo_filter_list(&self) -> Result<Vec<PhotoFilter>> {
        let reply = self.art_request(ArtCall::photo_filter_list(), true).await?;
        match ArtEvent::parse(&reply)? {
            Some(ArtEvent::PhotoFilters(filters)) => Ok(filters),
            _ => Err(TvError::InvalidResponse(format!(
                "unexpected reply to photo filter list request: {}",
                reply.event
            ))),
        }
    }

    /// Mark an artwork as a favorite, or unmark it
    pub async fn set_artwork_favorite(&self, artwork_id: &str, favorite: bool) -> Result<()> {
        validate_non_empty("artwork id", artwork_id)?;
        self.art_request(ArtCall::set_favorite(artwork_id, favorite), false)
            .await
            .map(|_| ())
    }

    /// Delete one stored artwork
    pub async fn delete_artwork(&self, artwork_id: &str) -> Result<()> {
        self.delete_artworks(&[artwork_id]).await
    }

    /// Delete stored artworks; their cached thumbnails are dropped on confirmation
    pub async fn delete_artworks(&self, artwork_ids: &[&str]) -> Result<()> {
        if artwork_ids.is_empty() {
            return Err(TvError::InvalidArgument(
                "no artwork ids to delete".to_string(),
            ));
        }
        for id in artwork_ids {
            validate_non_empty("artwork id", id)?;
        }
        self.art_request(ArtCall::delete(artwork_ids), false)
            .await
            .map(|_| ())
    }

    /// Re-read current artwork, settings, and slideshow status
    pub async fn refresh_art_state(&self) -> Result<ArtSessionSnapshot> {
        let (artwork, settings, slideshow) = tokio::join!(
            self.art_request(ArtCall::current_artwork(), true),
            self.art_request(ArtCall::settings(), true),
            self.art_request(ArtCall::slideshow_status(), true),
        );
        artwork?;
        settings?;
        if let Err(e) = slideshow {
            // Older firmware has no slideshow status
            tracing::debug!("Slideshow status unavailable: {}", e);
        }
        Ok(self.art_snapshot())
    }

    // --- out of band ---

    /// Device description from the REST endpoint
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        self.rest.device_info().await
    }

    /// Power the TV on with a Wake-on-LAN packet
    pub async fn wake_on_lan(&self) -> Result<()> {
        let mac = self.endpoint.mac().ok_or_else(|| {
            TvError::InvalidArgument("endpoint has no MAC address for Wake-on-LAN".to_string())
        })?;
        crate::wol::wake(mac).await
    }

    // --- state ---

    pub fn channel_status(&self, kind: ChannelKind) -> ChannelStatus {
        self.channel(kind).status()
    }

    /// When the channel last received a frame or pong
    pub fn last_activity(&self, kind: ChannelKind) -> Option<tokio::time::Instant> {
        self.channel(kind).last_activity()
    }

    /// Consistent snapshot of the device state
    pub fn device_state(&self) -> DeviceState {
        self.state_rx.borrow().clone()
    }

    pub fn art_snapshot(&self) -> ArtSessionSnapshot {
        self.state_rx.borrow().art.clone()
    }

    /// Watch the device state; every value is a complete snapshot
    pub fn watch_state(&self) -> watch::Receiver<DeviceState> {
        self.state_rx.clone()
    }

    /// Subscribe to state updates
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe_state(&self) -> StateReceiver {
        StateReceiver::new(self.updates_tx.subscribe())
    }

    /// Requests currently awaiting a reply
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        self.pending.snapshot()
    }

    /// Shut everything down
    ///
    /// Stops all channels, fails pending requests with `ChannelLost`, clears
    /// the artwork cache, and returns once no background task remains.
    /// Idempotent; the client cannot be reconnected afterwards.
    pub async fn close_all(&self) {
        tracing::info!("Closing all channels");
        self.cancel.cancel();
        for kind in ChannelKind::ALL {
            self.channel(kind).close().await;
        }
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!("Failed {} pending requests on shutdown", failed);
        }
        self.cache.clear();

        let _ = self.inbound_tx.send(Inbound::Shutdown);
        let probe = self.probe_task.lock().take();
        let dispatcher = self.dispatcher_task.lock().take();
        for task in probe.into_iter().chain(dispatcher) {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}

/// Sends the art probes after each art (re)connect
struct ArtProber {
    art: ChannelSender,
    pending: Arc<PendingRequests>,
    bound: Duration,
}

impl ArtProber {
    async fn probe(&self) {
        for call in [
            ArtCall::api_version(),
            ArtCall::artmode_status(),
            ArtCall::current_artwork(),
        ] {
            let ArtCall {
                request,
                key,
                awaiting_event,
            } = call;
            let request_id = request.id.clone();
            let command = match request.into_command() {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!("Failed to encode art probe: {}", e);
                    continue;
                }
            };
            let (waiter, is_new) = self.pending.join_or_register(
                &key,
                ChannelKind::Art,
                awaiting_event,
                Some(&request_id),
                self.bound,
            );
            if is_new {
                if let Err(e) = self.art.send(&command) {
                    self.pending.cancel(&key);
                    tracing::debug!("Art probe not sent: {}", e);
                    return;
                }
            }
            match waiter.wait(&self.pending).await {
                Ok(_) => {}
                Err(TvError::DeviceError { request, code }) => {
                    tracing::info!(request = %request, code = %code, "Art probe refused");
                }
                Err(e) => {
                    tracing::debug!(key = %key, "Art probe unanswered: {}", e);
                    if matches!(e, TvError::ChannelLost(_)) {
                        return;
                    }
                }
            }
        }
    }
}

fn validate_percent(name: &str, value: u8) -> Result<()> {
    if value > 100 {
        return Err(TvError::InvalidArgument(format!(
            "{} must be 0-100, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TvError::InvalidArgument(format!("{} must not be empty", name)));
    }
    Ok(())
}

impl Drop for SamsungTv {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.inbound_tx.send(Inbound::Shutdown);
    }
}
