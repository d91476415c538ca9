use crate::error::{Result, TvError};
use crate::types::{ArtworkId, ChannelKind, ChannelStatus, DeviceState};
use tokio::sync::broadcast;

/// Change notification delivered to state observers
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// A channel changed lifecycle state
    Channel {
        kind: ChannelKind,
        status: ChannelStatus,
    },

    /// Device or art-session state changed; carries the full new snapshot
    Device(Box<DeviceState>),

    /// The TV switched to a different artwork
    ///
    /// Anything derived from the previous "current" thumbnail is stale.
    ArtworkChanged {
        previous: Option<ArtworkId>,
        current: Option<ArtworkId>,
    },
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    /// Create a new state receiver
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Returns `ConnectionClosed` once the client has shut down.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => return Ok(update),
                Err(broadcast::error::RecvError::Closed) => return Err(TvError::ConnectionClosed),
                // Every Device update carries a full snapshot, so skipping ahead is safe
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("State observer lagged by {} updates", n);
                }
            }
        }
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        loop {
            match self.rx.try_recv() {
                Ok(update) => return Ok(Some(update)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(TvError::ConnectionClosed)
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("State observer lagged by {} updates", n);
                }
            }
        }
    }
}
