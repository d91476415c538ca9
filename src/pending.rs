//! Correlation of art-channel requests with their asynchronous replies.
//!
//! The TV answers art requests with independent events rather than direct
//! responses. Each request registers under a correlation key and, when the
//! request carries one, the id the TV echoes back in its reply. Replies are
//! matched by id first and by key otherwise. At most one request per key is
//! in flight.

use crate::error::{Result, TvError};
use crate::protocol::InboundMessage;
use crate::types::ChannelKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How a pending request ended
#[derive(Debug, Clone)]
enum Outcome {
    Resolved(InboundMessage),
    Rejected { request: String, code: String },
    Lost(ChannelKind),
    TimedOut,
}

struct PendingEntry {
    channel: ChannelKind,
    awaiting_event: String,
    request_id: Option<String>,
    issued_at: Instant,
    deadline: Instant,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

/// Summary of an in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub correlation_key: String,
    pub awaiting_event: String,
    pub channel: ChannelKind,
    pub age: Duration,
}

/// Registry of in-flight requests keyed by correlation key
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; fails with `Busy` if the key is already in flight
    pub fn register(
        &self,
        key: &str,
        channel: ChannelKind,
        awaiting_event: &str,
        request_id: Option<&str>,
        bound: Duration,
    ) -> Result<PendingWaiter> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Err(TvError::Busy(key.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let deadline = now + bound;
        entries.insert(
            key.to_string(),
            PendingEntry {
                channel,
                awaiting_event: awaiting_event.to_string(),
                request_id: request_id.map(str::to_string),
                issued_at: now,
                deadline,
                waiters: vec![tx],
            },
        );

        Ok(PendingWaiter {
            key: key.to_string(),
            channel,
            deadline,
            rx,
        })
    }

    /// Join an in-flight request for `key`, or register a new one
    ///
    /// The boolean is `true` when a new request was registered and the caller
    /// must send it to the device.
    pub fn join_or_register(
        &self,
        key: &str,
        channel: ChannelKind,
        awaiting_event: &str,
        request_id: Option<&str>,
        bound: Duration,
    ) -> (PendingWaiter, bool) {
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(key) {
                let (tx, rx) = oneshot::channel();
                entry.waiters.push(tx);
                return (
                    PendingWaiter {
                        key: key.to_string(),
                        channel: entry.channel,
                        deadline: entry.deadline,
                        rx,
                    },
                    false,
                );
            }
        }

        match self.register(key, channel, awaiting_event, request_id, bound) {
            Ok(waiter) => (waiter, true),
            // Only reachable if another caller registered between the two locks
            Err(_) => self.join_or_register(key, channel, awaiting_event, request_id, bound),
        }
    }

    /// Deliver a reply to every waiter on `key`
    pub fn resolve(&self, key: &str, message: &InboundMessage) -> bool {
        self.finish(key, Outcome::Resolved(message.clone()))
    }

    /// Deliver a device error reply to every waiter on `key`
    pub fn reject(&self, key: &str, request: &str, code: &str) -> bool {
        self.finish(
            key,
            Outcome::Rejected {
                request: request.to_string(),
                code: code.to_string(),
            },
        )
    }

    /// Deliver a reply to the request that was sent with `request_id`
    pub fn resolve_id(&self, request_id: &str, message: &InboundMessage) -> bool {
        match self.key_for_id(request_id) {
            Some(key) => self.resolve(&key, message),
            None => false,
        }
    }

    /// Deliver a device error reply to the request sent with `request_id`
    pub fn reject_id(&self, request_id: &str, request: &str, code: &str) -> bool {
        match self.key_for_id(request_id) {
            Some(key) => self.reject(&key, request, code),
            None => false,
        }
    }

    fn key_for_id(&self, request_id: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .find(|(_, entry)| entry.request_id.as_deref() == Some(request_id))
            .map(|(key, _)| key.clone())
    }

    /// Drop a request whose send failed
    pub fn cancel(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Fail every request on `channel` with `ChannelLost`
    pub fn fail_channel(&self, channel: ChannelKind) -> usize {
        let lost: Vec<PendingEntry> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.channel == channel)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };

        let count = lost.len();
        for entry in lost {
            for waiter in entry.waiters {
                let _ = waiter.send(Outcome::Lost(channel));
            }
        }
        if count > 0 {
            tracing::debug!(channel = %channel, count, "Cancelled pending requests");
        }
        count
    }

    /// Fail every request on every channel
    pub fn fail_all(&self) -> usize {
        ChannelKind::ALL
            .iter()
            .map(|kind| self.fail_channel(*kind))
            .sum()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of in-flight requests
    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .map(|(key, entry)| PendingInfo {
                correlation_key: key.clone(),
                awaiting_event: entry.awaiting_event.clone(),
                channel: entry.channel,
                age: now.saturating_duration_since(entry.issued_at),
            })
            .collect()
    }

    fn finish(&self, key: &str, outcome: Outcome) -> bool {
        let entry = self.entries.lock().remove(key);
        match entry {
            Some(entry) => {
                for waiter in entry.waiters {
                    let _ = waiter.send(outcome.clone());
                }
                true
            }
            None => false,
        }
    }

    fn expire(&self, key: &str, deadline: Instant) {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                // A newer request may have reused the key after ours finished
                Some(entry) if entry.deadline == deadline => entries.remove(key),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            for waiter in entry.waiters {
                let _ = waiter.send(Outcome::TimedOut);
            }
        }
    }
}

/// Handle returned to the caller that issued (or joined) a request
#[derive(Debug)]
pub struct PendingWaiter {
    key: String,
    channel: ChannelKind,
    deadline: Instant,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingWaiter {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the reply until the request's deadline
    pub async fn wait(mut self, pending: &PendingRequests) -> Result<InboundMessage> {
        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Outcome::Lost(self.channel),
            Err(_) => {
                pending.expire(&self.key, self.deadline);
                // Another waiter may have delivered in the meantime
                match self.rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::TimedOut,
                }
            }
        };

        match outcome {
            Outcome::Resolved(message) => Ok(message),
            Outcome::Rejected { request, code } => Err(TvError::DeviceError { request, code }),
            Outcome::Lost(channel) => Err(TvError::ChannelLost(channel)),
            Outcome::TimedOut => Err(TvError::RequestTimeout(self.key)),
        }
    }
}
