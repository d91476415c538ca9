use crate::types::ChannelKind;
use thiserror::Error;

/// Result type for TV operations
pub type Result<T> = std::result::Result<T, TvError>;

/// A frame that could not be turned into an inbound message.
///
/// Always recoverable: the receive loop logs it and drops the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame was not valid JSON
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame parsed but carried no `event` field
    #[error("frame has no event field")]
    MissingEvent,

    /// A nested payload (JSON string or base64 blob) could not be decoded
    #[error("invalid nested payload: {0}")]
    Payload(String),
}

/// Errors that can occur when talking to a TV
#[derive(Error, Debug)]
pub enum TvError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The client was shut down
    #[error("Connection closed")]
    ConnectionClosed,

    /// The channel is not in the connected state
    #[error("{0} channel is not connected")]
    NotConnected(ChannelKind),

    /// The TV refused the token; a new pairing is required
    #[error("{0} channel authentication rejected")]
    AuthRejected(ChannelKind),

    /// The channel exceeded its reconnect ceiling
    #[error("{0} channel unavailable")]
    ChannelUnavailable(ChannelKind),

    /// No reply arrived for a pending request within its bound
    #[error("Request timeout waiting for {0}")]
    RequestTimeout(String),

    /// The channel dropped while a request was in flight
    #[error("{0} channel lost while request was pending")]
    ChannelLost(ChannelKind),

    /// An identical request is already in flight
    #[error("Request already in flight: {0}")]
    Busy(String),

    /// The TV answered a request with an error reply
    #[error("Device error for {request}: {code}")]
    DeviceError {
        /// Request name the device rejected
        request: String,
        /// Error code reported by the device
        code: String,
    },

    /// Endpoint parameters failed validation
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A caller supplied an out-of-range or empty argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid or unexpected response from the TV
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error from the REST endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
