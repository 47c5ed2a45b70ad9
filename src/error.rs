//! Error types for duplex-audio.
//!
//! Errors are split into two categories:
//! - **Setup errors** ([`AudioIoError`]): Returned synchronously from connect,
//!   negotiation, and stream lifecycle calls
//! - **Runtime events**: Overflow, underflow, and in-flight device failures
//!   surfaced via [`EventCallback`](crate::EventCallback)

use crate::backend::BackendId;
use crate::event::Direction;

/// Errors returned from session and stream setup calls.
///
/// These indicate that a connect, negotiation, open, start, pause, or stop
/// call could not complete. Realtime data-path conditions (overflow,
/// underflow, device disconnection mid-stream) are never returned from here;
/// they arrive through the event callback instead.
///
/// Nothing is retried automatically. Retry, fallback, and reopen policy
/// belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AudioIoError {
    /// An allocation failed while creating a resource.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that could not be allocated.
        requested: usize,
    },

    /// No backend could be connected.
    #[error("audio backend unavailable: {backend}")]
    BackendUnavailable {
        /// The backend that failed to connect.
        backend: BackendId,
    },

    /// The requested device does not exist, or no default is configured.
    #[error("no {direction} device: {detail}")]
    DeviceUnavailable {
        /// Direction the lookup was for.
        direction: Direction,
        /// What was asked for (an id, an index, or "default").
        detail: String,
    },

    /// The device exists but probing its capabilities failed.
    ///
    /// The device stays listed so callers can see it exists, but it cannot
    /// be opened until a refresh produces a clean probe.
    #[error("probing device '{name}' failed: {reason}")]
    ProbeFailed {
        /// Display name of the device.
        name: String,
        /// Backend-reported probe failure.
        reason: String,
    },

    /// An explicitly requested sample rate is not supported by the device.
    #[error("sample rate {rate}Hz not supported by device '{device}'")]
    InvalidSampleRate {
        /// The requested sample rate.
        rate: u32,
        /// Display name of the device.
        device: String,
    },

    /// No sample format acceptable to both caller and device was found.
    #[error("no compatible sample format for device '{device}'")]
    IncompatibleFormat {
        /// Display name of the device.
        device: String,
    },

    /// The backend rejected the negotiated stream configuration.
    #[error("could not open {direction} stream: {reason}")]
    StreamCreationFailed {
        /// Direction of the stream.
        direction: Direction,
        /// Backend-reported reason.
        reason: String,
    },

    /// The backend could not begin I/O on an opened stream.
    #[error("could not start {direction} stream: {reason}")]
    StreamStartFailed {
        /// Direction of the stream.
        direction: Direction,
        /// Backend-reported reason.
        reason: String,
    },

    /// A stream for this direction is already active on the session.
    #[error("{direction} stream already active - stop it before starting another")]
    StreamActive {
        /// Direction of the active stream.
        direction: Direction,
    },

    /// No stream is active for this direction.
    #[error("no active {direction} stream")]
    StreamNotActive {
        /// Direction that has no stream.
        direction: Direction,
    },

    /// A lifecycle operation was called outside its valid state.
    #[error("invalid stream state: {operation} requires {expected}, stream is {actual}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state(s) the operation is valid from.
        expected: &'static str,
        /// The state the stream was actually in.
        actual: &'static str,
    },

    /// Any other backend-reported failure.
    #[error("audio backend error: {message}")]
    Backend {
        /// Backend-reported message.
        message: String,
    },
}

impl AudioIoError {
    /// Creates a [`AudioIoError::Backend`] from any displayable value.
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: message.to_string(),
        }
    }

    /// Creates a [`AudioIoError::DeviceUnavailable`] for a missing default device.
    pub fn no_default_device(direction: Direction) -> Self {
        Self::DeviceUnavailable {
            direction,
            detail: "no default device".to_string(),
        }
    }
}
