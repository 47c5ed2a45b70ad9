//! Configuration types for audio sessions.

use std::time::Duration;

/// Session-wide configuration.
///
/// Use [`SessionConfig::default()`] for sensible defaults, or customize as
/// needed. Per-stream parameters (rate, format, channels, block size, device)
/// live on the stream builders instead and are frozen when the stream opens.
///
/// # Example
///
/// ```
/// use duplex_audio::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig {
///     ring_buffer_duration: Duration::from_secs(10),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Audio each ring buffer can hold before overflowing.
    ///
    /// Converted to bytes at the negotiated rate and frame size when a
    /// stream starts (rounded up to a power of two). A larger buffer
    /// absorbs longer stalls in the application callback at the cost of
    /// memory.
    /// Default: 30 seconds
    pub ring_buffer_duration: Duration,

    /// Software latency to request from the backend, if any.
    ///
    /// When set this takes precedence over the latency a per-stream
    /// `block_size` would imply. `None` accepts the device default unless
    /// a `block_size` is given, which then requests
    /// `block_size / sample_rate`.
    /// Default: `None`
    pub requested_latency: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ring_buffer_duration: Duration::from_secs(30),
            requested_latency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.ring_buffer_duration, Duration::from_secs(30));
        assert_eq!(config.requested_latency, None);
    }
}
