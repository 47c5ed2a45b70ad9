//! Runtime events for monitoring stream health.
//!
//! Events are non-fatal notifications about the realtime data path. The
//! stream continues running after every event - they exist so the
//! application can observe pressure and failures and decide its own policy.

use std::fmt;
use std::sync::Arc;

/// Which way audio flows through a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Capture: device to application.
    Input,
    /// Playback: application to device.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Runtime events emitted while a stream is live.
///
/// These are informational, not errors. Overflow and underflow mean audio
/// was dropped or replaced with silence for one hardware period; the stream
/// keeps running. A [`StreamError`] means the backend reported a failure on
/// a live stream - the stream may be dead, and reopening it is the
/// application's decision, never automatic.
///
/// [`StreamError`]: StreamEvent::StreamError
///
/// # Example
///
/// ```
/// use duplex_audio::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::Overflow { needed_frames, free_frames, .. } => {
///             eprintln!("dropped a period: needed {needed_frames}, free {free_frames}");
///         }
///         StreamEvent::Underflow { needed_frames, ready_frames, .. } => {
///             eprintln!("played silence: needed {needed_frames}, had {ready_frames}");
///         }
///         StreamEvent::StreamError { direction, message } => {
///             eprintln!("{direction} stream failed: {message}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The input ring buffer had no room for an incoming hardware period.
    ///
    /// The backend drops the period's audio. Emitted once per affected
    /// period. Consider a larger `ring_buffer_duration` or a faster read
    /// callback.
    Overflow {
        /// Direction of the affected stream (always [`Direction::Input`]
        /// for ring-full conditions; kept explicit for uniform handling).
        direction: Direction,
        /// Frames the backend needed room for.
        needed_frames: usize,
        /// Frames of free space the ring buffer actually had.
        free_frames: usize,
    },

    /// The output ring buffer had too little data for a hardware period.
    ///
    /// A full period of silence is played instead; buffered partial data
    /// stays queued for the next period. Emitted once per affected period.
    Underflow {
        /// Direction of the affected stream.
        direction: Direction,
        /// Frames the backend asked for.
        needed_frames: usize,
        /// Frames actually buffered when the period started.
        ready_frames: usize,
    },

    /// The backend reported an error on a live stream.
    ///
    /// Typical causes are device disconnection or the OS reclaiming the
    /// device. The error is delivered here, outside the data path; the
    /// application decides whether to stop and reopen.
    StreamError {
        /// Direction of the failed stream.
        direction: Direction,
        /// Backend-reported description.
        message: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`SessionBuilder::on_event()`]. Overflow and
/// underflow events fire on the driver thread between hardware deadlines,
/// so handlers must be quick and must not block.
///
/// [`SessionBuilder::on_event()`]: crate::SessionBuilder::on_event
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// Convenience wrapper so callers don't spell out the `Arc`.
///
/// # Example
///
/// ```
/// use duplex_audio::event_callback;
///
/// let callback = event_callback(|event| {
///     println!("got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Input.to_string(), "input");
        assert_eq!(Direction::Output.to_string(), "output");
    }

    #[test]
    fn test_stream_event_debug() {
        let event = StreamEvent::Overflow {
            direction: Direction::Input,
            needed_frames: 256,
            free_frames: 100,
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("Overflow"));
        assert!(debug.contains("256"));
    }

    #[test]
    fn test_stream_event_clone() {
        let event = StreamEvent::StreamError {
            direction: Direction::Output,
            message: "device disconnected".to_string(),
        };
        let cloned = event.clone();
        if let StreamEvent::StreamError { direction, message } = cloned {
            assert_eq!(direction, Direction::Output);
            assert_eq!(message, "device disconnected");
        } else {
            panic!("Expected StreamError variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(StreamEvent::Underflow {
            direction: Direction::Output,
            needed_frames: 512,
            ready_frames: 0,
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
