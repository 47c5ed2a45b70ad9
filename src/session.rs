//! Session management: the owner of backend connection, device catalog and
//! active streams.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, BackendId};
use crate::bridge::BridgeHandle;
use crate::builder::{InputStreamBuilder, OutputStreamBuilder, SessionBuilder};
use crate::catalog::DeviceCatalog;
use crate::config::SessionConfig;
use crate::error::AudioIoError;
use crate::event::{Direction, EventCallback, StreamEvent};
use crate::stream::{StreamController, StreamSpec};

/// Counters accumulated over the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Capture periods dropped because the ring buffer was full.
    pub overflows: u64,
    /// Playback periods padded with silence because the ring ran dry.
    pub underflows: u64,
    /// Asynchronous stream errors reported by the backend.
    pub stream_errors: u64,
    /// Frames moved from the capture device into the ring buffer.
    pub frames_captured: u64,
    /// Frames moved from the ring buffer to the playback device.
    pub frames_rendered: u64,
}

/// Event dispatch and counters shared with driver and bridge threads.
///
/// Counter updates are single atomic adds and the callback invocation is
/// direct, so driver-side paths stay wait-free as long as the installed
/// callback is.
pub(crate) struct EventHub {
    callback: Option<EventCallback>,
    overflows: AtomicU64,
    underflows: AtomicU64,
    stream_errors: AtomicU64,
    frames_captured: AtomicU64,
    frames_rendered: AtomicU64,
}

impl EventHub {
    pub(crate) fn new(callback: Option<EventCallback>) -> Self {
        Self {
            callback,
            overflows: AtomicU64::new(0),
            underflows: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
        }
    }

    pub(crate) fn overflow(&self, direction: Direction, needed_frames: usize, free_frames: usize) {
        self.overflows.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%direction, needed_frames, free_frames, "overflow");
        self.emit(StreamEvent::Overflow {
            direction,
            needed_frames,
            free_frames,
        });
    }

    pub(crate) fn underflow(&self, direction: Direction, needed_frames: usize, ready_frames: usize) {
        self.underflows.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%direction, needed_frames, ready_frames, "underflow");
        self.emit(StreamEvent::Underflow {
            direction,
            needed_frames,
            ready_frames,
        });
    }

    pub(crate) fn stream_error(&self, direction: Direction, message: String) {
        self.stream_errors.fetch_add(1, Ordering::SeqCst);
        tracing::error!(%direction, %message, "backend reported stream error");
        self.emit(StreamEvent::StreamError { direction, message });
    }

    pub(crate) fn add_captured_frames(&self, frames: usize) {
        self.frames_captured.fetch_add(frames as u64, Ordering::SeqCst);
    }

    pub(crate) fn add_rendered_frames(&self, frames: usize) {
        self.frames_rendered.fetch_add(frames as u64, Ordering::SeqCst);
    }

    pub(crate) fn stats(&self) -> SessionStats {
        SessionStats {
            overflows: self.overflows.load(Ordering::SeqCst),
            underflows: self.underflows.load(Ordering::SeqCst),
            stream_errors: self.stream_errors.load(Ordering::SeqCst),
            frames_captured: self.frames_captured.load(Ordering::SeqCst),
            frames_rendered: self.frames_rendered.load(Ordering::SeqCst),
        }
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

/// One live stream: its controller, its bridge worker and, for output, the
/// clear-request flag polled by the driver.
pub(crate) struct ActiveStream {
    controller: StreamController,
    bridge: Option<BridgeHandle>,
    clear_requested: Option<Arc<AtomicBool>>,
}

impl ActiveStream {
    pub(crate) fn new(
        controller: StreamController,
        bridge: BridgeHandle,
        clear_requested: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            controller,
            bridge: Some(bridge),
            clear_requested,
        }
    }

    /// Ordered teardown: destroy the backend stream first so its callback
    /// is quiesced, then stop the bridge (which drains captured audio),
    /// then let the ring halves drop with both of them.
    fn shut_down(&mut self) {
        self.controller.close();
        if let Some(mut bridge) = self.bridge.take() {
            bridge.stop();
        }
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// A connection to one audio backend, with its device catalog and up to one
/// stream per direction.
///
/// Created via [`AudioSession::builder`]. Dropping the session closes both
/// streams and disconnects; [`close`](Self::close) does the same eagerly.
///
/// The session is single-threaded: backend stream handles are bound to the
/// thread that created them on some platforms, so `AudioSession` is not
/// `Send`.
///
/// # Example
///
/// ```no_run
/// use duplex_audio::{AudioSession, BackendId};
///
/// # fn main() -> Result<(), duplex_audio::AudioIoError> {
/// let mut session = AudioSession::builder()
///     .backend(BackendId::Dummy)
///     .connect()?;
/// session
///     .input_stream()
///     .sample_rate(44_100)
///     .read_callback(|bytes, frames| {
///         println!("captured {frames} frames ({} bytes)", bytes.len());
///     })
///     .start()?;
/// # Ok(())
/// # }
/// ```
pub struct AudioSession {
    backend: Arc<dyn Backend>,
    catalog: DeviceCatalog,
    config: SessionConfig,
    hub: Arc<EventHub>,
    input: Option<ActiveStream>,
    output: Option<ActiveStream>,
}

impl AudioSession {
    /// Starts configuring a new session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        config: SessionConfig,
        callback: Option<EventCallback>,
    ) -> Result<Self, AudioIoError> {
        let catalog = DeviceCatalog::new(backend.clone())?;
        tracing::info!(backend = %backend.id(), "session connected");
        Ok(Self {
            backend,
            catalog,
            config,
            hub: Arc::new(EventHub::new(callback)),
            input: None,
            output: None,
        })
    }

    /// The backend this session is connected to.
    #[must_use]
    pub fn backend_id(&self) -> BackendId {
        self.backend.id()
    }

    /// The device snapshot taken at connect or last refresh.
    #[must_use]
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Mutable catalog access, e.g. for [`DeviceCatalog::refresh`].
    pub fn catalog_mut(&mut self) -> &mut DeviceCatalog {
        &mut self.catalog
    }

    /// The configuration the session was built with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts configuring a capture stream on this session.
    pub fn input_stream(&mut self) -> InputStreamBuilder<'_> {
        InputStreamBuilder::new(self)
    }

    /// Starts configuring a playback stream on this session.
    pub fn output_stream(&mut self) -> OutputStreamBuilder<'_> {
        OutputStreamBuilder::new(self)
    }

    /// Whether a capture stream is currently installed.
    #[must_use]
    pub fn has_input_stream(&self) -> bool {
        self.input.is_some()
    }

    /// Whether a playback stream is currently installed.
    #[must_use]
    pub fn has_output_stream(&self) -> bool {
        self.output.is_some()
    }

    /// Negotiated parameters of the active capture stream.
    #[must_use]
    pub fn input_spec(&self) -> Option<&StreamSpec> {
        self.input.as_ref().map(|s| s.controller.spec())
    }

    /// Negotiated parameters of the active playback stream.
    #[must_use]
    pub fn output_spec(&self) -> Option<&StreamSpec> {
        self.output.as_ref().map(|s| s.controller.spec())
    }

    /// Pauses or resumes the capture stream.
    pub fn pause_input(&mut self, paused: bool) -> Result<(), AudioIoError> {
        match self.input.as_mut() {
            Some(stream) => stream.controller.pause(paused),
            None => Err(AudioIoError::StreamNotActive {
                direction: Direction::Input,
            }),
        }
    }

    /// Pauses or resumes the playback stream.
    pub fn pause_output(&mut self, paused: bool) -> Result<(), AudioIoError> {
        match self.output.as_mut() {
            Some(stream) => stream.controller.pause(paused),
            None => Err(AudioIoError::StreamNotActive {
                direction: Direction::Output,
            }),
        }
    }

    /// Stops and tears down the capture stream.
    ///
    /// Buffered captured audio is delivered to the read callback before the
    /// bridge worker exits. A no-op when no capture stream is installed.
    pub fn stop_input(&mut self) {
        if let Some(mut stream) = self.input.take() {
            stream.shut_down();
            tracing::info!("input stream stopped");
        }
    }

    /// Stops and tears down the playback stream.
    ///
    /// Audio still buffered in the ring is discarded. A no-op when no
    /// playback stream is installed.
    pub fn stop_output(&mut self) {
        if let Some(mut stream) = self.output.take() {
            stream.shut_down();
            tracing::info!("output stream stopped");
        }
    }

    /// Actual software latency of the capture stream, in seconds.
    pub fn input_latency(&self) -> Result<f64, AudioIoError> {
        match self.input.as_ref() {
            Some(stream) => stream.controller.software_latency(),
            None => Err(AudioIoError::StreamNotActive {
                direction: Direction::Input,
            }),
        }
    }

    /// Actual software latency of the playback stream, in seconds.
    pub fn output_latency(&self) -> Result<f64, AudioIoError> {
        match self.output.as_ref() {
            Some(stream) => stream.controller.software_latency(),
            None => Err(AudioIoError::StreamNotActive {
                direction: Direction::Output,
            }),
        }
    }

    /// Asks the playback driver to drop everything queued in the ring.
    ///
    /// Takes effect at the start of the next hardware period; until then
    /// the queued audio keeps playing.
    pub fn clear_output_buffer(&mut self) -> Result<(), AudioIoError> {
        match self.output.as_ref().and_then(|s| s.clear_requested.as_ref()) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                Ok(())
            }
            None => Err(AudioIoError::StreamNotActive {
                direction: Direction::Output,
            }),
        }
    }

    /// Counters accumulated since the session connected.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.hub.stats()
    }

    /// Stops both streams. Idempotent; also run on drop.
    pub fn close(&mut self) {
        self.stop_input();
        self.stop_output();
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub(crate) fn hub(&self) -> Arc<EventHub> {
        self.hub.clone()
    }

    pub(crate) fn ensure_input_free(&self) -> Result<(), AudioIoError> {
        if self.input.is_some() {
            return Err(AudioIoError::StreamActive {
                direction: Direction::Input,
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_output_free(&self) -> Result<(), AudioIoError> {
        if self.output.is_some() {
            return Err(AudioIoError::StreamActive {
                direction: Direction::Output,
            });
        }
        Ok(())
    }

    pub(crate) fn install_input(&mut self, stream: ActiveStream) {
        self.input = Some(stream);
    }

    pub(crate) fn install_output(&mut self, stream: ActiveStream) {
        self.output = Some(stream);
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_callback;
    use std::sync::Mutex;

    #[test]
    fn test_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.overflows, 0);
        assert_eq!(stats.underflows, 0);
        assert_eq!(stats.frames_captured, 0);
    }

    #[test]
    fn test_hub_counts_and_emits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hub = EventHub::new(Some(event_callback(move |event| {
            sink.lock().unwrap().push(event);
        })));

        hub.overflow(Direction::Input, 512, 100);
        hub.underflow(Direction::Output, 512, 3);
        hub.stream_error(Direction::Output, "device yanked".to_string());
        hub.add_captured_frames(1024);
        hub.add_rendered_frames(256);

        let stats = hub.stats();
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.underflows, 1);
        assert_eq!(stats.stream_errors, 1);
        assert_eq!(stats.frames_captured, 1024);
        assert_eq!(stats.frames_rendered, 256);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_hub_without_callback_still_counts() {
        let hub = EventHub::new(None);
        hub.overflow(Direction::Input, 8, 0);
        hub.overflow(Direction::Input, 8, 0);
        assert_eq!(hub.stats().overflows, 2);
    }

    #[test]
    fn test_session_without_streams() {
        let mut session = AudioSession::builder()
            .backend(BackendId::Dummy)
            .connect()
            .unwrap();

        assert_eq!(session.backend_id(), BackendId::Dummy);
        assert!(!session.has_input_stream());
        assert!(session.input_spec().is_none());
        assert!(matches!(
            session.pause_input(true),
            Err(AudioIoError::StreamNotActive {
                direction: Direction::Input
            })
        ));
        assert!(matches!(
            session.clear_output_buffer(),
            Err(AudioIoError::StreamNotActive {
                direction: Direction::Output
            })
        ));
        assert!(matches!(
            session.output_latency(),
            Err(AudioIoError::StreamNotActive {
                direction: Direction::Output
            })
        ));

        // Stops are no-ops without streams, close is idempotent.
        session.stop_input();
        session.stop_output();
        session.close();
        session.close();
        assert_eq!(session.stats(), SessionStats::default());
    }
}
