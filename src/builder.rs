//! Builders for sessions and streams.
//!
//! [`SessionBuilder`] connects to a backend; the per-direction stream
//! builders negotiate device parameters, freeze them into a
//! [`StreamSpec`](crate::StreamSpec), and wire ring buffer, driver, backend
//! stream and bridge worker together.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::backend::{self, BackendId};
use crate::bridge::{self, BridgeShared, ReadCallback, WriteCallback};
use crate::catalog::{resolve_format, resolve_layout, resolve_sample_rate};
use crate::config::SessionConfig;
use crate::device::Device;
use crate::error::AudioIoError;
use crate::event::{event_callback, Direction, EventCallback, StreamEvent};
use crate::format::SampleFormat;
use crate::ring::RingBuffer;
use crate::session::{ActiveStream, AudioSession};
use crate::stream::{InputDriver, OutputDriver, StreamController, StreamSpec};

/// Which device a stream opens.
#[derive(Debug, Clone, Default)]
pub enum DeviceSelection {
    /// The backend's default device for the stream's direction.
    #[default]
    Default,
    /// A device looked up by its backend-unique id.
    Id(String),
    /// A device by index into the current catalog snapshot.
    Index(usize),
}

/// Builder for connecting an [`AudioSession`].
///
/// # Example
///
/// ```no_run
/// use duplex_audio::{AudioSession, BackendId, StreamEvent};
///
/// # fn main() -> Result<(), duplex_audio::AudioIoError> {
/// let session = AudioSession::builder()
///     .backend(BackendId::Dummy)
///     .on_event(|event| {
///         if let StreamEvent::Overflow { .. } = event {
///             eprintln!("capture data lost");
///         }
///     })
///     .connect()?;
/// # drop(session);
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct SessionBuilder {
    backend: Option<BackendId>,
    config: SessionConfig,
    event_callback: Option<EventCallback>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            config: SessionConfig::default(),
            event_callback: None,
        }
    }

    /// Pins a specific backend instead of trying the platform's in order.
    pub fn backend(mut self, backend: BackendId) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets session-wide configuration.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a callback for runtime events.
    ///
    /// Overflow and underflow events arrive on the backend's driver thread;
    /// the callback must return quickly and must not block.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Connects to the backend and takes the initial device snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AudioIoError::BackendUnavailable`] when the requested
    /// backend cannot be reached, or an enumeration error from the initial
    /// snapshot.
    pub fn connect(self) -> Result<AudioSession, AudioIoError> {
        let backend = backend::connect(self.backend)?;
        AudioSession::new(backend, self.config, self.event_callback)
    }
}

/// Builder for a capture stream, obtained from
/// [`AudioSession::input_stream`].
///
/// Unset parameters are negotiated against the device: sample rate and
/// format walk the priority tables, the channel count defaults to stereo.
/// `start` freezes the result and begins capture.
#[must_use]
pub struct InputStreamBuilder<'a> {
    session: &'a mut AudioSession,
    device: DeviceSelection,
    sample_rate: Option<u32>,
    format: Option<SampleFormat>,
    channels: u16,
    block_size: Option<usize>,
    callback: Option<ReadCallback>,
}

impl<'a> InputStreamBuilder<'a> {
    pub(crate) fn new(session: &'a mut AudioSession) -> Self {
        Self {
            session,
            device: DeviceSelection::Default,
            sample_rate: None,
            format: None,
            channels: 2,
            block_size: None,
            callback: None,
        }
    }

    /// Selects the capture device. Default: the backend's default input.
    pub fn device(mut self, selection: DeviceSelection) -> Self {
        self.device = selection;
        self
    }

    /// Requests an exact sample rate.
    ///
    /// A rate the device does not advertise fails `start` with
    /// [`AudioIoError::InvalidSampleRate`].
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Requests an exact sample format.
    pub fn format(mut self, format: SampleFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the channel count. Default: 2.
    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Delivers captured audio in blocks of exactly this many frames.
    ///
    /// Without a block size the read callback receives whatever is buffered
    /// when the bridge wakes. Also drives the latency requested from the
    /// backend.
    pub fn block_size(mut self, frames: usize) -> Self {
        self.block_size = Some(frames);
        self
    }

    /// The callback receiving captured interleaved bytes with their frame
    /// count. Runs on the bridge worker thread.
    pub fn read_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8], usize) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Negotiates, opens and starts the capture stream.
    ///
    /// Returns the frozen parameters. The session keeps the stream until
    /// [`AudioSession::stop_input`] or drop.
    pub fn start(self) -> Result<StreamSpec, AudioIoError> {
        let Self {
            session,
            device,
            sample_rate,
            format,
            channels,
            block_size,
            callback,
        } = self;

        session.ensure_input_free()?;
        let callback = callback.ok_or_else(|| AudioIoError::StreamCreationFailed {
            direction: Direction::Input,
            reason: "no read callback configured".to_string(),
        })?;

        let device = select_device(session, Direction::Input, &device)?;
        let spec = negotiate(
            session,
            &device,
            Direction::Input,
            sample_rate,
            format,
            channels,
            block_size,
        )?;

        let ring = RingBuffer::with_capacity(ring_capacity(session.config(), &spec))?;
        let (writer, reader) = ring.split();
        let shared = Arc::new(BridgeShared::new());
        let driver = InputDriver::new(writer, &spec, session.hub(), shared.clone());

        let mut controller = StreamController::new(spec.clone());
        controller.open_input(session.backend().as_ref(), driver)?;
        controller.start()?;

        let bridge = bridge::spawn_input(
            shared,
            reader,
            callback,
            spec.block_frames,
            spec.bytes_per_frame(),
        )?;

        tracing::info!(
            device = %spec.device_name,
            sample_rate = spec.sample_rate,
            format = %spec.format,
            layout = %spec.layout,
            "input stream started"
        );
        session.install_input(ActiveStream::new(controller, bridge, None));
        Ok(spec)
    }
}

/// Builder for a playback stream, obtained from
/// [`AudioSession::output_stream`].
///
/// The write callback is polled for one block at a time whenever the ring
/// has space; it runs on the bridge worker thread.
#[must_use]
pub struct OutputStreamBuilder<'a> {
    session: &'a mut AudioSession,
    device: DeviceSelection,
    sample_rate: Option<u32>,
    format: Option<SampleFormat>,
    channels: u16,
    block_size: Option<usize>,
    callback: Option<WriteCallback>,
}

impl<'a> OutputStreamBuilder<'a> {
    pub(crate) fn new(session: &'a mut AudioSession) -> Self {
        Self {
            session,
            device: DeviceSelection::Default,
            sample_rate: None,
            format: None,
            channels: 2,
            block_size: None,
            callback: None,
        }
    }

    /// Selects the playback device. Default: the backend's default output.
    pub fn device(mut self, selection: DeviceSelection) -> Self {
        self.device = selection;
        self
    }

    /// Requests an exact sample rate.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Requests an exact sample format.
    pub fn format(mut self, format: SampleFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the channel count. Default: 2.
    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Frames requested from the write callback per invocation.
    ///
    /// Defaults to one software-latency period. Also drives the latency
    /// requested from the backend.
    pub fn block_size(mut self, frames: usize) -> Self {
        self.block_size = Some(frames);
        self
    }

    /// The callback producing interleaved bytes for playback.
    ///
    /// Gets a zeroed buffer and its frame count, returns the byte count it
    /// filled; any shortfall plays as silence. Runs on the bridge worker
    /// thread.
    pub fn write_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut [u8], usize) -> usize + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Negotiates, opens and starts the playback stream.
    ///
    /// The bridge worker is started and kicked before the backend stream so
    /// the ring already holds audio when the first hardware period runs.
    pub fn start(self) -> Result<StreamSpec, AudioIoError> {
        let Self {
            session,
            device,
            sample_rate,
            format,
            channels,
            block_size,
            callback,
        } = self;

        session.ensure_output_free()?;
        let callback = callback.ok_or_else(|| AudioIoError::StreamCreationFailed {
            direction: Direction::Output,
            reason: "no write callback configured".to_string(),
        })?;

        let device = select_device(session, Direction::Output, &device)?;
        let spec = negotiate(
            session,
            &device,
            Direction::Output,
            sample_rate,
            format,
            channels,
            block_size,
        )?;

        let ring = RingBuffer::with_capacity(ring_capacity(session.config(), &spec))?;
        let (writer, reader) = ring.split();
        let shared = Arc::new(BridgeShared::new());
        let clear_requested = Arc::new(AtomicBool::new(false));
        let driver = OutputDriver::new(
            reader,
            &spec,
            session.hub(),
            shared.clone(),
            clear_requested.clone(),
        );

        let mut controller = StreamController::new(spec.clone());
        controller.open_output(session.backend().as_ref(), driver)?;

        // Block size falls back to one period of the actual latency.
        let block_frames = match spec.block_frames {
            Some(frames) => frames,
            None => {
                let latency = controller.software_latency()?;
                ((latency * f64::from(spec.sample_rate)) as usize).max(1)
            }
        };
        let bridge = bridge::spawn_output(
            shared.clone(),
            writer,
            callback,
            block_frames,
            spec.bytes_per_frame(),
        )?;
        // Kick the worker so the ring is primed before the first period.
        shared.notify();

        controller.start()?;

        tracing::info!(
            device = %spec.device_name,
            sample_rate = spec.sample_rate,
            format = %spec.format,
            layout = %spec.layout,
            block_frames,
            "output stream started"
        );
        session.install_output(ActiveStream::new(
            controller,
            bridge,
            Some(clear_requested),
        ));
        Ok(spec)
    }
}

fn select_device(
    session: &AudioSession,
    direction: Direction,
    selection: &DeviceSelection,
) -> Result<Device, AudioIoError> {
    let catalog = session.catalog();
    let device = match (direction, selection) {
        (Direction::Input, DeviceSelection::Default) => catalog.default_input_device()?,
        (Direction::Output, DeviceSelection::Default) => catalog.default_output_device()?,
        (Direction::Input, DeviceSelection::Index(i)) => catalog.input_device(*i)?,
        (Direction::Output, DeviceSelection::Index(i)) => catalog.output_device(*i)?,
        (Direction::Input, DeviceSelection::Id(id)) => catalog
            .input_device_by_id(id)
            .ok_or_else(|| AudioIoError::DeviceUnavailable {
                direction,
                detail: format!("no input device with id {id:?}"),
            })?,
        (Direction::Output, DeviceSelection::Id(id)) => catalog
            .output_device_by_id(id)
            .ok_or_else(|| AudioIoError::DeviceUnavailable {
                direction,
                detail: format!("no output device with id {id:?}"),
            })?,
    };
    if let Some(reason) = &device.probe_error {
        return Err(AudioIoError::ProbeFailed {
            name: device.name.clone(),
            reason: reason.clone(),
        });
    }
    Ok(device.clone())
}

fn negotiate(
    session: &AudioSession,
    device: &Device,
    direction: Direction,
    sample_rate: Option<u32>,
    format: Option<SampleFormat>,
    channels: u16,
    block_size: Option<usize>,
) -> Result<StreamSpec, AudioIoError> {
    if channels == 0 {
        return Err(AudioIoError::StreamCreationFailed {
            direction,
            reason: "channel count must be at least 1".to_string(),
        });
    }
    if block_size == Some(0) {
        return Err(AudioIoError::StreamCreationFailed {
            direction,
            reason: "block size must be at least 1 frame".to_string(),
        });
    }

    let rate = resolve_sample_rate(device, sample_rate)?;
    let format = resolve_format(device, format)?;
    let layout = resolve_layout(device, channels);

    // Explicit configuration wins; otherwise a block size implies the
    // latency needed to serve it.
    let requested_latency = session
        .config()
        .requested_latency
        .map(|d| d.as_secs_f64())
        .or_else(|| block_size.map(|frames| frames as f64 / f64::from(rate)));

    Ok(StreamSpec {
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        direction,
        sample_rate: rate,
        format,
        layout,
        requested_latency,
        block_frames: block_size,
    })
}

fn ring_capacity(config: &SessionConfig, spec: &StreamSpec) -> usize {
    let frames = (config.ring_buffer_duration.as_secs_f64() * f64::from(spec.sample_rate)).ceil();
    (frames as usize).max(1) * spec.bytes_per_frame()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelLayout;
    use std::time::Duration;

    fn dummy_session() -> AudioSession {
        AudioSession::builder()
            .backend(BackendId::Dummy)
            .connect()
            .unwrap()
    }

    #[test]
    fn test_session_builder_defaults() {
        let builder = SessionBuilder::new();
        assert!(builder.backend.is_none());
        assert!(builder.event_callback.is_none());
        assert_eq!(
            builder.config.ring_buffer_duration,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_input_stream_negotiates_defaults() {
        let mut session = dummy_session();
        let spec = session
            .input_stream()
            .read_callback(|_bytes, _frames| {})
            .start()
            .unwrap();

        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.format, SampleFormat::Float32Le);
        assert_eq!(spec.channel_count(), 2);
        assert!(session.has_input_stream());
        assert_eq!(session.input_spec().map(|s| s.sample_rate), Some(48_000));
    }

    #[test]
    fn test_second_input_stream_rejected() {
        let mut session = dummy_session();
        session
            .input_stream()
            .read_callback(|_, _| {})
            .start()
            .unwrap();
        let err = session
            .input_stream()
            .read_callback(|_, _| {})
            .start()
            .unwrap_err();
        assert!(matches!(
            err,
            AudioIoError::StreamActive {
                direction: Direction::Input
            }
        ));
    }

    #[test]
    fn test_unsupported_rate_rejected_without_side_effects() {
        let mut session = dummy_session();
        let err = session
            .input_stream()
            .sample_rate(10_000_000)
            .read_callback(|_, _| {})
            .start()
            .unwrap_err();
        assert!(matches!(err, AudioIoError::InvalidSampleRate { .. }));
        assert!(!session.has_input_stream());
    }

    #[test]
    fn test_missing_callback_rejected() {
        let mut session = dummy_session();
        let err = session.input_stream().start().unwrap_err();
        assert!(matches!(err, AudioIoError::StreamCreationFailed { .. }));

        let err = session.output_stream().start().unwrap_err();
        assert!(matches!(err, AudioIoError::StreamCreationFailed { .. }));
    }

    #[test]
    fn test_invalid_channel_and_block_values_rejected() {
        let mut session = dummy_session();
        let err = session
            .input_stream()
            .channels(0)
            .read_callback(|_, _| {})
            .start()
            .unwrap_err();
        assert!(matches!(err, AudioIoError::StreamCreationFailed { .. }));

        let err = session
            .output_stream()
            .block_size(0)
            .write_callback(|_, _| 0)
            .start()
            .unwrap_err();
        assert!(matches!(err, AudioIoError::StreamCreationFailed { .. }));
    }

    #[test]
    fn test_device_selection_by_id_and_index() {
        let mut session = dummy_session();
        let spec = session
            .input_stream()
            .device(DeviceSelection::Id("dummy-in".to_string()))
            .read_callback(|_, _| {})
            .start()
            .unwrap();
        assert_eq!(spec.device_id, "dummy-in");
        session.stop_input();

        let spec = session
            .input_stream()
            .device(DeviceSelection::Index(0))
            .read_callback(|_, _| {})
            .start()
            .unwrap();
        assert_eq!(spec.device_id, "dummy-in");
        session.stop_input();

        let err = session
            .input_stream()
            .device(DeviceSelection::Id("absent".to_string()))
            .read_callback(|_, _| {})
            .start()
            .unwrap_err();
        assert!(matches!(err, AudioIoError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_output_stream_negotiates_and_stops() {
        let mut session = dummy_session();
        let spec = session
            .output_stream()
            .sample_rate(44_100)
            .format(SampleFormat::S16Le)
            .channels(1)
            .block_size(256)
            .write_callback(|bytes, _frames| bytes.len())
            .start()
            .unwrap();

        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.format, SampleFormat::S16Le);
        assert_eq!(spec.layout, ChannelLayout::mono());
        assert_eq!(spec.block_frames, Some(256));
        assert!(session.has_output_stream());

        session.stop_output();
        assert!(!session.has_output_stream());
    }

    #[test]
    fn test_ring_capacity_scales_with_config() {
        let spec = StreamSpec {
            device_id: "x".to_string(),
            device_name: "X".to_string(),
            direction: Direction::Input,
            sample_rate: 48_000,
            format: SampleFormat::S16Le,
            layout: ChannelLayout::stereo(),
            requested_latency: None,
            block_frames: None,
        };
        let config = SessionConfig {
            ring_buffer_duration: Duration::from_secs(1),
            ..SessionConfig::default()
        };
        // One second of stereo s16 at 48 kHz.
        assert_eq!(ring_capacity(&config, &spec), 48_000 * 4);
    }
}
