//! Pluggable audio backend boundary.
//!
//! Everything platform-specific lives behind [`Backend`]: device
//! enumeration and probing, stream creation, and the per-period exchange
//! that hands hardware buffers to the core driver algorithms. The core never
//! sees raw driver structures, only [`Device`](crate::Device) values, RAII
//! [`StreamHandle`]s, and borrowed [`ReadSpan`]/[`WriteSpan`] views.
//!
//! Two implementations ship with the crate:
//!
//! - [`dummy::DummyBackend`]: timer-driven, no hardware, always available.
//!   Tests and CI run on it.
//! - `CpalBackend` (feature `cpal-backend`, on by default): real hardware
//!   through CPAL (ALSA, CoreAudio, WASAPI).
//!
//! The trait is object-safe so a session can select its backend at runtime.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::device::Device;
use crate::error::AudioIoError;
use crate::stream::{InputDriver, OutputDriver, StreamSpec};

pub mod dummy;

#[cfg(feature = "cpal-backend")]
pub mod cpal_host;

/// Identifies a platform audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Advanced Linux Sound Architecture.
    Alsa,
    /// PulseAudio sound server (Linux).
    PulseAudio,
    /// JACK Audio Connection Kit.
    Jack,
    /// CoreAudio (macOS).
    CoreAudio,
    /// Windows Audio Session API.
    Wasapi,
    /// The built-in no-hardware backend.
    Dummy,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendId::Alsa => "ALSA",
            BackendId::PulseAudio => "PulseAudio",
            BackendId::Jack => "JACK",
            BackendId::CoreAudio => "CoreAudio",
            BackendId::Wasapi => "WASAPI",
            BackendId::Dummy => "Dummy",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alsa" => Ok(BackendId::Alsa),
            "pulseaudio" | "pulse" => Ok(BackendId::PulseAudio),
            "jack" => Ok(BackendId::Jack),
            "coreaudio" => Ok(BackendId::CoreAudio),
            "wasapi" => Ok(BackendId::Wasapi),
            "dummy" => Ok(BackendId::Dummy),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Placement of one channel's samples within a period's byte region.
///
/// Sample `f` of this channel starts at `offset + f * step` in the region.
/// Interleaved hardware reports `offset = index * bytes_per_sample` and
/// `step = bytes_per_frame`; planar hardware reports per-plane offsets with
/// `step = bytes_per_sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArea {
    /// Byte offset of the channel's first sample.
    pub offset: usize,
    /// Byte stride between the channel's successive frames.
    pub step: usize,
}

impl ChannelArea {
    /// Areas for `channels` interleaved channels of `bytes_per_sample`-wide
    /// samples.
    #[must_use]
    pub fn interleaved(channels: u16, bytes_per_sample: usize) -> Vec<ChannelArea> {
        let step = bytes_per_sample * channels as usize;
        (0..channels as usize)
            .map(|ch| ChannelArea {
                offset: ch * bytes_per_sample,
                step,
            })
            .collect()
    }
}

/// Captured bytes for part of an input period.
#[derive(Debug)]
pub struct ReadAreas<'a> {
    /// The span's backing bytes.
    pub bytes: &'a [u8],
    /// Where each channel's samples sit inside `bytes`, in layout order.
    pub areas: &'a [ChannelArea],
    /// Frames covered by this span.
    pub frames: usize,
}

/// One step of an input period exchange.
#[derive(Debug)]
pub enum ReadSpan<'a> {
    /// Captured audio to copy out.
    Areas(ReadAreas<'a>),
    /// A hole: the device lost this many frames; the driver records
    /// silence in their place so stream time stays continuous.
    Silence(usize),
    /// Nothing further this period.
    Empty,
}

/// Writable areas for part of an output period.
#[derive(Debug)]
pub struct WriteAreas<'a> {
    /// The span's backing bytes, to be filled by the driver.
    pub bytes: &'a mut [u8],
    /// Where each channel's samples sit inside `bytes`, in layout order.
    pub areas: &'a [ChannelArea],
    /// Frames covered by this span.
    pub frames: usize,
}

/// One step of an output period exchange.
#[derive(Debug)]
pub enum WriteSpan<'a> {
    /// Areas the hardware wants filled.
    Areas(WriteAreas<'a>),
    /// The backend wants nothing for this many frames; the driver drops
    /// that much buffered audio to stay time-aligned.
    Skip(usize),
    /// Nothing further this period.
    Empty,
}

/// An input period being exchanged between backend and driver.
///
/// The backend constructs one per hardware callback and passes it to
/// [`InputDriver::run_period`]. The driver claims spans with `begin_read`,
/// copies them, and closes each with `end_read`; it never holds a span
/// across `end_read`.
pub trait InputPeriod {
    /// Frames the backend requires and offers for this period:
    /// `(frame_count_min, frame_count_max)`. If fewer than
    /// `frame_count_min` frames can be accepted the period's audio is lost.
    fn frame_bounds(&self) -> (usize, usize);

    /// Claims the next span, at most `max_frames` long.
    fn begin_read(&mut self, max_frames: usize) -> ReadSpan<'_>;

    /// Closes the span claimed by the last `begin_read`.
    fn end_read(&mut self);
}

/// An output period being exchanged between backend and driver.
///
/// Mirror of [`InputPeriod`] for the playback direction.
pub trait OutputPeriod {
    /// `(frame_count_min, frame_count_max)` for this period. If fewer than
    /// `frame_count_min` frames of audio are buffered the period plays
    /// silence.
    fn frame_bounds(&self) -> (usize, usize);

    /// Claims the next writable span, at most `max_frames` long.
    fn begin_write(&mut self, max_frames: usize) -> WriteSpan<'_>;

    /// Commits the span claimed by the last `begin_write`.
    fn end_write(&mut self);
}

/// A live backend stream.
///
/// Returned by [`Backend::open_input`]/[`Backend::open_output`] with the
/// stream in the opened, not-yet-running state. Dropping the handle destroys
/// the backend stream and guarantees its driver callback has quiesced before
/// the drop returns; ring memory therefore outlives every callback.
///
/// Handles are not `Send`: some platform streams are bound to the thread
/// that created them.
pub trait StreamHandle {
    /// Begins (or resumes after pause) hardware I/O.
    fn start(&mut self) -> Result<(), AudioIoError>;

    /// Pauses or resumes the stream. Backends that cannot pause return an
    /// error, which the controller propagates.
    fn pause(&mut self, paused: bool) -> Result<(), AudioIoError>;

    /// The software latency actually in effect, in seconds.
    fn software_latency(&self) -> f64;
}

/// The capability set a platform backend provides to the core.
///
/// Object-safe: sessions hold `Arc<dyn Backend>` and pick the
/// implementation at connect time. Enumeration returns fully probed
/// [`Device`] values; a device whose probe failed carries its
/// `probe_error` rather than being hidden.
pub trait Backend: Send + Sync {
    /// Which subsystem this backend drives.
    fn id(&self) -> BackendId;

    /// All capture endpoints, probed, in backend order.
    fn input_devices(&self) -> Result<Vec<Device>, AudioIoError>;

    /// All playback endpoints, probed, in backend order.
    fn output_devices(&self) -> Result<Vec<Device>, AudioIoError>;

    /// Index of the default capture device within the list
    /// [`input_devices`](Self::input_devices) returned, if any.
    fn default_input_index(&self) -> Option<usize>;

    /// Index of the default playback device within the list
    /// [`output_devices`](Self::output_devices) returned, if any.
    fn default_output_index(&self) -> Option<usize>;

    /// Opens a capture stream on the device named by `spec.device_id`,
    /// wiring `driver` into the hardware callback. The stream comes back
    /// opened but not started.
    fn open_input(
        &self,
        spec: &StreamSpec,
        driver: InputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError>;

    /// Opens a playback stream; mirror of [`open_input`](Self::open_input).
    fn open_output(
        &self,
        spec: &StreamSpec,
        driver: OutputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError>;
}

/// Connects to a backend.
///
/// `None` picks the platform's default hardware backend when the
/// `cpal-backend` feature is enabled, and the dummy backend otherwise.
/// An explicit hardware id fails with
/// [`AudioIoError::BackendUnavailable`] when that subsystem cannot be
/// reached from this build.
pub fn connect(requested: Option<BackendId>) -> Result<Arc<dyn Backend>, AudioIoError> {
    match requested {
        Some(BackendId::Dummy) => Ok(Arc::new(dummy::DummyBackend::new())),
        #[cfg(feature = "cpal-backend")]
        other => cpal_host::connect(other),
        #[cfg(not(feature = "cpal-backend"))]
        None => {
            tracing::info!("cpal-backend feature disabled, connecting dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        #[cfg(not(feature = "cpal-backend"))]
        Some(id) => Err(AudioIoError::BackendUnavailable { backend: id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_id_display() {
        assert_eq!(BackendId::Alsa.to_string(), "ALSA");
        assert_eq!(BackendId::Dummy.to_string(), "Dummy");
    }

    #[test]
    fn test_backend_id_from_str() {
        assert_eq!("alsa".parse::<BackendId>(), Ok(BackendId::Alsa));
        assert_eq!("Pulse".parse::<BackendId>(), Ok(BackendId::PulseAudio));
        assert_eq!("DUMMY".parse::<BackendId>(), Ok(BackendId::Dummy));
        assert!("asio".parse::<BackendId>().is_err());
    }

    #[test]
    fn test_interleaved_areas() {
        let areas = ChannelArea::interleaved(2, 4);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0], ChannelArea { offset: 0, step: 8 });
        assert_eq!(areas[1], ChannelArea { offset: 4, step: 8 });
    }

    #[test]
    fn test_connect_dummy() {
        let backend = connect(Some(BackendId::Dummy)).unwrap();
        assert_eq!(backend.id(), BackendId::Dummy);
    }
}
