//! Stream lifecycle and the driver-side period algorithms.
//!
//! A stream's negotiated parameters are frozen into a [`StreamSpec`] before
//! it opens; the driver algorithms only ever read that value, never shared
//! mutable configuration. The [`InputDriver`] and [`OutputDriver`] run on
//! the backend's realtime thread once per hardware period: they move bytes
//! between the period's channel areas and the ring buffer, detect
//! overflow/underflow, publish the cursor exactly once per period, and wake
//! the transfer bridge. They never allocate, lock, or block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, InputPeriod, OutputPeriod, ReadSpan, StreamHandle, WriteSpan};
use crate::bridge::BridgeShared;
use crate::error::AudioIoError;
use crate::event::Direction;
use crate::format::{ChannelLayout, SampleFormat};
use crate::ring::{RingReader, RingWriter};
use crate::session::EventHub;

/// Negotiated stream parameters, frozen before the stream opens.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Id of the device the stream is bound to.
    pub device_id: String,
    /// Display name of the device, for messages.
    pub device_name: String,
    /// Capture or playback.
    pub direction: Direction,
    /// Negotiated sample rate in Hz.
    pub sample_rate: u32,
    /// Negotiated sample format.
    pub format: SampleFormat,
    /// Negotiated channel layout; its order is the interleave order.
    pub layout: ChannelLayout,
    /// Software latency to request from the backend, in seconds.
    pub requested_latency: Option<f64>,
    /// Application block size in frames, if the caller set one.
    pub block_frames: Option<usize>,
}

impl StreamSpec {
    /// Number of interleaved channels.
    #[must_use]
    pub fn channel_count(&self) -> u16 {
        self.layout.channel_count()
    }

    /// Width of one sample in bytes.
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    /// Width of one frame in bytes.
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_frame(self.channel_count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Created,
    Opened,
    Started,
    Paused,
    Closed,
}

impl StreamState {
    fn name(self) -> &'static str {
        match self {
            StreamState::Created => "Created",
            StreamState::Opened => "Opened",
            StreamState::Started => "Started",
            StreamState::Paused => "Paused",
            StreamState::Closed => "Closed",
        }
    }
}

/// Owns one backend stream and enforces the lifecycle
/// `Created -> Opened -> Started <-> Paused -> Closed`.
pub(crate) struct StreamController {
    spec: StreamSpec,
    state: StreamState,
    handle: Option<Box<dyn StreamHandle>>,
}

impl StreamController {
    pub(crate) fn new(spec: StreamSpec) -> Self {
        Self {
            spec,
            state: StreamState::Created,
            handle: None,
        }
    }

    pub(crate) fn spec(&self) -> &StreamSpec {
        &self.spec
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: &'static str,
        valid: &[StreamState],
    ) -> Result<(), AudioIoError> {
        if valid.contains(&self.state) {
            Ok(())
        } else {
            Err(AudioIoError::InvalidState {
                operation,
                expected,
                actual: self.state.name(),
            })
        }
    }

    pub(crate) fn open_input(
        &mut self,
        backend: &dyn Backend,
        driver: InputDriver,
    ) -> Result<(), AudioIoError> {
        self.expect_state("open", "Created", &[StreamState::Created])?;
        let handle = backend.open_input(&self.spec, driver)?;
        self.handle = Some(handle);
        self.state = StreamState::Opened;
        tracing::debug!(device = %self.spec.device_name, "input stream opened");
        Ok(())
    }

    pub(crate) fn open_output(
        &mut self,
        backend: &dyn Backend,
        driver: OutputDriver,
    ) -> Result<(), AudioIoError> {
        self.expect_state("open", "Created", &[StreamState::Created])?;
        let handle = backend.open_output(&self.spec, driver)?;
        self.handle = Some(handle);
        self.state = StreamState::Opened;
        tracing::debug!(device = %self.spec.device_name, "output stream opened");
        Ok(())
    }

    pub(crate) fn start(&mut self) -> Result<(), AudioIoError> {
        self.expect_state(
            "start",
            "Opened or Paused",
            &[StreamState::Opened, StreamState::Paused],
        )?;
        match self.handle.as_mut() {
            Some(handle) => {
                handle.start()?;
                self.state = StreamState::Started;
                Ok(())
            }
            None => Err(AudioIoError::InvalidState {
                operation: "start",
                expected: "Opened or Paused",
                actual: "Closed",
            }),
        }
    }

    pub(crate) fn pause(&mut self, paused: bool) -> Result<(), AudioIoError> {
        if paused {
            self.expect_state("pause", "Started", &[StreamState::Started])?;
        } else {
            self.expect_state("resume", "Paused", &[StreamState::Paused])?;
        }
        match self.handle.as_mut() {
            Some(handle) => {
                handle.pause(paused)?;
                self.state = if paused {
                    StreamState::Paused
                } else {
                    StreamState::Started
                };
                Ok(())
            }
            None => Err(AudioIoError::InvalidState {
                operation: "pause",
                expected: "Started or Paused",
                actual: "Closed",
            }),
        }
    }

    /// Destroys the backend stream handle. Idempotent. Returns whether this
    /// call did the destruction.
    ///
    /// Dropping the handle is the quiesce point: the backend guarantees its
    /// driver callback has finished and will not run again once the drop
    /// returns, so ring memory released afterwards is safe.
    pub(crate) fn close(&mut self) -> bool {
        if self.state == StreamState::Closed {
            return false;
        }
        self.handle = None;
        self.state = StreamState::Closed;
        tracing::debug!(
            device = %self.spec.device_name,
            direction = %self.spec.direction,
            "stream closed"
        );
        true
    }

    pub(crate) fn software_latency(&self) -> Result<f64, AudioIoError> {
        match &self.handle {
            Some(handle) => Ok(handle.software_latency()),
            None => Err(AudioIoError::InvalidState {
                operation: "latency query",
                expected: "Opened, Started or Paused",
                actual: self.state.name(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reports asynchronous stream failures into the session's event channel.
///
/// Backends clone one out of a driver (via
/// [`InputDriver::error_reporter`]/[`OutputDriver::error_reporter`]) and
/// call it from their error callbacks. Delivery is out-of-band: it never
/// touches the data path.
#[derive(Clone)]
pub struct StreamErrorReporter {
    direction: Direction,
    hub: Arc<EventHub>,
}

impl StreamErrorReporter {
    /// Forwards one backend failure to the event callback and stats.
    pub fn report(&self, message: impl Into<String>) {
        self.hub.stream_error(self.direction, message.into());
    }
}

impl std::fmt::Debug for StreamErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamErrorReporter")
            .field("direction", &self.direction)
            .finish()
    }
}

/// Writes bytes into the ring's two free spans as one logical region.
struct WriteCursor<'a> {
    first: &'a mut [u8],
    second: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    fn new(regions: (&'a mut [u8], &'a mut [u8])) -> Self {
        Self {
            first: regions.0,
            second: regions.1,
            pos: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let mut offset = 0;
        while offset < bytes.len() {
            let (dst, dst_pos) = if self.pos < self.first.len() {
                (&mut *self.first, self.pos)
            } else {
                (&mut *self.second, self.pos - self.first.len())
            };
            let n = (bytes.len() - offset).min(dst.len() - dst_pos);
            dst[dst_pos..dst_pos + n].copy_from_slice(&bytes[offset..offset + n]);
            offset += n;
            self.pos += n;
        }
    }

    fn push_zeros(&mut self, count: usize) {
        let mut remaining = count;
        while remaining > 0 {
            let (dst, dst_pos) = if self.pos < self.first.len() {
                (&mut *self.first, self.pos)
            } else {
                (&mut *self.second, self.pos - self.first.len())
            };
            let n = remaining.min(dst.len() - dst_pos);
            dst[dst_pos..dst_pos + n].fill(0);
            remaining -= n;
            self.pos += n;
        }
    }
}

/// Reads bytes from the ring's two filled spans as one logical region.
struct ReadCursor<'a> {
    first: &'a [u8],
    second: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    fn new(regions: (&'a [u8], &'a [u8])) -> Self {
        Self {
            first: regions.0,
            second: regions.1,
            pos: 0,
        }
    }

    fn pull(&mut self, dst: &mut [u8]) {
        let mut offset = 0;
        while offset < dst.len() {
            let (src, src_pos) = if self.pos < self.first.len() {
                (self.first, self.pos)
            } else {
                (self.second, self.pos - self.first.len())
            };
            let n = (dst.len() - offset).min(src.len() - src_pos);
            dst[offset..offset + n].copy_from_slice(&src[src_pos..src_pos + n]);
            offset += n;
            self.pos += n;
        }
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }
}

/// The capture-side realtime handler.
///
/// Constructed by the session when an input stream starts and handed to the
/// backend, which calls [`run_period`](Self::run_period) once per hardware
/// period from its driver thread.
pub struct InputDriver {
    writer: RingWriter,
    bytes_per_frame: usize,
    bytes_per_sample: usize,
    hub: Arc<EventHub>,
    bridge: Arc<BridgeShared>,
}

impl InputDriver {
    pub(crate) fn new(
        writer: RingWriter,
        spec: &StreamSpec,
        hub: Arc<EventHub>,
        bridge: Arc<BridgeShared>,
    ) -> Self {
        Self {
            writer,
            bytes_per_frame: spec.bytes_per_frame(),
            bytes_per_sample: spec.bytes_per_sample(),
            hub,
            bridge,
        }
    }

    /// A handle for the backend's error callback.
    #[must_use]
    pub fn error_reporter(&self) -> StreamErrorReporter {
        StreamErrorReporter {
            direction: Direction::Input,
            hub: self.hub.clone(),
        }
    }

    /// Consumes one hardware period into the ring buffer.
    ///
    /// When the ring cannot hold even `frame_count_min` frames the period
    /// is dropped at the backend, one overflow event fires, and the cursors
    /// stay untouched. Otherwise up to `frame_count_max` frames are copied
    /// (holes become silence) and the write cursor advances once.
    pub fn run_period(&mut self, period: &mut dyn InputPeriod) {
        let (min_frames, max_frames) = period.frame_bounds();
        let bytes_per_frame = self.bytes_per_frame;
        let free_frames = self.writer.free_count() / bytes_per_frame;

        if free_frames < min_frames {
            self.hub.overflow(Direction::Input, min_frames, free_frames);
            return;
        }

        let total_frames = free_frames.min(max_frames);
        let mut frames_left = total_frames;
        let mut dst = WriteCursor::new(self.writer.write_regions());

        while frames_left > 0 {
            match period.begin_read(frames_left) {
                ReadSpan::Empty => break,
                ReadSpan::Silence(frames) => {
                    let frames = frames.min(frames_left);
                    dst.push_zeros(frames * bytes_per_frame);
                    period.end_read();
                    frames_left -= frames;
                }
                ReadSpan::Areas(areas) => {
                    let frames = areas.frames.min(frames_left);
                    for frame in 0..frames {
                        for area in areas.areas {
                            let start = area.offset + frame * area.step;
                            dst.push(&areas.bytes[start..start + self.bytes_per_sample]);
                        }
                    }
                    period.end_read();
                    frames_left -= frames;
                }
            }
        }

        let written = (total_frames - frames_left) * bytes_per_frame;
        if written > 0 {
            self.writer.advance_write(written);
            self.hub.add_captured_frames(total_frames - frames_left);
            self.bridge.notify();
        }
    }
}

/// The playback-side realtime handler. Mirror of [`InputDriver`].
pub struct OutputDriver {
    reader: RingReader,
    bytes_per_frame: usize,
    bytes_per_sample: usize,
    hub: Arc<EventHub>,
    bridge: Arc<BridgeShared>,
    clear_requested: Arc<AtomicBool>,
}

impl OutputDriver {
    pub(crate) fn new(
        reader: RingReader,
        spec: &StreamSpec,
        hub: Arc<EventHub>,
        bridge: Arc<BridgeShared>,
        clear_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            bytes_per_frame: spec.bytes_per_frame(),
            bytes_per_sample: spec.bytes_per_sample(),
            hub,
            bridge,
            clear_requested,
        }
    }

    /// A handle for the backend's error callback.
    #[must_use]
    pub fn error_reporter(&self) -> StreamErrorReporter {
        StreamErrorReporter {
            direction: Direction::Output,
            hub: self.hub.clone(),
        }
    }

    /// Produces one hardware period from the ring buffer.
    ///
    /// When fewer than `frame_count_min` frames are buffered the period is
    /// filled with silence, one underflow event fires, and the buffered
    /// partial data stays queued for the next period. Otherwise up to
    /// `frame_count_max` frames are copied out and the read cursor advances
    /// once.
    pub fn run_period(&mut self, period: &mut dyn OutputPeriod) {
        if self.clear_requested.swap(false, Ordering::AcqRel) {
            self.reader.clear();
        }

        let (min_frames, max_frames) = period.frame_bounds();
        let bytes_per_frame = self.bytes_per_frame;
        let fill_frames = self.reader.fill_count() / bytes_per_frame;

        if fill_frames < min_frames {
            self.hub.underflow(Direction::Output, min_frames, fill_frames);
            Self::write_silence(period, max_frames);
            self.bridge.notify();
            return;
        }

        let total_frames = fill_frames.min(max_frames);
        let mut frames_left = total_frames;
        let mut src = ReadCursor::new(self.reader.read_regions());
        let mut sample = [0u8; 8];
        let sample_len = self.bytes_per_sample;

        while frames_left > 0 {
            match period.begin_write(frames_left) {
                WriteSpan::Empty => break,
                WriteSpan::Skip(frames) => {
                    let frames = frames.min(frames_left);
                    src.skip(frames * bytes_per_frame);
                    period.end_write();
                    frames_left -= frames;
                }
                WriteSpan::Areas(areas) => {
                    let frames = areas.frames.min(frames_left);
                    for frame in 0..frames {
                        for area in areas.areas {
                            let start = area.offset + frame * area.step;
                            src.pull(&mut sample[..sample_len]);
                            areas.bytes[start..start + sample_len]
                                .copy_from_slice(&sample[..sample_len]);
                        }
                    }
                    period.end_write();
                    frames_left -= frames;
                }
            }
        }

        let consumed = (total_frames - frames_left) * bytes_per_frame;
        if consumed > 0 {
            self.reader.advance_read(consumed);
            self.hub.add_rendered_frames(total_frames - frames_left);
        }
        self.bridge.notify();
    }

    fn write_silence(period: &mut dyn OutputPeriod, max_frames: usize) {
        let mut frames_left = max_frames;
        while frames_left > 0 {
            match period.begin_write(frames_left) {
                WriteSpan::Empty => break,
                WriteSpan::Skip(frames) => {
                    period.end_write();
                    frames_left -= frames.min(frames_left);
                }
                WriteSpan::Areas(areas) => {
                    let frames = areas.frames.min(frames_left);
                    areas.bytes.fill(0);
                    period.end_write();
                    frames_left -= frames;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChannelArea, ReadAreas, WriteAreas};
    use crate::event::StreamEvent;
    use crate::ring::RingBuffer;
    use std::sync::Mutex;

    fn spec(direction: Direction, channels: u16) -> StreamSpec {
        StreamSpec {
            device_id: "test".to_string(),
            device_name: "Test Device".to_string(),
            direction,
            sample_rate: 48_000,
            format: SampleFormat::S16Le,
            layout: ChannelLayout::default_for(channels),
            requested_latency: None,
            block_frames: None,
        }
    }

    fn collecting_hub() -> (Arc<EventHub>, Arc<Mutex<Vec<StreamEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let hub = Arc::new(EventHub::new(Some(crate::event::event_callback(
            move |event| {
                sink.lock().unwrap().push(event);
            },
        ))));
        (hub, events)
    }

    /// Serves an input period from canned data, optionally fragmenting it
    /// into short spans so the driver's begin/end loop gets exercised.
    struct FakeInputPeriod {
        min: usize,
        max: usize,
        bytes_per_frame: usize,
        areas: Vec<ChannelArea>,
        data: Vec<u8>,
        hole_frames_first: usize,
        span_limit: usize,
        served_frames: usize,
        open: bool,
    }

    impl FakeInputPeriod {
        fn interleaved(min: usize, max: usize, channels: u16, bps: usize, data: Vec<u8>) -> Self {
            Self {
                min,
                max,
                bytes_per_frame: bps * channels as usize,
                areas: ChannelArea::interleaved(channels, bps),
                data,
                hole_frames_first: 0,
                span_limit: usize::MAX,
                served_frames: 0,
                open: false,
            }
        }
    }

    impl InputPeriod for FakeInputPeriod {
        fn frame_bounds(&self) -> (usize, usize) {
            (self.min, self.max)
        }

        fn begin_read(&mut self, max_frames: usize) -> ReadSpan<'_> {
            assert!(!self.open, "begin_read while a span is open");
            self.open = true;
            if self.hole_frames_first > 0 {
                let frames = self.hole_frames_first.min(max_frames).min(self.span_limit);
                self.hole_frames_first -= frames;
                return ReadSpan::Silence(frames);
            }
            let available = self.data.len() / self.bytes_per_frame - self.served_frames;
            if available == 0 {
                return ReadSpan::Empty;
            }
            let frames = available.min(max_frames).min(self.span_limit);
            let start = self.served_frames * self.bytes_per_frame;
            let end = start + frames * self.bytes_per_frame;
            self.served_frames += frames;
            ReadSpan::Areas(ReadAreas {
                bytes: &self.data[start..end],
                areas: &self.areas,
                frames,
            })
        }

        fn end_read(&mut self) {
            assert!(self.open, "end_read without begin_read");
            self.open = false;
        }
    }

    /// Collects what the driver writes, serving spans of a fixed size.
    struct FakeOutputPeriod {
        min: usize,
        max: usize,
        bytes_per_frame: usize,
        areas: Vec<ChannelArea>,
        scratch: Vec<u8>,
        span_frames: usize,
        collected: Vec<u8>,
        open_frames: usize,
        served_frames: usize,
    }

    impl FakeOutputPeriod {
        fn interleaved(min: usize, max: usize, channels: u16, bps: usize, span_frames: usize) -> Self {
            let bytes_per_frame = bps * channels as usize;
            Self {
                min,
                max,
                bytes_per_frame,
                areas: ChannelArea::interleaved(channels, bps),
                scratch: vec![0xEE; span_frames * bytes_per_frame],
                span_frames,
                collected: Vec::new(),
                open_frames: 0,
                served_frames: 0,
            }
        }
    }

    impl OutputPeriod for FakeOutputPeriod {
        fn frame_bounds(&self) -> (usize, usize) {
            (self.min, self.max)
        }

        fn begin_write(&mut self, max_frames: usize) -> WriteSpan<'_> {
            assert_eq!(self.open_frames, 0, "begin_write while a span is open");
            let remaining = self.max - self.served_frames;
            if remaining == 0 {
                return WriteSpan::Empty;
            }
            let frames = self.span_frames.min(max_frames).min(remaining);
            self.open_frames = frames;
            let len = frames * self.bytes_per_frame;
            WriteSpan::Areas(WriteAreas {
                bytes: &mut self.scratch[..len],
                areas: &self.areas,
                frames,
            })
        }

        fn end_write(&mut self) {
            let len = self.open_frames * self.bytes_per_frame;
            self.collected.extend_from_slice(&self.scratch[..len]);
            self.served_frames += self.open_frames;
            self.open_frames = 0;
        }
    }

    fn input_driver(capacity: usize, channels: u16) -> (InputDriver, crate::ring::RingReader, Arc<Mutex<Vec<StreamEvent>>>) {
        let (writer, reader) = RingBuffer::with_capacity(capacity).unwrap().split();
        let (hub, events) = collecting_hub();
        let driver = InputDriver::new(
            writer,
            &spec(Direction::Input, channels),
            hub,
            Arc::new(BridgeShared::new()),
        );
        (driver, reader, events)
    }

    #[test]
    fn test_input_period_copies_interleaved_bytes() {
        let (mut driver, mut reader, events) = input_driver(4096, 2);
        // 4 frames of stereo s16: distinct bytes per sample.
        let data: Vec<u8> = (0..16).collect();
        let mut period = FakeInputPeriod::interleaved(4, 4, 2, 2, data.clone());

        driver.run_period(&mut period);

        assert_eq!(reader.fill_count(), 16);
        assert_eq!(reader.read_region(), data.as_slice());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_input_period_multiple_spans_single_advance() {
        let (mut driver, mut reader, _) = input_driver(4096, 1);
        let data: Vec<u8> = (0..128u8).map(|i| i.wrapping_mul(3)).collect();
        let mut period = FakeInputPeriod::interleaved(64, 64, 1, 2, data.clone());
        // Serve in 24-frame spans so the driver must loop begin/end.
        period.span_limit = 24;

        driver.run_period(&mut period);

        assert_eq!(reader.fill_count(), 128);
        let (first, second) = reader.read_regions();
        let mut got = first.to_vec();
        got.extend_from_slice(second);
        assert_eq!(got, data);
    }

    #[test]
    fn test_input_hole_becomes_silence() {
        let (mut driver, mut reader, _) = input_driver(4096, 1);
        let data: Vec<u8> = vec![0xAB; 8];
        let mut period = FakeInputPeriod::interleaved(8, 8, 1, 2, data);
        period.hole_frames_first = 4;

        driver.run_period(&mut period);

        // 4 hole frames of zeros, then 4 data frames.
        assert_eq!(reader.fill_count(), 16);
        let region = reader.read_region();
        assert_eq!(&region[..8], &[0u8; 8]);
        assert_eq!(&region[8..16], &[0xAB; 8]);
    }

    #[test]
    fn test_input_overflow_fires_once_and_leaves_cursors_alone() {
        // Capacity 1024 bytes at 4 bytes/frame = 256 frames; pre-fill 156
        // frames so exactly 100 frames of space remain.
        let (writer, mut reader) = RingBuffer::with_capacity(1024).unwrap().split();
        let (hub, events) = collecting_hub();
        let mut driver = InputDriver::new(
            writer,
            &spec(Direction::Input, 2),
            hub,
            Arc::new(BridgeShared::new()),
        );
        let mut fill_period = FakeInputPeriod::interleaved(156, 156, 2, 2, vec![1; 156 * 4]);
        driver.run_period(&mut fill_period);
        assert_eq!(reader.fill_count(), 156 * 4);

        let mut period = FakeInputPeriod::interleaved(256, 256, 2, 2, vec![2; 256 * 4]);
        driver.run_period(&mut period);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Overflow {
                direction,
                needed_frames,
                free_frames,
            } => {
                assert_eq!(*direction, Direction::Input);
                assert_eq!(*needed_frames, 256);
                assert_eq!(*free_frames, 100);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
        assert_eq!(reader.fill_count(), 156 * 4);
    }

    #[test]
    fn test_output_period_renders_buffered_bytes() {
        let (mut writer, reader) = RingBuffer::with_capacity(4096).unwrap().split();
        let (hub, events) = collecting_hub();
        let mut driver = OutputDriver::new(
            reader,
            &spec(Direction::Output, 2),
            hub,
            Arc::new(BridgeShared::new()),
            Arc::new(AtomicBool::new(false)),
        );

        let data: Vec<u8> = (0..64).collect();
        writer.write_region()[..64].copy_from_slice(&data);
        writer.advance_write(64);

        // 16 frames of stereo s16, served in 5-frame spans.
        let mut period = FakeOutputPeriod::interleaved(16, 16, 2, 2, 5);
        driver.run_period(&mut period);

        assert_eq!(period.collected, data);
        assert_eq!(writer.free_count(), 4096);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_output_underflow_plays_silence_and_keeps_partial_data() {
        let (mut writer, reader) = RingBuffer::with_capacity(4096).unwrap().split();
        let (hub, events) = collecting_hub();
        let mut driver = OutputDriver::new(
            reader,
            &spec(Direction::Output, 1),
            hub,
            Arc::new(BridgeShared::new()),
            Arc::new(AtomicBool::new(false)),
        );

        // 3 frames buffered, period needs at least 8.
        writer.write_region()[..6].fill(0x55);
        writer.advance_write(6);

        let mut period = FakeOutputPeriod::interleaved(8, 8, 1, 2, 8);
        driver.run_period(&mut period);

        assert_eq!(period.collected, vec![0u8; 16]);
        // Partial data still buffered for the next period.
        assert_eq!(writer.fill_count(), 6);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Underflow {
                needed_frames,
                ready_frames,
                ..
            } => {
                assert_eq!(*needed_frames, 8);
                assert_eq!(*ready_frames, 3);
            }
            other => panic!("expected underflow, got {other:?}"),
        }
    }

    #[test]
    fn test_output_clear_request_discards_queued_audio() {
        let (mut writer, reader) = RingBuffer::with_capacity(4096).unwrap().split();
        let (hub, _) = collecting_hub();
        let clear = Arc::new(AtomicBool::new(false));
        let mut driver = OutputDriver::new(
            reader,
            &spec(Direction::Output, 1),
            hub,
            Arc::new(BridgeShared::new()),
            clear.clone(),
        );

        writer.write_region()[..32].fill(0x77);
        writer.advance_write(32);
        clear.store(true, Ordering::Release);

        let mut period = FakeOutputPeriod::interleaved(8, 8, 1, 2, 8);
        driver.run_period(&mut period);

        // Queue was discarded before the period, so silence played.
        assert_eq!(period.collected, vec![0u8; 16]);
        assert_eq!(writer.free_count(), 4096);
        assert!(!clear.load(Ordering::Acquire));
    }

    #[test]
    fn test_controller_lifecycle_enforced() {
        let mut controller = StreamController::new(spec(Direction::Input, 2));
        assert_eq!(controller.state_name(), "Created");

        // start before open fails
        let err = controller.start().unwrap_err();
        assert!(matches!(err, AudioIoError::InvalidState { .. }));

        // pause before open fails
        let err = controller.pause(true).unwrap_err();
        assert!(matches!(err, AudioIoError::InvalidState { .. }));

        // close from Created is fine and idempotent
        assert!(controller.close());
        assert!(!controller.close());
        assert_eq!(controller.state_name(), "Closed");

        let err = controller.start().unwrap_err();
        assert!(matches!(err, AudioIoError::InvalidState { .. }));
    }
}
