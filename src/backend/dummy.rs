//! A hardware-free backend driven by timer threads.
//!
//! Serves one capture and one playback device advertising the full format
//! table and a wide rate range. Capture periods carry a rolling byte ramp
//! so data paths can be asserted end to end; playback periods are consumed
//! and discarded. The test suite runs entirely against this backend, and it
//! doubles as a fallback for environments without audio hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{
    Backend, BackendId, ChannelArea, InputPeriod, OutputPeriod, ReadAreas, ReadSpan, StreamHandle,
    WriteAreas, WriteSpan,
};
use crate::device::{Device, LatencyRange, SampleRateRange};
use crate::error::AudioIoError;
use crate::event::Direction;
use crate::format::{ChannelLayout, SampleFormat};
use crate::stream::{InputDriver, OutputDriver, StreamSpec};

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 5_644_800;
const MIN_LATENCY: f64 = 0.01;
const MAX_LATENCY: f64 = 2.0;
const DEFAULT_LATENCY: f64 = 0.1;

/// The hardware-free backend. Stateless; every stream owns its own timer
/// thread.
#[derive(Debug, Default)]
pub struct DummyBackend;

impl DummyBackend {
    pub(crate) fn new() -> Self {
        Self
    }

    fn device(direction: Direction, id: &str, name: &str) -> Device {
        Device {
            id: id.to_string(),
            name: name.to_string(),
            direction,
            is_raw: false,
            sample_rates: vec![SampleRateRange {
                min: MIN_SAMPLE_RATE,
                max: MAX_SAMPLE_RATE,
            }],
            current_sample_rate: 48_000,
            formats: SampleFormat::ALL.to_vec(),
            layouts: vec![
                ChannelLayout::mono(),
                ChannelLayout::stereo(),
                ChannelLayout::quad(),
                ChannelLayout::surround_5_1(),
                ChannelLayout::surround_7_1(),
            ],
            latency: LatencyRange {
                min: MIN_LATENCY,
                max: MAX_LATENCY,
                current: DEFAULT_LATENCY,
            },
            probe_error: None,
        }
    }
}

impl Backend for DummyBackend {
    fn id(&self) -> BackendId {
        BackendId::Dummy
    }

    fn input_devices(&self) -> Result<Vec<Device>, AudioIoError> {
        Ok(vec![Self::device(
            Direction::Input,
            "dummy-in",
            "Dummy Input Device",
        )])
    }

    fn output_devices(&self) -> Result<Vec<Device>, AudioIoError> {
        Ok(vec![Self::device(
            Direction::Output,
            "dummy-out",
            "Dummy Output Device",
        )])
    }

    fn default_input_index(&self) -> Option<usize> {
        Some(0)
    }

    fn default_output_index(&self) -> Option<usize> {
        Some(0)
    }

    fn open_input(
        &self,
        spec: &StreamSpec,
        mut driver: InputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
        let timing = PeriodTiming::for_spec(spec);
        let mut exchange = DummyInputPeriod::new(spec, timing.frames);
        spawn_stream(Direction::Input, "dummy-audio-in", timing, move || {
            exchange.refill();
            driver.run_period(&mut exchange);
        })
    }

    fn open_output(
        &self,
        spec: &StreamSpec,
        mut driver: OutputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
        let timing = PeriodTiming::for_spec(spec);
        let mut exchange = DummyOutputPeriod::new(spec, timing.frames);
        spawn_stream(Direction::Output, "dummy-audio-out", timing, move || {
            exchange.reset();
            driver.run_period(&mut exchange);
        })
    }
}

struct PeriodTiming {
    frames: usize,
    interval: Duration,
    latency: f64,
}

impl PeriodTiming {
    /// Two hardware periods per software latency window, like a double
    /// buffer.
    fn for_spec(spec: &StreamSpec) -> Self {
        let latency = spec
            .requested_latency
            .unwrap_or(DEFAULT_LATENCY)
            .clamp(MIN_LATENCY, MAX_LATENCY);
        let frames = ((latency * f64::from(spec.sample_rate) / 2.0) as usize).max(1);
        let interval = Duration::from_secs_f64(frames as f64 / f64::from(spec.sample_rate));
        Self {
            frames,
            interval,
            latency,
        }
    }
}

#[derive(Default)]
struct StreamFlags {
    started: AtomicBool,
    stop: AtomicBool,
}

/// Runs `period` once per timer tick while started, until stopped.
fn spawn_stream(
    direction: Direction,
    name: &str,
    timing: PeriodTiming,
    mut period: impl FnMut() + Send + 'static,
) -> Result<Box<dyn StreamHandle>, AudioIoError> {
    let flags = Arc::new(StreamFlags::default());
    let worker_flags = flags.clone();
    let interval = timing.interval;
    let worker = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            if worker_flags.stop.load(Ordering::Acquire) {
                break;
            }
            thread::park_timeout(interval);
            if worker_flags.stop.load(Ordering::Acquire) {
                break;
            }
            if !worker_flags.started.load(Ordering::Acquire) {
                continue;
            }
            period();
        })
        .map_err(|err| AudioIoError::StreamCreationFailed {
            direction,
            reason: format!("failed to spawn timer thread: {err}"),
        })?;
    Ok(Box::new(DummyStreamHandle {
        flags,
        latency: timing.latency,
        worker: Some(worker),
    }))
}

struct DummyStreamHandle {
    flags: Arc<StreamFlags>,
    latency: f64,
    worker: Option<JoinHandle<()>>,
}

impl StreamHandle for DummyStreamHandle {
    fn start(&mut self) -> Result<(), AudioIoError> {
        self.flags.started.store(true, Ordering::Release);
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<(), AudioIoError> {
        self.flags.started.store(!paused, Ordering::Release);
        Ok(())
    }

    fn software_latency(&self) -> f64 {
        self.latency
    }
}

impl Drop for DummyStreamHandle {
    fn drop(&mut self) {
        self.flags.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            let _ = worker.join();
        }
    }
}

/// One capture period of ramp bytes, served as a single interleaved span.
///
/// The ramp counter runs across periods, so the bytes a session captures
/// form one continuous `0, 1, 2, ...` sequence (mod 256) with no seams.
struct DummyInputPeriod {
    scratch: Vec<u8>,
    areas: Vec<ChannelArea>,
    frames: usize,
    bytes_per_frame: usize,
    served: bool,
    next_byte: u8,
}

impl DummyInputPeriod {
    fn new(spec: &StreamSpec, frames: usize) -> Self {
        Self {
            scratch: vec![0; frames * spec.bytes_per_frame()],
            areas: ChannelArea::interleaved(spec.channel_count(), spec.bytes_per_sample()),
            frames,
            bytes_per_frame: spec.bytes_per_frame(),
            served: false,
            next_byte: 0,
        }
    }

    fn refill(&mut self) {
        self.served = false;
        for byte in &mut self.scratch {
            *byte = self.next_byte;
            self.next_byte = self.next_byte.wrapping_add(1);
        }
    }
}

impl InputPeriod for DummyInputPeriod {
    fn frame_bounds(&self) -> (usize, usize) {
        (self.frames, self.frames)
    }

    fn begin_read(&mut self, max_frames: usize) -> ReadSpan<'_> {
        if self.served {
            return ReadSpan::Empty;
        }
        self.served = true;
        let frames = self.frames.min(max_frames);
        ReadSpan::Areas(ReadAreas {
            bytes: &self.scratch[..frames * self.bytes_per_frame],
            areas: &self.areas,
            frames,
        })
    }

    fn end_read(&mut self) {}
}

/// One playback period; whatever the driver renders into it is discarded.
struct DummyOutputPeriod {
    scratch: Vec<u8>,
    areas: Vec<ChannelArea>,
    frames: usize,
    bytes_per_frame: usize,
    served: bool,
}

impl DummyOutputPeriod {
    fn new(spec: &StreamSpec, frames: usize) -> Self {
        Self {
            scratch: vec![0; frames * spec.bytes_per_frame()],
            areas: ChannelArea::interleaved(spec.channel_count(), spec.bytes_per_sample()),
            frames,
            bytes_per_frame: spec.bytes_per_frame(),
            served: false,
        }
    }

    fn reset(&mut self) {
        self.served = false;
    }
}

impl OutputPeriod for DummyOutputPeriod {
    fn frame_bounds(&self) -> (usize, usize) {
        (self.frames, self.frames)
    }

    fn begin_write(&mut self, max_frames: usize) -> WriteSpan<'_> {
        if self.served {
            return WriteSpan::Empty;
        }
        self.served = true;
        let frames = self.frames.min(max_frames);
        WriteSpan::Areas(WriteAreas {
            bytes: &mut self.scratch[..frames * self.bytes_per_frame],
            areas: &self.areas,
            frames,
        })
    }

    fn end_write(&mut self) {}
}
