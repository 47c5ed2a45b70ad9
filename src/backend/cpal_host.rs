//! Backend adapter over cpal hosts.
//!
//! cpal hands each stream callback one interleaved buffer; the adapter
//! wraps it in a single-span period exchange and lets the driver do the
//! copying. Only native-endian formats exist on this path because cpal
//! samples are typed, not raw; foreign-endian and 24-bit formats are
//! reported unsupported during probing.

use std::collections::BTreeSet;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{
    Backend, BackendId, ChannelArea, InputPeriod, OutputPeriod, ReadAreas, ReadSpan, StreamHandle,
    WriteAreas, WriteSpan,
};
use crate::device::{Device, LatencyRange, SampleRateRange};
use crate::error::AudioIoError;
use crate::event::Direction;
use crate::format::{ChannelLayout, SampleFormat};
use crate::stream::{InputDriver, OutputDriver, StreamSpec};

const DEFAULT_SOFTWARE_LATENCY: f64 = 0.1;

/// Connects to a cpal host.
///
/// `None` takes the platform's default host; a specific request fails with
/// [`AudioIoError::BackendUnavailable`] when that host is not compiled in
/// or not running on this platform.
pub(crate) fn connect(requested: Option<BackendId>) -> Result<Arc<dyn Backend>, AudioIoError> {
    match requested {
        None => {
            let backend = CpalBackend {
                id: default_backend_id(),
                host_id: None,
            };
            tracing::info!(backend = %backend.id, "connected to default host");
            Ok(Arc::new(backend))
        }
        Some(id) => {
            let host_id = host_id_for_backend(id)
                .ok_or(AudioIoError::BackendUnavailable { backend: id })?;
            // Confirm the host actually initializes before handing it out.
            cpal::host_from_id(host_id)
                .map_err(|_| AudioIoError::BackendUnavailable { backend: id })?;
            Ok(Arc::new(CpalBackend {
                id,
                host_id: Some(host_id),
            }))
        }
    }
}

#[cfg(target_os = "linux")]
fn host_id_for_backend(id: BackendId) -> Option<cpal::HostId> {
    match id {
        BackendId::Alsa => Some(cpal::HostId::Alsa),
        _ => None,
    }
}

#[cfg(target_os = "macos")]
fn host_id_for_backend(id: BackendId) -> Option<cpal::HostId> {
    match id {
        BackendId::CoreAudio => Some(cpal::HostId::CoreAudio),
        _ => None,
    }
}

#[cfg(target_os = "windows")]
fn host_id_for_backend(id: BackendId) -> Option<cpal::HostId> {
    match id {
        BackendId::Wasapi => Some(cpal::HostId::Wasapi),
        _ => None,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn host_id_for_backend(_id: BackendId) -> Option<cpal::HostId> {
    None
}

#[cfg(target_os = "linux")]
fn default_backend_id() -> BackendId {
    BackendId::Alsa
}

#[cfg(target_os = "macos")]
fn default_backend_id() -> BackendId {
    BackendId::CoreAudio
}

#[cfg(target_os = "windows")]
fn default_backend_id() -> BackendId {
    BackendId::Wasapi
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn default_backend_id() -> BackendId {
    BackendId::Dummy
}

/// A connection to one cpal host.
///
/// Hosts on the supported platforms are stateless handles, so only the id
/// is kept and the host value is rebuilt per operation.
struct CpalBackend {
    id: BackendId,
    host_id: Option<cpal::HostId>,
}

impl CpalBackend {
    fn host(&self) -> Result<cpal::Host, AudioIoError> {
        match self.host_id {
            Some(host_id) => cpal::host_from_id(host_id)
                .map_err(|_| AudioIoError::BackendUnavailable { backend: self.id }),
            None => Ok(cpal::default_host()),
        }
    }
}

impl Backend for CpalBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn input_devices(&self) -> Result<Vec<Device>, AudioIoError> {
        let host = self.host()?;
        let devices = host.input_devices().map_err(AudioIoError::backend)?;
        Ok(devices
            .map(|device| describe_device(&device, Direction::Input))
            .collect())
    }

    fn output_devices(&self) -> Result<Vec<Device>, AudioIoError> {
        let host = self.host()?;
        let devices = host.output_devices().map_err(AudioIoError::backend)?;
        Ok(devices
            .map(|device| describe_device(&device, Direction::Output))
            .collect())
    }

    fn default_input_index(&self) -> Option<usize> {
        let host = self.host().ok()?;
        let default_name = host.default_input_device()?.name().ok()?;
        let devices = host.input_devices().ok()?;
        devices.enumerate().find_map(|(index, device)| {
            let name = device.name().ok()?;
            (name == default_name).then_some(index)
        })
    }

    fn default_output_index(&self) -> Option<usize> {
        let host = self.host().ok()?;
        let default_name = host.default_output_device()?.name().ok()?;
        let devices = host.output_devices().ok()?;
        devices.enumerate().find_map(|(index, device)| {
            let name = device.name().ok()?;
            (name == default_name).then_some(index)
        })
    }

    fn open_input(
        &self,
        spec: &StreamSpec,
        mut driver: InputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
        let host = self.host()?;
        let device = find_device(&host, Direction::Input, &spec.device_id)?;
        let sample_format =
            cpal_sample_format(spec.format).ok_or_else(|| AudioIoError::IncompatibleFormat {
                device: spec.device_name.clone(),
            })?;

        let supported: Vec<_> = device
            .supported_input_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let config = cpal::StreamConfig {
            channels: spec.channel_count(),
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: pick_buffer_size(&supported, spec, sample_format),
        };
        let latency = software_latency_estimate(&config.buffer_size, spec);

        let areas = ChannelArea::interleaved(spec.channel_count(), spec.bytes_per_sample());
        let bytes_per_frame = spec.bytes_per_frame();
        let reporter = driver.error_reporter();
        let stream = device
            .build_input_stream_raw(
                &config,
                sample_format,
                move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                    let mut period = CpalInputPeriod::new(data.bytes(), &areas, bytes_per_frame);
                    driver.run_period(&mut period);
                },
                move |err| reporter.report(err.to_string()),
                None,
            )
            .map_err(|err| AudioIoError::StreamCreationFailed {
                direction: Direction::Input,
                reason: err.to_string(),
            })?;

        Ok(Box::new(CpalStreamHandle {
            stream,
            direction: Direction::Input,
            latency,
        }))
    }

    fn open_output(
        &self,
        spec: &StreamSpec,
        mut driver: OutputDriver,
    ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
        let host = self.host()?;
        let device = find_device(&host, Direction::Output, &spec.device_id)?;
        let sample_format =
            cpal_sample_format(spec.format).ok_or_else(|| AudioIoError::IncompatibleFormat {
                device: spec.device_name.clone(),
            })?;

        let supported: Vec<_> = device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let config = cpal::StreamConfig {
            channels: spec.channel_count(),
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: pick_buffer_size(&supported, spec, sample_format),
        };
        let latency = software_latency_estimate(&config.buffer_size, spec);

        let areas = ChannelArea::interleaved(spec.channel_count(), spec.bytes_per_sample());
        let bytes_per_frame = spec.bytes_per_frame();
        let reporter = driver.error_reporter();
        let stream = device
            .build_output_stream_raw(
                &config,
                sample_format,
                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                    let mut period =
                        CpalOutputPeriod::new(data.bytes_mut(), &areas, bytes_per_frame);
                    driver.run_period(&mut period);
                },
                move |err| reporter.report(err.to_string()),
                None,
            )
            .map_err(|err| AudioIoError::StreamCreationFailed {
                direction: Direction::Output,
                reason: err.to_string(),
            })?;

        Ok(Box::new(CpalStreamHandle {
            stream,
            direction: Direction::Output,
            latency,
        }))
    }
}

fn find_device(
    host: &cpal::Host,
    direction: Direction,
    id: &str,
) -> Result<cpal::Device, AudioIoError> {
    let mut devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(AudioIoError::backend)?;
    devices
        .find(|device| device.name().map(|name| name == id).unwrap_or(false))
        .ok_or_else(|| AudioIoError::DeviceUnavailable {
            direction,
            detail: format!("device {id:?} not found"),
        })
}

fn describe_device(device: &cpal::Device, direction: Direction) -> Device {
    let name = device
        .name()
        .unwrap_or_else(|_| String::from("(unnamed device)"));
    let mut described = Device {
        id: name.clone(),
        name,
        direction,
        is_raw: false,
        sample_rates: Vec::new(),
        current_sample_rate: 0,
        formats: Vec::new(),
        layouts: Vec::new(),
        latency: LatencyRange {
            min: 0.0,
            max: 0.0,
            current: 0.0,
        },
        probe_error: None,
    };

    let configs: Result<Vec<_>, _> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|configs| configs.collect()),
        Direction::Output => device
            .supported_output_configs()
            .map(|configs| configs.collect()),
    };
    let configs = match configs {
        Ok(configs) => configs,
        Err(err) => {
            described.probe_error = Some(err.to_string());
            return described;
        }
    };

    let mut channel_counts = BTreeSet::new();
    for config in &configs {
        let range = SampleRateRange {
            min: config.min_sample_rate().0,
            max: config.max_sample_rate().0,
        };
        if !described.sample_rates.contains(&range) {
            described.sample_rates.push(range);
        }
        if let Some(format) = native_format(config.sample_format()) {
            if !described.formats.contains(&format) {
                described.formats.push(format);
            }
        }
        channel_counts.insert(config.channels());
    }
    described.layouts = channel_counts
        .into_iter()
        .filter(|&channels| channels > 0)
        .map(ChannelLayout::default_for)
        .collect();

    let default_config = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    };
    if let Ok(config) = default_config {
        described.current_sample_rate = config.sample_rate().0;
        if let cpal::SupportedBufferSize::Range { min, max } = *config.buffer_size() {
            let rate = f64::from(config.sample_rate().0).max(1.0);
            described.latency = LatencyRange {
                min: f64::from(min) / rate,
                max: f64::from(max) / rate,
                current: 0.0,
            };
        }
    }

    if described.formats.is_empty() && described.probe_error.is_none() {
        described.probe_error = Some("no usable sample formats advertised".to_string());
    }
    described
}

/// Our format for a cpal sample type. Endianness is the machine's.
fn native_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::I8 => Some(SampleFormat::S8),
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::S16NE),
        cpal::SampleFormat::U16 => Some(SampleFormat::U16NE),
        cpal::SampleFormat::I32 => Some(SampleFormat::S32NE),
        cpal::SampleFormat::U32 => Some(SampleFormat::U32NE),
        cpal::SampleFormat::F32 => Some(SampleFormat::FLOAT32NE),
        cpal::SampleFormat::F64 => Some(SampleFormat::FLOAT64NE),
        _ => None,
    }
}

/// The cpal sample type for one of our formats, when one exists.
fn cpal_sample_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::S8 => Some(cpal::SampleFormat::I8),
        SampleFormat::U8 => Some(cpal::SampleFormat::U8),
        f if f == SampleFormat::S16NE => Some(cpal::SampleFormat::I16),
        f if f == SampleFormat::U16NE => Some(cpal::SampleFormat::U16),
        f if f == SampleFormat::S32NE => Some(cpal::SampleFormat::I32),
        f if f == SampleFormat::U32NE => Some(cpal::SampleFormat::U32),
        f if f == SampleFormat::FLOAT32NE => Some(cpal::SampleFormat::F32),
        f if f == SampleFormat::FLOAT64NE => Some(cpal::SampleFormat::F64),
        _ => None,
    }
}

/// A fixed buffer when the requested latency fits a supported range,
/// otherwise whatever the host prefers.
fn pick_buffer_size(
    configs: &[cpal::SupportedStreamConfigRange],
    spec: &StreamSpec,
    sample_format: cpal::SampleFormat,
) -> cpal::BufferSize {
    let frames = match spec.requested_latency {
        Some(latency) => (latency * f64::from(spec.sample_rate)) as u32,
        None => return cpal::BufferSize::Default,
    };
    let fits = configs.iter().any(|config| {
        config.channels() == spec.channel_count()
            && config.sample_format() == sample_format
            && config.min_sample_rate().0 <= spec.sample_rate
            && spec.sample_rate <= config.max_sample_rate().0
            && matches!(
                *config.buffer_size(),
                cpal::SupportedBufferSize::Range { min, max } if (min..=max).contains(&frames)
            )
    });
    if fits {
        cpal::BufferSize::Fixed(frames)
    } else {
        tracing::debug!(
            frames,
            "requested latency outside supported buffer range, using host default"
        );
        cpal::BufferSize::Default
    }
}

fn software_latency_estimate(buffer_size: &cpal::BufferSize, spec: &StreamSpec) -> f64 {
    match buffer_size {
        cpal::BufferSize::Fixed(frames) => f64::from(*frames) / f64::from(spec.sample_rate),
        cpal::BufferSize::Default => spec
            .requested_latency
            .unwrap_or(DEFAULT_SOFTWARE_LATENCY),
    }
}

struct CpalStreamHandle {
    stream: cpal::Stream,
    direction: Direction,
    latency: f64,
}

impl StreamHandle for CpalStreamHandle {
    fn start(&mut self) -> Result<(), AudioIoError> {
        self.stream
            .play()
            .map_err(|err| AudioIoError::StreamStartFailed {
                direction: self.direction,
                reason: err.to_string(),
            })
    }

    fn pause(&mut self, paused: bool) -> Result<(), AudioIoError> {
        if paused {
            self.stream.pause().map_err(AudioIoError::backend)
        } else {
            self.stream
                .play()
                .map_err(|err| AudioIoError::StreamStartFailed {
                    direction: self.direction,
                    reason: err.to_string(),
                })
        }
    }

    fn software_latency(&self) -> f64 {
        self.latency
    }
}

/// One cpal input buffer as a single-span period.
struct CpalInputPeriod<'a> {
    bytes: &'a [u8],
    areas: &'a [ChannelArea],
    frames: usize,
    served: bool,
}

impl<'a> CpalInputPeriod<'a> {
    fn new(bytes: &'a [u8], areas: &'a [ChannelArea], bytes_per_frame: usize) -> Self {
        Self {
            bytes,
            areas,
            frames: bytes.len() / bytes_per_frame,
            served: false,
        }
    }
}

impl InputPeriod for CpalInputPeriod<'_> {
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
            bytes: self.bytes,
            areas: self.areas,
            frames,
        })
    }

    fn end_read(&mut self) {}
}

/// One cpal output buffer as a single-span period.
struct CpalOutputPeriod<'a> {
    bytes: &'a mut [u8],
    areas: &'a [ChannelArea],
    frames: usize,
    served: bool,
}

impl<'a> CpalOutputPeriod<'a> {
    fn new(bytes: &'a mut [u8], areas: &'a [ChannelArea], bytes_per_frame: usize) -> Self {
        let frames = bytes.len() / bytes_per_frame;
        Self {
            bytes,
            areas,
            frames,
            served: false,
        }
    }
}

impl OutputPeriod for CpalOutputPeriod<'_> {
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
            bytes: &mut self.bytes[..],
            areas: self.areas,
            frames,
        })
    }

    fn end_write(&mut self) {}
}
