//! Device enumeration snapshots and stream parameter negotiation.
//!
//! The catalog asks the backend for its device lists once and serves every
//! lookup from that snapshot until [`DeviceCatalog::refresh`] is called, so
//! indices and defaults stay coherent with each other even while devices
//! come and go underneath. Negotiation walks fixed priority tables to pick
//! a rate and format the device actually advertises.

use std::sync::Arc;

use crate::backend::Backend;
use crate::device::Device;
use crate::error::AudioIoError;
use crate::event::Direction;
use crate::format::{ChannelLayout, SampleFormat};

/// Rates tried in order when the caller does not request one.
///
/// The `0` entry stands for the device's own current rate and is skipped
/// when the device does not report one.
const SAMPLE_RATE_PRIORITY: [u32; 5] = [48_000, 44_100, 96_000, 24_000, 0];

/// A consistent snapshot of the backend's devices.
///
/// All accessors read from the snapshot taken at construction or by the
/// last [`refresh`](Self::refresh); indices returned by one call remain
/// valid against the lists until the next refresh.
pub struct DeviceCatalog {
    backend: Arc<dyn Backend>,
    inputs: Vec<Device>,
    outputs: Vec<Device>,
    default_input: Option<usize>,
    default_output: Option<usize>,
}

impl DeviceCatalog {
    /// Takes the initial snapshot.
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Result<Self, AudioIoError> {
        let mut catalog = Self {
            backend,
            inputs: Vec::new(),
            outputs: Vec::new(),
            default_input: None,
            default_output: None,
        };
        catalog.refresh()?;
        Ok(catalog)
    }

    /// Replaces the snapshot with a fresh enumeration.
    ///
    /// Device ids held by the caller stay meaningful; indices from before
    /// the refresh do not. Each device's layouts are ordered best-first.
    pub fn refresh(&mut self) -> Result<(), AudioIoError> {
        let mut inputs = self.backend.input_devices()?;
        let mut outputs = self.backend.output_devices()?;
        for device in inputs.iter_mut().chain(outputs.iter_mut()) {
            device.sort_channel_layouts();
        }
        self.default_input = self
            .backend
            .default_input_index()
            .filter(|&i| i < inputs.len());
        self.default_output = self
            .backend
            .default_output_index()
            .filter(|&i| i < outputs.len());
        tracing::debug!(
            backend = %self.backend.id(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "device catalog refreshed"
        );
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(())
    }

    /// All capture devices in the current snapshot.
    #[must_use]
    pub fn input_devices(&self) -> &[Device] {
        &self.inputs
    }

    /// All playback devices in the current snapshot.
    #[must_use]
    pub fn output_devices(&self) -> &[Device] {
        &self.outputs
    }

    /// Index of the default capture device, if the backend reports one.
    #[must_use]
    pub fn default_input_index(&self) -> Option<usize> {
        self.default_input
    }

    /// Index of the default playback device, if the backend reports one.
    #[must_use]
    pub fn default_output_index(&self) -> Option<usize> {
        self.default_output
    }

    /// The default capture device.
    pub fn default_input_device(&self) -> Result<&Device, AudioIoError> {
        self.default_input
            .and_then(|i| self.inputs.get(i))
            .ok_or_else(|| AudioIoError::no_default_device(Direction::Input))
    }

    /// The default playback device.
    pub fn default_output_device(&self) -> Result<&Device, AudioIoError> {
        self.default_output
            .and_then(|i| self.outputs.get(i))
            .ok_or_else(|| AudioIoError::no_default_device(Direction::Output))
    }

    /// The capture device at `index` in the current snapshot.
    pub fn input_device(&self, index: usize) -> Result<&Device, AudioIoError> {
        Self::device_at(&self.inputs, index, Direction::Input)
    }

    /// The playback device at `index` in the current snapshot.
    pub fn output_device(&self, index: usize) -> Result<&Device, AudioIoError> {
        Self::device_at(&self.outputs, index, Direction::Output)
    }

    /// The capture device with the given id, if present in the snapshot.
    #[must_use]
    pub fn input_device_by_id(&self, id: &str) -> Option<&Device> {
        self.inputs.iter().find(|d| d.id == id)
    }

    /// The playback device with the given id, if present in the snapshot.
    #[must_use]
    pub fn output_device_by_id(&self, id: &str) -> Option<&Device> {
        self.outputs.iter().find(|d| d.id == id)
    }

    fn device_at(
        devices: &[Device],
        index: usize,
        direction: Direction,
    ) -> Result<&Device, AudioIoError> {
        devices
            .get(index)
            .ok_or_else(|| AudioIoError::DeviceUnavailable {
                direction,
                detail: format!(
                    "index {index} out of range, {} devices enumerated",
                    devices.len()
                ),
            })
    }
}

impl std::fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("backend", &self.backend.id())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("default_input", &self.default_input)
            .field("default_output", &self.default_output)
            .finish()
    }
}

/// Picks the sample rate for a stream on `device`.
///
/// An explicitly requested rate must be advertised by the device or the
/// resolution fails with [`AudioIoError::InvalidSampleRate`]. Without a
/// request the priority table decides, falling back to the device's highest
/// advertised rate.
pub(crate) fn resolve_sample_rate(
    device: &Device,
    requested: Option<u32>,
) -> Result<u32, AudioIoError> {
    if let Some(rate) = requested {
        return if device.supports_sample_rate(rate) {
            Ok(rate)
        } else {
            Err(AudioIoError::InvalidSampleRate {
                rate,
                device: device.name.clone(),
            })
        };
    }

    for &rate in &SAMPLE_RATE_PRIORITY {
        if rate == 0 {
            if device.current_sample_rate != 0 {
                return Ok(device.current_sample_rate);
            }
        } else if device.supports_sample_rate(rate) {
            return Ok(rate);
        }
    }

    let fallback = device.max_sample_rate();
    if fallback == 0 {
        return Err(AudioIoError::InvalidSampleRate {
            rate: 0,
            device: device.name.clone(),
        });
    }
    tracing::debug!(
        device = %device.name,
        rate = fallback,
        "no preferred sample rate supported, using device maximum"
    );
    Ok(fallback)
}

/// Picks the sample format for a stream on `device`.
///
/// An explicitly requested format must be advertised or the resolution
/// fails with [`AudioIoError::IncompatibleFormat`]. Without a request the
/// first match in [`SampleFormat::NEGOTIATION_PRIORITY`] wins.
pub(crate) fn resolve_format(
    device: &Device,
    requested: Option<SampleFormat>,
) -> Result<SampleFormat, AudioIoError> {
    if let Some(format) = requested {
        return if device.supports_format(format) {
            Ok(format)
        } else {
            Err(AudioIoError::IncompatibleFormat {
                device: device.name.clone(),
            })
        };
    }

    SampleFormat::NEGOTIATION_PRIORITY
        .iter()
        .copied()
        .find(|&format| device.supports_format(format))
        .ok_or_else(|| AudioIoError::IncompatibleFormat {
            device: device.name.clone(),
        })
}

/// Picks the channel layout for a stream with `channels` channels.
///
/// Prefers a layout the device advertises; otherwise the standard layout
/// for that channel count is assumed and the backend decides at open time
/// whether it can serve it.
pub(crate) fn resolve_layout(device: &Device, channels: u16) -> ChannelLayout {
    device
        .layout_for_channels(channels)
        .cloned()
        .unwrap_or_else(|| ChannelLayout::default_for(channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendId, StreamHandle};
    use crate::device::{test_device, SampleRateRange};
    use crate::stream::{InputDriver, OutputDriver, StreamSpec};

    struct FakeBackend {
        inputs: Vec<Device>,
        outputs: Vec<Device>,
        default_input: Option<usize>,
        default_output: Option<usize>,
    }

    impl Backend for FakeBackend {
        fn id(&self) -> BackendId {
            BackendId::Dummy
        }

        fn input_devices(&self) -> Result<Vec<Device>, AudioIoError> {
            Ok(self.inputs.clone())
        }

        fn output_devices(&self) -> Result<Vec<Device>, AudioIoError> {
            Ok(self.outputs.clone())
        }

        fn default_input_index(&self) -> Option<usize> {
            self.default_input
        }

        fn default_output_index(&self) -> Option<usize> {
            self.default_output
        }

        fn open_input(
            &self,
            _spec: &StreamSpec,
            _driver: InputDriver,
        ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
            Err(AudioIoError::backend("fake backend cannot open streams"))
        }

        fn open_output(
            &self,
            _spec: &StreamSpec,
            _driver: OutputDriver,
        ) -> Result<Box<dyn StreamHandle>, AudioIoError> {
            Err(AudioIoError::backend("fake backend cannot open streams"))
        }
    }

    fn catalog_with(inputs: Vec<Device>, outputs: Vec<Device>) -> DeviceCatalog {
        let backend = Arc::new(FakeBackend {
            default_input: if inputs.is_empty() { None } else { Some(0) },
            default_output: if outputs.is_empty() { None } else { Some(0) },
            inputs,
            outputs,
        });
        DeviceCatalog::new(backend).unwrap()
    }

    #[test]
    fn test_snapshot_and_defaults() {
        let catalog = catalog_with(
            vec![test_device(Direction::Input)],
            vec![test_device(Direction::Output)],
        );
        assert_eq!(catalog.input_devices().len(), 1);
        assert_eq!(catalog.output_devices().len(), 1);
        assert_eq!(catalog.default_input_index(), Some(0));
        assert_eq!(catalog.default_output_device().unwrap().name, "Test Device");
    }

    #[test]
    fn test_missing_default_is_device_unavailable() {
        let catalog = catalog_with(vec![test_device(Direction::Input)], Vec::new());
        let err = catalog.default_output_device().unwrap_err();
        assert!(matches!(
            err,
            AudioIoError::DeviceUnavailable {
                direction: Direction::Output,
                ..
            }
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let catalog = catalog_with(vec![test_device(Direction::Input)], Vec::new());
        assert!(catalog.input_device(0).is_ok());
        let err = catalog.input_device(3).unwrap_err();
        assert!(matches!(err, AudioIoError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_lookup_by_id() {
        let catalog = catalog_with(vec![test_device(Direction::Input)], Vec::new());
        assert!(catalog.input_device_by_id("test").is_some());
        assert!(catalog.input_device_by_id("absent").is_none());
        assert!(catalog.output_device_by_id("test").is_none());
    }

    #[test]
    fn test_refresh_sorts_layouts_best_first() {
        // test_device advertises mono before stereo; the snapshot must have
        // stereo first.
        let catalog = catalog_with(vec![test_device(Direction::Input)], Vec::new());
        let layouts = &catalog.input_devices()[0].layouts;
        assert_eq!(layouts[0].channel_count(), 2);
        assert_eq!(layouts[1].channel_count(), 1);
    }

    #[test]
    fn test_rate_priority_prefers_48k() {
        // Device supports both 44.1 and 48 kHz; 48 kHz wins.
        let device = test_device(Direction::Input);
        assert_eq!(resolve_sample_rate(&device, None).unwrap(), 48_000);
        // And resolution is stable across calls.
        assert_eq!(resolve_sample_rate(&device, None).unwrap(), 48_000);
    }

    #[test]
    fn test_rate_explicit_request_honored_or_rejected() {
        let device = test_device(Direction::Input);
        assert_eq!(resolve_sample_rate(&device, Some(44_100)).unwrap(), 44_100);

        let err = resolve_sample_rate(&device, Some(10_000_000)).unwrap_err();
        match err {
            AudioIoError::InvalidSampleRate { rate, device } => {
                assert_eq!(rate, 10_000_000);
                assert_eq!(device, "Test Device");
            }
            other => panic!("expected InvalidSampleRate, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_falls_back_to_current_then_max() {
        let mut device = test_device(Direction::Input);
        device.sample_rates = vec![SampleRateRange::exact(22_050)];
        device.current_sample_rate = 22_050;
        // None of the preferred rates match; the device's current rate wins.
        assert_eq!(resolve_sample_rate(&device, None).unwrap(), 22_050);

        device.sample_rates = vec![
            SampleRateRange::exact(11_025),
            SampleRateRange::exact(22_050),
        ];
        device.current_sample_rate = 0;
        // No current rate either; highest advertised rate wins.
        assert_eq!(resolve_sample_rate(&device, None).unwrap(), 22_050);
    }

    #[test]
    fn test_rate_unadvertised_device_rejected() {
        let mut device = test_device(Direction::Input);
        device.sample_rates = Vec::new();
        device.current_sample_rate = 0;
        assert!(matches!(
            resolve_sample_rate(&device, None),
            Err(AudioIoError::InvalidSampleRate { rate: 0, .. })
        ));
    }

    #[test]
    fn test_format_priority_prefers_float32() {
        let device = test_device(Direction::Input);
        assert_eq!(
            resolve_format(&device, None).unwrap(),
            SampleFormat::Float32Le
        );
    }

    #[test]
    fn test_format_explicit_request_honored_or_rejected() {
        let device = test_device(Direction::Input);
        assert_eq!(
            resolve_format(&device, Some(SampleFormat::S16Le)).unwrap(),
            SampleFormat::S16Le
        );
        assert!(matches!(
            resolve_format(&device, Some(SampleFormat::U16Be)),
            Err(AudioIoError::IncompatibleFormat { .. })
        ));
    }

    #[test]
    fn test_format_walks_whole_priority_table() {
        let mut device = test_device(Direction::Input);
        device.formats = vec![SampleFormat::U8];
        assert_eq!(resolve_format(&device, None).unwrap(), SampleFormat::U8);

        device.formats = Vec::new();
        assert!(matches!(
            resolve_format(&device, None),
            Err(AudioIoError::IncompatibleFormat { .. })
        ));
    }

    #[test]
    fn test_layout_resolution() {
        let device = test_device(Direction::Output);
        assert_eq!(resolve_layout(&device, 2).name(), "Stereo");
        // Device does not advertise 6 channels; the standard layout is
        // assumed.
        assert_eq!(resolve_layout(&device, 6).channel_count(), 6);
    }
}
