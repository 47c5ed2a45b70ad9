//! Device descriptions produced by enumeration.
//!
//! A [`Device`] is a snapshot of one hardware endpoint's identity and
//! capabilities, captured while the catalog probed the backend. Values are
//! plain data: holding one does not hold the hardware. Opening a stream
//! re-resolves the device by id, so a stale snapshot fails cleanly instead
//! of addressing the wrong endpoint.

use crate::event::Direction;
use crate::format::{ChannelLayout, SampleFormat};

/// An inclusive range of supported sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateRange {
    /// Lowest supported rate in Hz.
    pub min: u32,
    /// Highest supported rate in Hz.
    pub max: u32,
}

impl SampleRateRange {
    /// A range covering exactly one rate.
    #[must_use]
    pub fn exact(rate: u32) -> Self {
        Self {
            min: rate,
            max: rate,
        }
    }

    /// Whether `rate` falls inside this range.
    #[must_use]
    pub fn contains(&self, rate: u32) -> bool {
        self.min <= rate && rate <= self.max
    }
}

/// Software latency bounds in seconds.
///
/// `current` is what the device is configured for right now; a stream may
/// request anything inside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyRange {
    /// Minimum supported software latency.
    pub min: f64,
    /// Maximum supported software latency.
    pub max: f64,
    /// Currently configured software latency.
    pub current: f64,
}

/// One hardware endpoint as seen during an enumeration snapshot.
///
/// Indices into the catalog's lists are only stable within one snapshot;
/// the `id` is the durable handle and is what streams open by.
#[derive(Debug, Clone)]
pub struct Device {
    /// Backend-unique identifier, stable across snapshots while the device
    /// stays connected.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Whether this endpoint captures or plays.
    pub direction: Direction,
    /// Raw mode: exclusive hardware access bypassing the OS mixer.
    pub is_raw: bool,
    /// Supported sample-rate ranges, as advertised.
    pub sample_rates: Vec<SampleRateRange>,
    /// The device's current or preferred rate, 0 if unknown.
    pub current_sample_rate: u32,
    /// Supported sample formats, in the backend's advertised order.
    pub formats: Vec<SampleFormat>,
    /// Supported channel layouts. [`Device::sort_channel_layouts`] orders
    /// these best-first before stream creation.
    pub layouts: Vec<ChannelLayout>,
    /// Software latency bounds in seconds.
    pub latency: LatencyRange,
    /// Set when capability probing failed; such a device cannot be opened.
    pub probe_error: Option<String>,
}

impl Device {
    /// Whether the device advertises support for `rate`.
    #[must_use]
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.sample_rates.iter().any(|r| r.contains(rate))
    }

    /// Whether the device advertises support for `format`.
    #[must_use]
    pub fn supports_format(&self, format: SampleFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Highest advertised sample rate, 0 if the device advertises none.
    #[must_use]
    pub fn max_sample_rate(&self) -> u32 {
        self.sample_rates.iter().map(|r| r.max).max().unwrap_or(0)
    }

    /// Orders advertised layouts by descending channel count, in place.
    ///
    /// Done before stream creation so the richest layout is matched first.
    /// The sort is stable: equal channel counts keep their advertised order.
    pub fn sort_channel_layouts(&mut self) {
        self.layouts
            .sort_by(|a, b| b.channel_count().cmp(&a.channel_count()));
    }

    /// First advertised layout with exactly `channels` channels.
    #[must_use]
    pub fn layout_for_channels(&self, channels: u16) -> Option<&ChannelLayout> {
        self.layouts
            .iter()
            .find(|l| l.channel_count() == channels)
    }
}

/// A plain two-rate, two-format, two-layout device for unit tests.
#[cfg(test)]
pub(crate) fn test_device(direction: Direction) -> Device {
    Device {
        id: "test".to_string(),
        name: "Test Device".to_string(),
        direction,
        is_raw: false,
        sample_rates: vec![
            SampleRateRange::exact(44_100),
            SampleRateRange::exact(48_000),
        ],
        current_sample_rate: 44_100,
        formats: vec![SampleFormat::S16Le, SampleFormat::Float32Le],
        layouts: vec![ChannelLayout::mono(), ChannelLayout::stereo()],
        latency: LatencyRange {
            min: 0.01,
            max: 2.0,
            current: 0.1,
        },
        probe_error: None,
    }
}
