//! Sample formats and channel layouts.
//!
//! A [`SampleFormat`] describes one sample on the wire: byte width,
//! integer/float kind, signedness, and endianness. The transport layer never
//! interprets sample values - formats exist for negotiation and byte
//! arithmetic only.

use std::fmt;

/// Byte order of a multi-byte sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// One interleaved sample's wire format.
///
/// The set mirrors what hardware backends commonly advertise. 24-bit formats
/// occupy a 4-byte container, which is how every mainstream driver delivers
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 8-bit integer.
    S8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer, little endian.
    S16Le,
    /// Signed 16-bit integer, big endian.
    S16Be,
    /// Unsigned 16-bit integer, little endian.
    U16Le,
    /// Unsigned 16-bit integer, big endian.
    U16Be,
    /// Signed 24-bit integer in a 4-byte container, little endian.
    S24Le,
    /// Signed 24-bit integer in a 4-byte container, big endian.
    S24Be,
    /// Unsigned 24-bit integer in a 4-byte container, little endian.
    U24Le,
    /// Unsigned 24-bit integer in a 4-byte container, big endian.
    U24Be,
    /// Signed 32-bit integer, little endian.
    S32Le,
    /// Signed 32-bit integer, big endian.
    S32Be,
    /// Unsigned 32-bit integer, little endian.
    U32Le,
    /// Unsigned 32-bit integer, big endian.
    U32Be,
    /// 32-bit IEEE float, little endian.
    Float32Le,
    /// 32-bit IEEE float, big endian.
    Float32Be,
    /// 64-bit IEEE float, little endian.
    Float64Le,
    /// 64-bit IEEE float, big endian.
    Float64Be,
}

impl SampleFormat {
    /// Every representable format, in declaration order.
    pub const ALL: [SampleFormat; 18] = [
        SampleFormat::S8,
        SampleFormat::U8,
        SampleFormat::S16Le,
        SampleFormat::S16Be,
        SampleFormat::U16Le,
        SampleFormat::U16Be,
        SampleFormat::S24Le,
        SampleFormat::S24Be,
        SampleFormat::U24Le,
        SampleFormat::U24Be,
        SampleFormat::S32Le,
        SampleFormat::S32Be,
        SampleFormat::U32Le,
        SampleFormat::U32Be,
        SampleFormat::Float32Le,
        SampleFormat::Float32Be,
        SampleFormat::Float64Le,
        SampleFormat::Float64Be,
    ];

    /// Negotiation priority when the caller doesn't request a format.
    ///
    /// Ordered by precision and commonality; the resolver walks this list
    /// and picks the first entry the device supports.
    pub const NEGOTIATION_PRIORITY: [SampleFormat; 18] = [
        SampleFormat::Float32Le,
        SampleFormat::Float32Be,
        SampleFormat::S32Le,
        SampleFormat::S32Be,
        SampleFormat::S24Le,
        SampleFormat::S24Be,
        SampleFormat::S16Le,
        SampleFormat::S16Be,
        SampleFormat::Float64Le,
        SampleFormat::Float64Be,
        SampleFormat::U32Le,
        SampleFormat::U32Be,
        SampleFormat::U24Le,
        SampleFormat::U24Be,
        SampleFormat::U16Le,
        SampleFormat::U16Be,
        SampleFormat::S8,
        SampleFormat::U8,
    ];

    /// Signed 16-bit integer in this machine's byte order.
    pub const S16NE: SampleFormat = ne(SampleFormat::S16Le, SampleFormat::S16Be);
    /// Unsigned 16-bit integer in this machine's byte order.
    pub const U16NE: SampleFormat = ne(SampleFormat::U16Le, SampleFormat::U16Be);
    /// Signed 24-bit integer in this machine's byte order.
    pub const S24NE: SampleFormat = ne(SampleFormat::S24Le, SampleFormat::S24Be);
    /// Unsigned 24-bit integer in this machine's byte order.
    pub const U24NE: SampleFormat = ne(SampleFormat::U24Le, SampleFormat::U24Be);
    /// Signed 32-bit integer in this machine's byte order.
    pub const S32NE: SampleFormat = ne(SampleFormat::S32Le, SampleFormat::S32Be);
    /// Unsigned 32-bit integer in this machine's byte order.
    pub const U32NE: SampleFormat = ne(SampleFormat::U32Le, SampleFormat::U32Be);
    /// 32-bit float in this machine's byte order.
    pub const FLOAT32NE: SampleFormat = ne(SampleFormat::Float32Le, SampleFormat::Float32Be);
    /// 64-bit float in this machine's byte order.
    pub const FLOAT64NE: SampleFormat = ne(SampleFormat::Float64Le, SampleFormat::Float64Be);

    /// Width of one sample in bytes, container included.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be | SampleFormat::U16Le | SampleFormat::U16Be => 2,
            SampleFormat::S24Le
            | SampleFormat::S24Be
            | SampleFormat::U24Le
            | SampleFormat::U24Be
            | SampleFormat::S32Le
            | SampleFormat::S32Be
            | SampleFormat::U32Le
            | SampleFormat::U32Be
            | SampleFormat::Float32Le
            | SampleFormat::Float32Be => 4,
            SampleFormat::Float64Le | SampleFormat::Float64Be => 8,
        }
    }

    /// Width of one frame (one sample per channel) in bytes.
    #[must_use]
    pub fn bytes_per_frame(self, channels: u16) -> usize {
        self.bytes_per_sample() * channels as usize
    }

    /// Bytes produced per second at the given channel count and sample rate.
    #[must_use]
    pub fn bytes_per_second(self, channels: u16, sample_rate: u32) -> usize {
        self.bytes_per_frame(channels) * sample_rate as usize
    }

    /// Whether samples are IEEE floats.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            SampleFormat::Float32Le
                | SampleFormat::Float32Be
                | SampleFormat::Float64Le
                | SampleFormat::Float64Be
        )
    }

    /// Whether integer samples are signed. Floats report `true`.
    #[must_use]
    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            SampleFormat::U8
                | SampleFormat::U16Le
                | SampleFormat::U16Be
                | SampleFormat::U24Le
                | SampleFormat::U24Be
                | SampleFormat::U32Le
                | SampleFormat::U32Be
        )
    }

    /// Byte order, or `None` for single-byte formats.
    #[must_use]
    pub fn endianness(self) -> Option<Endianness> {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => None,
            SampleFormat::S16Le
            | SampleFormat::U16Le
            | SampleFormat::S24Le
            | SampleFormat::U24Le
            | SampleFormat::S32Le
            | SampleFormat::U32Le
            | SampleFormat::Float32Le
            | SampleFormat::Float64Le => Some(Endianness::Little),
            _ => Some(Endianness::Big),
        }
    }
}

const fn ne(little: SampleFormat, big: SampleFormat) -> SampleFormat {
    if cfg!(target_endian = "little") {
        little
    } else {
        big
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::S8 => "signed 8-bit",
            SampleFormat::U8 => "unsigned 8-bit",
            SampleFormat::S16Le => "signed 16-bit LE",
            SampleFormat::S16Be => "signed 16-bit BE",
            SampleFormat::U16Le => "unsigned 16-bit LE",
            SampleFormat::U16Be => "unsigned 16-bit BE",
            SampleFormat::S24Le => "signed 24-bit LE",
            SampleFormat::S24Be => "signed 24-bit BE",
            SampleFormat::U24Le => "unsigned 24-bit LE",
            SampleFormat::U24Be => "unsigned 24-bit BE",
            SampleFormat::S32Le => "signed 32-bit LE",
            SampleFormat::S32Be => "signed 32-bit BE",
            SampleFormat::U32Le => "unsigned 32-bit LE",
            SampleFormat::U32Be => "unsigned 32-bit BE",
            SampleFormat::Float32Le => "float 32-bit LE",
            SampleFormat::Float32Be => "float 32-bit BE",
            SampleFormat::Float64Le => "float 64-bit LE",
            SampleFormat::Float64Be => "float 64-bit BE",
        };
        f.write_str(name)
    }
}

/// A named position within a channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    /// Front left speaker / left microphone.
    FrontLeft,
    /// Front right speaker / right microphone.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Low-frequency effects.
    Lfe,
    /// Back left.
    BackLeft,
    /// Back right.
    BackRight,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
    /// Unnamed auxiliary channel.
    Aux(u16),
}

/// An ordered assignment of channel positions to interleave indices.
///
/// Sample `i` of a frame belongs to `positions()[i]`. The transport copies
/// channels in this order; it never remaps them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    name: String,
    positions: Vec<ChannelPosition>,
}

impl ChannelLayout {
    /// Builds a layout from a name and explicit positions.
    #[must_use]
    pub fn new(name: impl Into<String>, positions: Vec<ChannelPosition>) -> Self {
        Self {
            name: name.into(),
            positions,
        }
    }

    /// Single channel.
    #[must_use]
    pub fn mono() -> Self {
        Self::new("Mono", vec![ChannelPosition::FrontCenter])
    }

    /// Two channels, left then right.
    #[must_use]
    pub fn stereo() -> Self {
        Self::new(
            "Stereo",
            vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        )
    }

    /// Four corner channels.
    #[must_use]
    pub fn quad() -> Self {
        Self::new(
            "Quad",
            vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::BackLeft,
                ChannelPosition::BackRight,
            ],
        )
    }

    /// 5.1 surround with back speakers.
    #[must_use]
    pub fn surround_5_1() -> Self {
        Self::new(
            "5.1",
            vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
                ChannelPosition::Lfe,
                ChannelPosition::BackLeft,
                ChannelPosition::BackRight,
            ],
        )
    }

    /// 7.1 surround.
    #[must_use]
    pub fn surround_7_1() -> Self {
        Self::new(
            "7.1",
            vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
                ChannelPosition::Lfe,
                ChannelPosition::BackLeft,
                ChannelPosition::BackRight,
                ChannelPosition::SideLeft,
                ChannelPosition::SideRight,
            ],
        )
    }

    /// The conventional layout for a channel count, or an aux-numbered
    /// custom layout for counts with no convention.
    #[must_use]
    pub fn default_for(channel_count: u16) -> Self {
        match channel_count {
            1 => Self::mono(),
            2 => Self::stereo(),
            4 => Self::quad(),
            6 => Self::surround_5_1(),
            8 => Self::surround_7_1(),
            n => Self::new(
                format!("{n} channels"),
                (0..n).map(ChannelPosition::Aux).collect(),
            ),
        }
    }

    /// Display name of the layout.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Positions in interleave order.
    #[must_use]
    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    /// Number of channels.
    #[must_use]
    pub fn channel_count(&self) -> u16 {
        self.positions.len() as u16
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ch)", self.name, self.channel_count())
    }
}
