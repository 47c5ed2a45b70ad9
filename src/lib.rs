//! # duplex-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio capture and playback with negotiated device parameters.
//!
//! `duplex-audio` connects to a platform audio backend, negotiates a sample
//! rate, sample format and channel layout the device actually supports, and
//! then moves audio between the hardware callback and your code through a
//! lock-free ring buffer. Your callback runs on its own thread at its own
//! pace; the real-time thread never waits for it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use duplex_audio::AudioSession;
//!
//! # fn main() -> Result<(), duplex_audio::AudioIoError> {
//! let mut session = AudioSession::builder()
//!     .on_event(|event| tracing::warn!(?event, "stream event"))
//!     .connect()?;
//!
//! let spec = session
//!     .input_stream()
//!     .sample_rate(16_000)
//!     .channels(1)
//!     .read_callback(|bytes, frames| {
//!         // Hand off to a recognizer, a file writer, a channel...
//!         println!("captured {frames} frames ({} bytes)", bytes.len());
//!     })
//!     .start()?;
//! println!("capturing at {}Hz, {}", spec.sample_rate, spec.format);
//!
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! session.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Hardware thread**: the backend's real-time callback exchanges whole
//!   periods between the device and a ring buffer, and never blocks
//! - **Ring buffer**: a lock-free SPSC queue per stream direction absorbs
//!   scheduling jitter between the two sides
//! - **Bridge thread**: drains or fills the ring and runs your callback,
//!   in fixed-size blocks when you configure one
//!
//! When the ring fills (capture) or runs dry (playback) the affected
//! period is dropped or played as silence, the event is counted, and the
//! session's event callback is told; the hardware thread is never made
//! to wait.

// unsafe_code lint is configured in Cargo.toml as "deny" to allow the ring
// buffer module to override it for its region construction
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample and time units
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect stay confined to tests
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod bridge;
mod builder;
mod catalog;
mod config;
mod device;
mod error;
mod event;
pub mod format;
mod ring;
mod session;
mod stream;

pub use backend::BackendId;
pub use bridge::{ReadCallback, WriteCallback};
pub use builder::{DeviceSelection, InputStreamBuilder, OutputStreamBuilder, SessionBuilder};
pub use catalog::DeviceCatalog;
pub use config::SessionConfig;
pub use device::{Device, LatencyRange, SampleRateRange};
pub use error::AudioIoError;
pub use event::{event_callback, Direction, EventCallback, StreamEvent};
pub use ring::{RingBuffer, RingReader, RingWriter};
pub use session::{AudioSession, SessionStats};
pub use stream::{InputDriver, OutputDriver, StreamErrorReporter, StreamSpec};

/// The version of this crate, as compiled.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
