//! WAV playback example.
//!
//! Plays a 16-bit WAV file to the default output device.
//!
//! Run with: cargo run --example play <file.wav>

use std::time::Duration;

use duplex_audio::format::SampleFormat;
use duplex_audio::AudioSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::args().nth(1).ok_or("usage: play <file.wav>")?;

    let mut reader = hound::WavReader::open(&path)?;
    let wav_spec = reader.spec();
    if wav_spec.bits_per_sample != 16 || wav_spec.sample_format != hound::SampleFormat::Int {
        return Err(format!("{path}: only 16-bit integer WAV files are supported").into());
    }
    let mut data = Vec::new();
    for sample in reader.samples::<i16>() {
        data.extend_from_slice(&sample?.to_ne_bytes());
    }
    let total_bytes = data.len();

    let mut session = AudioSession::builder()
        .on_event(|event| eprintln!("stream event: {event:?}"))
        .connect()?;

    let mut at = 0usize;
    let spec = session
        .output_stream()
        .sample_rate(wav_spec.sample_rate)
        .format(SampleFormat::S16NE)
        .channels(wav_spec.channels)
        .write_callback(move |bytes, _frames| {
            let n = (data.len() - at).min(bytes.len());
            bytes[..n].copy_from_slice(&data[at..at + n]);
            at += n;
            n
        })
        .start()?;
    println!(
        "Playing {path} ({}Hz, {}) on '{}'...",
        spec.sample_rate, spec.layout, spec.device_name
    );

    // The bridge queues audio well ahead of the device, so wait until the
    // driver has consumed every file frame, not until the callback ran dry.
    let total_frames = (total_bytes / spec.bytes_per_frame()) as u64;
    while session.stats().frames_rendered < total_frames {
        std::thread::sleep(Duration::from_millis(50));
    }
    std::thread::sleep(Duration::from_millis(100));

    let stats = session.stats();
    session.close();
    println!(
        "Rendered {} frames, {} underflows",
        stats.frames_rendered, stats.underflows
    );
    Ok(())
}
