//! Sine wave playback example.
//!
//! Plays a tone on the default output device for three seconds.
//!
//! Run with: cargo run --example sine [frequency]

use std::time::Duration;

use duplex_audio::format::SampleFormat;
use duplex_audio::AudioSession;

const RATE: u32 = 48_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let frequency: f32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 440.0,
    };

    let mut session = AudioSession::builder()
        .on_event(|event| eprintln!("stream event: {event:?}"))
        .connect()?;

    let step = frequency / RATE as f32;
    let mut phase: f32 = 0.0;
    let spec = session
        .output_stream()
        .sample_rate(RATE)
        .format(SampleFormat::FLOAT32NE)
        .channels(2)
        .write_callback(move |bytes, frames| {
            for frame in 0..frames {
                let value = (phase * std::f32::consts::TAU).sin() * 0.3;
                let sample = value.to_ne_bytes();
                let base = frame * 8;
                bytes[base..base + 4].copy_from_slice(&sample);
                bytes[base + 4..base + 8].copy_from_slice(&sample);
                phase += step;
                if phase >= 1.0 {
                    phase -= 1.0;
                }
            }
            frames * 8
        })
        .start()?;
    println!(
        "Playing {frequency}Hz on '{}' for 3 seconds...",
        spec.device_name
    );

    std::thread::sleep(Duration::from_secs(3));
    let stats = session.stats();
    session.close();
    println!(
        "Rendered {} frames, {} underflows",
        stats.frames_rendered, stats.underflows
    );
    Ok(())
}
