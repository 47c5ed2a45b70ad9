//! Simple recording example.
//!
//! Records audio from the default input device to a WAV file.
//!
//! Run with: cargo run --example record [seconds] [outfile]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use duplex_audio::format::SampleFormat;
use duplex_audio::AudioSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let seconds: u64 = match args.next() {
        Some(arg) => arg.parse()?,
        None => 5,
    };
    let path = args.next().unwrap_or_else(|| String::from("recording.wav"));

    let mut session = AudioSession::builder()
        .on_event(|event| eprintln!("stream event: {event:?}"))
        .connect()?;

    // The callback runs on the bridge thread; hand the bytes to the main
    // thread over a channel so file I/O stays out of the audio path.
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let spec = session
        .input_stream()
        .format(SampleFormat::S16NE)
        .channels(1)
        .read_callback(move |bytes, _frames| {
            let _ = tx.send(bytes.to_vec());
        })
        .start()?;
    println!(
        "Recording {}Hz {} from '{}' to {path} for {seconds} seconds...",
        spec.sample_rate, spec.layout, spec.device_name
    );

    let wav_spec = hound::WavSpec {
        channels: spec.channel_count(),
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, wav_spec)?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => write_chunk(&mut writer, &chunk)?,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    session.stop_input();
    // Stopping flushed the tail into the channel; drain what is left.
    while let Ok(chunk) = rx.try_recv() {
        write_chunk(&mut writer, &chunk)?;
    }
    writer.finalize()?;

    let stats = session.stats();
    println!("Recording saved to {path}");
    println!(
        "Captured {} frames, {} overflows",
        stats.frames_captured, stats.overflows
    );
    Ok(())
}

fn write_chunk(
    writer: &mut hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    chunk: &[u8],
) -> Result<(), hound::Error> {
    for sample in chunk.chunks_exact(2) {
        writer.write_sample(i16::from_ne_bytes([sample[0], sample[1]]))?;
    }
    Ok(())
}
