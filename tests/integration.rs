//! Integration tests for duplex-audio.
//!
//! Everything here runs against the dummy backend through the public API.
//! Tests that require actual audio hardware are marked with `#[ignore]`
//! and should be run manually.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use duplex_audio::format::SampleFormat;
use duplex_audio::{
    AudioIoError, AudioSession, BackendId, Direction, SessionConfig, StreamEvent,
};

fn dummy_session() -> AudioSession {
    AudioSession::builder()
        .backend(BackendId::Dummy)
        .connect()
        .unwrap()
}

fn dummy_session_with(config: SessionConfig) -> AudioSession {
    AudioSession::builder()
        .backend(BackendId::Dummy)
        .with_config(config)
        .connect()
        .unwrap()
}

/// Polls `condition` until it holds or a 5 second deadline passes.
fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_catalog_lists_dummy_devices() {
    let session = dummy_session();
    let catalog = session.catalog();

    assert_eq!(catalog.input_devices().len(), 1);
    assert_eq!(catalog.output_devices().len(), 1);
    assert_eq!(catalog.default_input_index(), Some(0));
    assert_eq!(catalog.default_output_index(), Some(0));

    let input = catalog.default_input_device().unwrap();
    assert_eq!(input.name, "Dummy Input Device");
    assert!(input.formats.contains(&SampleFormat::FLOAT32NE));
    assert!(!input.sample_rates.is_empty());
    assert!(input.probe_error.is_none());
}

#[test]
fn test_capture_delivers_contiguous_bytes() {
    let mut session = dummy_session_with(SessionConfig {
        requested_latency: Some(Duration::from_millis(20)),
        ..SessionConfig::default()
    });

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let spec = session
        .input_stream()
        .sample_rate(48_000)
        .channels(2)
        .read_callback(move |bytes, _frames| {
            sink.lock().unwrap().extend_from_slice(bytes);
        })
        .start()
        .unwrap();
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.channel_count(), 2);

    wait_until("8KiB of captured audio", || {
        collected.lock().unwrap().len() >= 8_192
    });
    session.stop_input();

    // The dummy device emits one continuous byte ramp; with a 30 second
    // ring nothing overflows, so delivery must be gapless and in order.
    let bytes = collected.lock().unwrap();
    for (index, &byte) in bytes.iter().enumerate() {
        assert_eq!(byte, index as u8, "discontinuity at byte {index}");
    }

    let stats = session.stats();
    assert!(stats.frames_captured > 0);
    assert_eq!(stats.overflows, 0);
}

#[test]
fn test_fixed_block_capture() {
    let mut session = dummy_session();

    let block_sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = block_sizes.clone();
    session
        .input_stream()
        .sample_rate(48_000)
        .channels(1)
        .block_size(512)
        .read_callback(move |_bytes, frames| {
            sink.lock().unwrap().push(frames);
        })
        .start()
        .unwrap();

    wait_until("four full blocks", || block_sizes.lock().unwrap().len() >= 4);
    session.stop_input();

    // Every delivery while running is exactly one block; stopping flushes
    // whatever tail is buffered, which may be shorter.
    let sizes = block_sizes.lock().unwrap();
    for &frames in &sizes[..sizes.len() - 1] {
        assert_eq!(frames, 512);
    }
    assert!(*sizes.last().unwrap() <= 512);
}

#[test]
fn test_playback_pulls_from_callback() {
    let mut session = dummy_session_with(SessionConfig {
        requested_latency: Some(Duration::from_millis(20)),
        ..SessionConfig::default()
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let spec = session
        .output_stream()
        .sample_rate(48_000)
        .channels(1)
        .write_callback(move |bytes, _frames| {
            counter.fetch_add(1, Ordering::SeqCst);
            bytes.fill(0x5a);
            bytes.len()
        })
        .start()
        .unwrap();
    assert_eq!(spec.channel_count(), 1);

    wait_until("ten thousand rendered frames", || {
        session.stats().frames_rendered > 10_000
    });
    assert!(calls.load(Ordering::SeqCst) > 0);

    session.pause_output(true).unwrap();
    session.pause_output(false).unwrap();
    let resumed_from = session.stats().frames_rendered;
    wait_until("rendering to resume", || {
        session.stats().frames_rendered > resumed_from
    });

    session.stop_output();
    assert!(!session.has_output_stream());
}

#[test]
fn test_duplex_streams_run_together() {
    let mut session = dummy_session_with(SessionConfig {
        requested_latency: Some(Duration::from_millis(20)),
        ..SessionConfig::default()
    });

    session
        .input_stream()
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();
    session
        .output_stream()
        .write_callback(|bytes, _frames| {
            bytes.fill(0);
            bytes.len()
        })
        .start()
        .unwrap();

    assert!(session.has_input_stream());
    assert!(session.has_output_stream());
    wait_until("traffic in both directions", || {
        let stats = session.stats();
        stats.frames_captured > 0 && stats.frames_rendered > 0
    });

    session.close();
    assert!(!session.has_input_stream());
    assert!(!session.has_output_stream());
}

#[test]
fn test_pause_halts_capture() {
    let mut session = dummy_session_with(SessionConfig {
        requested_latency: Some(Duration::from_millis(20)),
        ..SessionConfig::default()
    });

    session
        .input_stream()
        .sample_rate(48_000)
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();
    wait_until("capture to begin", || session.stats().frames_captured > 0);

    session.pause_input(true).unwrap();
    // Let any period already in flight land before sampling the counter.
    thread::sleep(Duration::from_millis(150));
    let frozen = session.stats().frames_captured;
    thread::sleep(Duration::from_millis(150));
    assert_eq!(session.stats().frames_captured, frozen);

    session.pause_input(false).unwrap();
    wait_until("capture to resume", || {
        session.stats().frames_captured > frozen
    });
}

#[test]
fn test_overflow_reported_when_consumer_stalls() {
    // A ring far smaller than one hardware period: every period overflows.
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = events.clone();
    let mut session = AudioSession::builder()
        .backend(BackendId::Dummy)
        .with_config(SessionConfig {
            ring_buffer_duration: Duration::from_millis(2),
            requested_latency: Some(Duration::from_millis(20)),
        })
        .on_event(move |event| log.lock().unwrap().push(event))
        .connect()
        .unwrap();

    session
        .input_stream()
        .sample_rate(48_000)
        .channels(2)
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();

    wait_until("an overflow event", || !events.lock().unwrap().is_empty());
    session.stop_input();

    assert!(session.stats().overflows >= 1);
    let events = events.lock().unwrap();
    match &events[0] {
        StreamEvent::Overflow {
            direction,
            needed_frames,
            free_frames,
        } => {
            assert_eq!(*direction, Direction::Input);
            assert!(needed_frames > free_frames);
        }
        other => panic!("expected an overflow event, got {other:?}"),
    }
}

#[test]
fn test_invalid_rate_leaves_session_clean() {
    let mut session = dummy_session();

    let err = session
        .input_stream()
        .sample_rate(10_000_000)
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap_err();
    assert!(matches!(
        err,
        AudioIoError::InvalidSampleRate {
            rate: 10_000_000,
            ..
        }
    ));
    assert!(!session.has_input_stream());

    // The failed attempt must not poison the session.
    session
        .input_stream()
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();
    assert!(session.has_input_stream());
}

#[test]
fn test_latency_queries() {
    let mut session = dummy_session_with(SessionConfig {
        requested_latency: Some(Duration::from_millis(20)),
        ..SessionConfig::default()
    });

    assert!(matches!(
        session.input_latency(),
        Err(AudioIoError::StreamNotActive { .. })
    ));

    session
        .input_stream()
        .sample_rate(48_000)
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();
    let latency = session.input_latency().unwrap();
    assert!((latency - 0.02).abs() < 1e-9, "latency was {latency}");
}

#[test]
fn test_clear_output_buffer() {
    let mut session = dummy_session();

    assert!(matches!(
        session.clear_output_buffer(),
        Err(AudioIoError::StreamNotActive { .. })
    ));

    session
        .output_stream()
        .write_callback(|bytes, _frames| {
            bytes.fill(0x11);
            bytes.len()
        })
        .start()
        .unwrap();
    session.clear_output_buffer().unwrap();
    assert!(session.has_output_stream());
}

#[test]
fn test_stop_and_close_are_idempotent() {
    let mut session = dummy_session();
    session
        .input_stream()
        .read_callback(|_bytes, _frames| {})
        .start()
        .unwrap();

    session.stop_input();
    session.stop_input();
    assert!(!session.has_input_stream());

    session.close();
    session.close();
}

/// This test requires actual audio hardware and should be run manually.
#[cfg(feature = "cpal-backend")]
#[test]
#[ignore = "requires audio hardware"]
fn test_real_capture() {
    let mut session = AudioSession::builder()
        .connect()
        .expect("no default backend available");
    for device in session.catalog().input_devices() {
        println!("input: {} ({})", device.name, device.id);
    }

    let captured = Arc::new(AtomicUsize::new(0));
    let counter = captured.clone();
    let spec = session
        .input_stream()
        .read_callback(move |bytes, _frames| {
            counter.fetch_add(bytes.len(), Ordering::SeqCst);
        })
        .start()
        .expect("failed to start capture");
    println!(
        "capturing {}Hz {} on '{}'",
        spec.sample_rate, spec.format, spec.device_name
    );

    thread::sleep(Duration::from_secs(1));
    session.close();
    let bytes = captured.load(Ordering::SeqCst);
    println!("captured {bytes} bytes");
    assert!(bytes > 0, "should have captured some audio");
}
