//! Device listing example.
//!
//! Prints every device the backend exposes along with the parameters a
//! stream could negotiate against it. Defaults are marked with `*`.
//!
//! Run with: cargo run --example devices [backend]
//!
//! where `backend` is one of: alsa, coreaudio, wasapi, dummy.

use duplex_audio::{AudioSession, BackendId, Device};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let session = match std::env::args().nth(1) {
        Some(name) => {
            let backend: BackendId = name.parse()?;
            AudioSession::builder().backend(backend).connect()?
        }
        None => AudioSession::builder().connect()?,
    };
    println!("backend: {}", session.backend_id());

    let catalog = session.catalog();
    println!("\ninput devices:");
    let default_input = catalog.default_input_index();
    for (index, device) in catalog.input_devices().iter().enumerate() {
        print_device(index, device, default_input == Some(index));
    }
    println!("\noutput devices:");
    let default_output = catalog.default_output_index();
    for (index, device) in catalog.output_devices().iter().enumerate() {
        print_device(index, device, default_output == Some(index));
    }
    Ok(())
}

fn print_device(index: usize, device: &Device, is_default: bool) {
    let marker = if is_default { "*" } else { " " };
    println!("{marker} [{index}] {}", device.name);
    if let Some(reason) = &device.probe_error {
        println!("      probe failed: {reason}");
        return;
    }

    let rates: Vec<String> = device
        .sample_rates
        .iter()
        .map(|range| {
            if range.min == range.max {
                format!("{}", range.min)
            } else {
                format!("{}-{}", range.min, range.max)
            }
        })
        .collect();
    println!(
        "      rates: {} Hz (current {})",
        rates.join(", "),
        device.current_sample_rate
    );

    let formats: Vec<String> = device.formats.iter().map(ToString::to_string).collect();
    println!("      formats: {}", formats.join(", "));

    let layouts: Vec<String> = device
        .layouts
        .iter()
        .map(|layout| layout.name().to_string())
        .collect();
    println!("      layouts: {}", layouts.join(", "));
    println!(
        "      latency: {:.1}-{:.1} ms",
        device.latency.min * 1000.0,
        device.latency.max * 1000.0
    );
}
