//! Example: Raw advertisement capture
//!
//! This example demonstrates the low-level capture surface: raw payloads
//! from whitelisted devices, no sensor decoding.

use mijiascan::BleCapture;

fn main() {
    env_logger::init();

    let addresses: Vec<String> = std::env::args().skip(1).collect();
    if addresses.is_empty() {
        eprintln!("usage: capture_raw <address> [<address> ...]");
        std::process::exit(1);
    }

    let mut capture = BleCapture::new();
    if !capture.initialize(&addresses) {
        eprintln!("Failed to initialize capture (root or CAP_NET_ADMIN needed)");
        std::process::exit(1);
    }

    println!("Capturing advertisements, Ctrl-C to stop...");
    while let Some((address, payload)) = capture.read() {
        println!("{} - {}", address, hex::encode_upper(&payload));
    }
}
