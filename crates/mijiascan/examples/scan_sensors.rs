//! Example: Averaged sensor scan
//!
//! Scans the given Mijia sensors for thirty seconds and prints the averaged
//! readings.

use mijiascan::{
    decode, parse_whitelist, run_loop, AggregationStore, CancelToken, ScanParameters, ScanPolicy,
    ScanSession,
};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let addresses: Vec<String> = std::env::args().skip(1).collect();
    if addresses.is_empty() {
        eprintln!("usage: scan_sensors <address> [<address> ...]");
        std::process::exit(1);
    }

    let whitelist = parse_whitelist(&addresses)?;

    let mut session = ScanSession::open(None)?;
    session.configure_whitelist(&whitelist)?;
    session.install_event_filter()?;
    session.start_scan(&ScanParameters::default())?;

    let mut store = AggregationStore::default();
    for address in session.whitelist() {
        store.track(*address);
    }

    let policy = ScanPolicy {
        sample_quota: None,
        timeout: Some(Duration::from_secs(30)),
        cancel: CancelToken::new(),
    };

    let active = session.whitelist().clone();
    println!("Scanning for 30 seconds...");
    let outcome = run_loop(&mut session, &active, &policy, |report| {
        for reading in decode(report) {
            store.ingest(&reading);
        }
        false
    })?;
    session.close();
    println!("Scan finished: {:?}", outcome);

    for (address, readings) in store.snapshot() {
        if let Some(t) = readings.temperature {
            println!("T {} {} {:.1}", address, t.at, t.value);
        }
        if let Some(h) = readings.humidity {
            println!("H {} {} {:.1}", address, h.at, h.value);
        }
        if let Some((level, at)) = readings.battery {
            println!("B {} {} {}", address, at, level);
        }
    }

    Ok(())
}
