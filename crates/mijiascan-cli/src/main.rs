//! Command-line scanner for Mijia BLE sensors.
//!
//! Collects advertisement telemetry from whitelisted devices and prints the
//! averaged readings once the run ends (sample quota, timeout or Ctrl-C).

mod output;

use clap::Parser;
use log::LevelFilter;
use mijiascan::{
    decode, parse_whitelist, run_loop, AggregationStore, CancelToken, ScanParameters, ScanPolicy,
    ScanSession,
};
use std::process;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "mijiascan",
    about = "Scan BLE advertisements from Mijia sensors and report averaged readings",
    after_help = "Output: one line per value, `<TAG> <address> <timestamp> <value>` where\n\
                  TAG is T (temperature), H (humidity) or B (battery); T/H values have\n\
                  one decimal, B is an integer percentage."
)]
struct Cli {
    /// Bluetooth device addresses to scan (AA:BB:CC:DD:EE:FF)
    #[arg(required = true, value_name = "ADDRESS")]
    addresses: Vec<String>,

    /// HCI device to use (default: first available controller)
    #[arg(short = 'i', value_name = "DEV")]
    device: Option<String>,

    /// Output the average and stop after NUM samples per device
    #[arg(short = 'n', value_name = "NUM", value_parser = clap::value_parser!(u32).range(1..=1000))]
    samples: Option<u32>,

    /// Stop after TIMEOUT seconds
    #[arg(short = 't', value_name = "TIMEOUT", value_parser = clap::value_parser!(u64).range(1..=1000))]
    timeout: Option<u64>,

    /// Print output values to a file (default: stdout)
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<String>,

    /// Print raw advertisement bytes (debug)
    #[arg(short = 'd')]
    debug: bool,
}

static INTERRUPT: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn handle_sigint(_sig: libc::c_int) {
    if let Some(token) = INTERRUPT.get() {
        token.cancel();
    }
}

/// Installs a SIGINT handler that trips the returned token. The scan loop
/// then exits through normal teardown, keeping the controller usable.
fn interrupt_token() -> CancelToken {
    let token = INTERRUPT.get_or_init(CancelToken::new).clone();
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sigint as usize;
        action.sa_flags = libc::SA_NOCLDSTOP;
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
    token
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut builder = env_logger::Builder::from_default_env();
    if cli.debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    if let Some(path) = &cli.file {
        if !output::valid_filename(path) {
            eprintln!("Invalid file name");
            return 1;
        }
    }

    let whitelist = match parse_whitelist(&cli.addresses) {
        Ok(whitelist) => whitelist,
        Err(err) => {
            eprintln!("{}", err);
            return 1;
        }
    };

    let mut session = match ScanSession::open(cli.device.as_deref()) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("Could not open device: {}", err);
            return 1;
        }
    };

    if let Err(err) = session.configure_whitelist(&whitelist) {
        eprintln!("Could not configure whitelist: {}", err);
        return 1;
    }
    if let Err(err) = session.install_event_filter() {
        eprintln!("Could not set socket filter: {}", err);
        return 1;
    }
    if let Err(err) = session.start_scan(&ScanParameters::default()) {
        eprintln!("Could not start scan: {}", err);
        return 1;
    }

    let mut store = AggregationStore::default();
    for address in session.whitelist() {
        store.track(*address);
    }
    let active = session.whitelist().clone();

    let policy = ScanPolicy {
        sample_quota: cli.samples,
        timeout: cli.timeout.map(Duration::from_secs),
        cancel: interrupt_token(),
    };

    let quota = cli.samples;
    let outcome = run_loop(&mut session, &active, &policy, |report| {
        for reading in decode(report) {
            store.ingest(&reading);
        }
        quota.is_some_and(|q| store.quota_met(q))
    });

    // Teardown runs here regardless of outcome: filter restore, scan
    // disable, socket close.
    session.close();

    match outcome {
        Ok(outcome) => {
            log::info!("scan finished: {:?}", outcome);
            if let Err(err) = output::write_values(cli.file.as_deref(), &store.snapshot()) {
                eprintln!("Could not write output: {}", err);
                return 1;
            }
            0
        }
        Err(err) => {
            eprintln!("Could not receive advertising events: {}", err);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_full_invocation() {
        let cli = Cli::try_parse_from([
            "mijiascan",
            "-i",
            "hci1",
            "-n",
            "5",
            "-t",
            "60",
            "-f",
            "/tmp/out.txt",
            "-d",
            "AA:BB:CC:DD:EE:FF",
            "11:22:33:44:55:66",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("hci1"));
        assert_eq!(cli.samples, Some(5));
        assert_eq!(cli.timeout, Some(60));
        assert_eq!(cli.file.as_deref(), Some("/tmp/out.txt"));
        assert!(cli.debug);
        assert_eq!(cli.addresses.len(), 2);
    }

    #[test]
    fn test_cli_requires_an_address() {
        assert!(Cli::try_parse_from(["mijiascan"]).is_err());
    }

    #[test]
    fn test_cli_rejects_out_of_range_values() {
        assert!(Cli::try_parse_from(["mijiascan", "-n", "0", "AA:BB:CC:DD:EE:FF"]).is_err());
        assert!(Cli::try_parse_from(["mijiascan", "-n", "1001", "AA:BB:CC:DD:EE:FF"]).is_err());
        assert!(Cli::try_parse_from(["mijiascan", "-t", "0", "AA:BB:CC:DD:EE:FF"]).is_err());
        assert!(Cli::try_parse_from(["mijiascan", "-t", "1001", "AA:BB:CC:DD:EE:FF"]).is_err());
    }

    #[test]
    fn test_cli_defaults_are_unbounded() {
        let cli = Cli::try_parse_from(["mijiascan", "AA:BB:CC:DD:EE:FF"]).unwrap();
        assert_eq!(cli.samples, None);
        assert_eq!(cli.timeout, None);
        assert_eq!(cli.device, None);
        assert_eq!(cli.file, None);
        assert!(!cli.debug);
    }
}
