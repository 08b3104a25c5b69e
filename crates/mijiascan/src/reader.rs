//! Advertisement read loop and termination policy.
//!
//! The loop is single-threaded with one suspension point: the bounded wait
//! inside `ReportSource::next_report`. Reports are handed to the caller in
//! arrival order. The wall-clock timeout is recomputed each iteration from
//! the loop start, and the cancellation token is checked every iteration, so
//! an interrupt is observed within one poll interval.

use crate::address::DeviceAddress;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::hci::LeAdvertisingReport;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Upper bound for a single socket wait; keeps cancellation prompt even with
/// no timeout configured.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of advertisement reports. Implemented by `ScanSession`; tests use
/// scripted sources.
pub trait ReportSource {
    /// Waits up to `wait` for the next report. `Ok(None)` means nothing
    /// relevant arrived within the wait; the loop keeps going.
    fn next_report(&mut self, wait: Duration) -> Result<Option<LeAdvertisingReport>, Error>;
}

/// When the read loop stops.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    /// Samples per device (temperature and humidity counts jointly) after
    /// which the loop may stop. `None` means unbounded.
    pub sample_quota: Option<u32>,
    /// Wall-clock limit for the whole loop. `None` means unbounded.
    pub timeout: Option<Duration>,
    /// External interrupt; exits the loop gracefully.
    pub cancel: CancelToken,
}

/// Why the read loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    QuotaSatisfied,
    TimedOut,
    Interrupted,
}

/// Runs the advertisement loop until the policy says stop.
///
/// `on_report` is invoked for every report whose address is whitelisted, in
/// arrival order; its return value reports whether the sample quota is now
/// met for every device (ignored when no quota is configured). Reports from
/// other addresses are expected radio noise and skipped silently.
pub fn run_loop<S, F>(
    source: &mut S,
    whitelist: &HashSet<DeviceAddress>,
    policy: &ScanPolicy,
    mut on_report: F,
) -> Result<ScanOutcome, Error>
where
    S: ReportSource,
    F: FnMut(&LeAdvertisingReport) -> bool,
{
    let start = Instant::now();

    loop {
        if policy.cancel.is_cancelled() {
            return Ok(ScanOutcome::Interrupted);
        }

        let wait = match policy.timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    return Ok(ScanOutcome::TimedOut);
                }
                remaining.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };

        let Some(report) = source.next_report(wait)? else {
            continue;
        };

        if !whitelist.contains(&report.address) {
            log::trace!("ignoring report from {}", report.address);
            continue;
        }

        let quota_met = on_report(&report);
        if policy.sample_quota.is_some() && quota_met {
            return Ok(ScanOutcome::QuotaSatisfied);
        }

        if let Some(limit) = policy.timeout {
            if start.elapsed() >= limit {
                return Ok(ScanOutcome::TimedOut);
            }
        }
    }
}
