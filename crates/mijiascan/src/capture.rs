//! Low-level capture surface for host-environment bindings.
//!
//! This variant deliberately performs no sensor decoding: it hands out one
//! raw advertisement payload per call, for the host to interpret. Errors are
//! logged rather than raised so the surface stays a simple bool/option pair.

use crate::address::DeviceAddress;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::reader::{ReportSource, POLL_INTERVAL};
use crate::session::{parse_whitelist, ScanParameters, ScanSession};
use std::collections::HashSet;

/// A whitelisted raw-advertisement capture.
#[derive(Default)]
pub struct BleCapture {
    session: Option<ScanSession>,
    whitelist: HashSet<DeviceAddress>,
    cancel: CancelToken,
}

impl BleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that makes a blocked `read` return `None`.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Opens the default controller, installs the whitelist and starts a
    /// passive scan. Returns false (after logging) on any failure.
    pub fn initialize<S: AsRef<str>>(&mut self, whitelist: &[S]) -> bool {
        match self.try_initialize(whitelist) {
            Ok(()) => true,
            Err(err) => {
                log::error!("capture initialization failed: {}", err);
                false
            }
        }
    }

    fn try_initialize<S: AsRef<str>>(&mut self, whitelist: &[S]) -> Result<(), Error> {
        let addresses = parse_whitelist(whitelist)?;

        let mut session = ScanSession::open(None)?;
        session.configure_whitelist(&addresses)?;
        session.install_event_filter()?;
        session.start_scan(&ScanParameters::default())?;

        self.whitelist = session.whitelist().clone();
        self.session = Some(session);
        Ok(())
    }

    /// Blocks until one advertisement arrives and returns its source address
    /// (colon-hex) and raw payload bytes. Returns `None` once cancelled or
    /// when the socket fails; the session then tears down on drop.
    pub fn read(&mut self) -> Option<(String, Vec<u8>)> {
        let session = self.session.as_mut()?;

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match session.next_report(POLL_INTERVAL) {
                Ok(Some(report)) => {
                    if !self.whitelist.contains(&report.address) {
                        // Soft mismatch: surfaced to the caller anyway.
                        log::warn!("report from unexpected address {}", report.address);
                    }
                    return Some((report.address.to_string(), report.data));
                }
                Ok(None) => continue,
                Err(err) => {
                    log::error!("capture read failed: {}", err);
                    return None;
                }
            }
        }
    }
}
