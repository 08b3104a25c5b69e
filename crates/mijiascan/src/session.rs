//! Scan session lifecycle: controller resolution, whitelist configuration,
//! scan parameters and the event-filter save/restore dance.
//!
//! The controller is a shared, stateful kernel resource. Scan disable and
//! filter restoration must run on every exit path, including partial setup
//! failures, or the controller is left needing a manual reset. `close` (also
//! invoked from `Drop`) attempts each teardown step independently.

use crate::address::DeviceAddress;
use crate::error::{Error, HciError};
use crate::hci::constants::*;
use crate::hci::{HciCommand, HciFilter, HciSocket, LeAdvertisingReport, WaitStatus};
use crate::reader::ReportSource;
use std::collections::HashSet;
use std::time::Duration;

/// Timeout for a single HCI command round-trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Passive-scan parameters.
///
/// Duplicate filtering defaults to off: some controllers (observed on
/// Raspberry Pi) deliver only the first advertisement from a device when
/// duplicate filtering is on, which starves the averaging loop.
#[derive(Debug, Clone, Copy)]
pub struct ScanParameters {
    /// Scan interval in 0.625 ms units.
    pub scan_interval: u16,
    /// Scan window in 0.625 ms units.
    pub scan_window: u16,
    pub filter_duplicates: bool,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            scan_interval: 0x0010,
            scan_window: 0x0010,
            filter_duplicates: false,
        }
    }
}

/// Parses a whitelist of textual addresses, skipping invalid entries with a
/// warning. Fails only when nothing valid remains.
pub fn parse_whitelist<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<DeviceAddress>, Error> {
    let mut parsed = Vec::with_capacity(addresses.len());
    for address in addresses {
        match address.as_ref().parse::<DeviceAddress>() {
            Ok(addr) => parsed.push(addr),
            Err(err) => log::warn!("skipping address '{}': {}", address.as_ref(), err),
        }
    }
    if parsed.is_empty() {
        return Err(Error::EmptyWhitelist);
    }
    Ok(parsed)
}

/// One open HCI session on a local controller.
pub struct ScanSession {
    socket: Option<HciSocket>,
    whitelist: HashSet<DeviceAddress>,
    saved_filter: Option<HciFilter>,
}

impl ScanSession {
    /// Opens a session on the selected controller.
    ///
    /// `selector` accepts an `hciN` name or a bare index; `None` resolves
    /// the first controller that is up.
    pub fn open(selector: Option<&str>) -> Result<Self, Error> {
        let dev_id = match selector {
            Some(name) => parse_dev_id(name)?,
            None => HciSocket::default_route()?,
        };
        let socket = HciSocket::open(dev_id)?;
        log::info!("opened HCI session on hci{}", dev_id);

        Ok(Self {
            socket: Some(socket),
            whitelist: HashSet::new(),
            saved_filter: None,
        })
    }

    fn socket(&self) -> Result<&HciSocket, Error> {
        self.socket.as_ref().ok_or(Error::Closed)
    }

    #[cfg(test)]
    fn detached() -> Self {
        Self {
            socket: None,
            whitelist: HashSet::new(),
            saved_filter: None,
        }
    }

    #[cfg(test)]
    fn with_socket(socket: HciSocket) -> Self {
        Self {
            socket: Some(socket),
            whitelist: HashSet::new(),
            saved_filter: None,
        }
    }

    /// The set of addresses currently installed in the controller whitelist.
    pub fn whitelist(&self) -> &HashSet<DeviceAddress> {
        &self.whitelist
    }

    /// Clears the controller whitelist and installs the given addresses.
    ///
    /// A failing add is logged and skipped so one bad or unsupported address
    /// cannot abort the rest; it is fatal only if no address makes it in.
    pub fn configure_whitelist(&mut self, addresses: &[DeviceAddress]) -> Result<(), Error> {
        let socket = self.socket.as_ref().ok_or(Error::Closed)?;

        socket.send_command_wait(&HciCommand::LeClearWhiteList, COMMAND_TIMEOUT)?;
        self.whitelist.clear();

        for &address in addresses {
            let command = HciCommand::LeAddDeviceToWhiteList {
                address_type: LE_PUBLIC_ADDRESS,
                address,
            };
            match socket.send_command_wait(&command, COMMAND_TIMEOUT) {
                Ok(()) => {
                    self.whitelist.insert(address);
                }
                Err(err) => log::warn!("could not whitelist {}: {}", address, err),
            }
        }

        if self.whitelist.is_empty() {
            return Err(Error::EmptyWhitelist);
        }
        log::info!("whitelisted {} device(s)", self.whitelist.len());
        Ok(())
    }

    /// Saves the socket's current event filter and installs one restricted
    /// to LE meta-events. The saved filter is restored by `close`.
    pub fn install_event_filter(&mut self) -> Result<(), Error> {
        let socket = self.socket()?;

        let previous = socket.filter()?;

        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);
        socket.set_filter(&filter)?;

        self.saved_filter = Some(previous);
        Ok(())
    }

    /// Sets passive-scan parameters (whitelist filter policy) and enables
    /// scanning.
    pub fn start_scan(&mut self, params: &ScanParameters) -> Result<(), Error> {
        let socket = self.socket()?;

        socket.send_command_wait(
            &HciCommand::LeSetScanParameters {
                scan_type: LE_SCAN_PASSIVE,
                scan_interval: params.scan_interval,
                scan_window: params.scan_window,
                own_address_type: LE_PUBLIC_ADDRESS,
                filter_policy: FILTER_POLICY_WHITE_LIST,
            },
            COMMAND_TIMEOUT,
        )?;

        socket.send_command_wait(
            &HciCommand::LeSetScanEnable {
                enable: true,
                filter_duplicates: params.filter_duplicates,
            },
            COMMAND_TIMEOUT,
        )?;

        log::info!("passive scan enabled");
        Ok(())
    }

    /// Disables scanning. Never propagates: teardown must not be cut short.
    pub fn stop_scan(&mut self) {
        if let Some(socket) = &self.socket {
            let command = HciCommand::LeSetScanEnable {
                enable: false,
                filter_duplicates: false,
            };
            if let Err(err) = socket.send_command_wait(&command, Duration::from_secs(1)) {
                log::warn!("disable scan failed: {}", err);
            }
        }
    }

    /// Restores the saved event filter, disables scanning and closes the
    /// socket. Each step runs regardless of earlier failures; calling this
    /// again (or after a failed setup) is a no-op.
    pub fn close(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };

        if let Some(filter) = self.saved_filter.take() {
            if let Err(err) = socket.set_filter(&filter) {
                log::warn!("restore event filter failed: {}", err);
            }
        }

        self.stop_scan();

        // Socket fd closes on drop.
        self.socket = None;
        log::info!("HCI session closed");
    }
}

impl ReportSource for ScanSession {
    /// Waits up to `wait` for one advertisement report.
    ///
    /// Frames that are not LE meta-events carrying an advertising report,
    /// and frames that fail validation, are discarded without ending the
    /// stream. Only the first report bundled in a meta-event is surfaced.
    fn next_report(&mut self, wait: Duration) -> Result<Option<LeAdvertisingReport>, Error> {
        let socket = self.socket()?;

        match socket.wait_readable(Some(wait))? {
            WaitStatus::TimedOut | WaitStatus::Interrupted => return Ok(None),
            WaitStatus::Readable => {}
        }

        let event = match socket.read_event() {
            Ok(event) => event,
            // Irrelevant or malformed frame; expected noise, keep reading.
            Err(HciError::InvalidPacketFormat) => return Ok(None),
            Err(HciError::Receive(err)) if err.kind() == std::io::ErrorKind::Interrupted => {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let report = LeAdvertisingReport::parse_from_meta_event(&event);
        if let Some(report) = &report {
            log::debug!(
                "{} - {}",
                report.address,
                hex::encode_upper(&report.data)
            );
        }
        Ok(report)
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_dev_id(name: &str) -> Result<u16, HciError> {
    let index = name.strip_prefix("hci").unwrap_or(name);
    index
        .parse::<u16>()
        .map_err(|_| HciError::InvalidDevice(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::FromRawFd;

    #[test]
    fn test_close_without_open_is_a_no_op() {
        let mut session = ScanSession::detached();
        session.close();
        session.close();
        session.stop_scan();
    }

    #[test]
    fn test_close_after_partial_setup_never_raises() {
        // A plain socketpair stands in for the controller fd: every teardown
        // command fails against it and must be logged, not raised.
        let mut fds = [0; 2];
        let rc = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(rc, 0);

        let socket = unsafe { HciSocket::from_raw_fd(fds[0]) };
        let mut session = ScanSession::with_socket(socket);
        // As if the event filter had been installed before setup failed.
        session.saved_filter = Some(HciFilter::new());

        session.stop_scan();
        session.close();
        // Closed twice: the second call finds no socket and returns.
        session.close();
        assert!(session.socket.is_none());
        assert!(session.saved_filter.is_none());

        unsafe { libc::close(fds[1]) };
    }

    #[test]
    fn test_parse_dev_id() {
        assert_eq!(parse_dev_id("hci0").unwrap(), 0);
        assert_eq!(parse_dev_id("hci1").unwrap(), 1);
        assert_eq!(parse_dev_id("2").unwrap(), 2);
        assert!(parse_dev_id("eth0").is_err());
        assert!(parse_dev_id("hci").is_err());
    }

    #[test]
    fn test_parse_whitelist_skips_invalid() {
        let parsed =
            parse_whitelist(&["AA:BB:CC:DD:EE:FF", "garbage", "11:22:33:44:55:66"]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(parsed[1].to_string(), "11:22:33:44:55:66");
    }

    #[test]
    fn test_parse_whitelist_all_invalid_is_fatal() {
        let result = parse_whitelist(&["garbage", "also bad"]);
        assert!(matches!(result, Err(Error::EmptyWhitelist)));
    }

    #[test]
    fn test_default_scan_parameters_keep_duplicates() {
        let params = ScanParameters::default();
        assert!(!params.filter_duplicates);
        assert_eq!(params.scan_interval, 0x0010);
        assert_eq!(params.scan_window, 0x0010);
    }
}
