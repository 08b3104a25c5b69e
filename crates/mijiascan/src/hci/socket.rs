//! HCI socket implementation for Bluetooth communication
//!
//! This module wraps the raw kernel HCI socket interface: opening and binding
//! a controller, kernel-side event filters, bounded waits and HCI command
//! round-trips.

use crate::error::HciError;
use crate::hci::constants::*;
use crate::hci::packet::{HciCommand, HciEvent};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::time::{Duration, Instant};

// Bluetooth socket constants
const AF_BLUETOOTH: i32 = 31;
const BTPROTO_HCI: i32 = 1;
const HCI_CHANNEL_RAW: u16 = 0;
const SOL_HCI: i32 = 0;
const HCI_FILTER: i32 = 2;

// Controller enumeration (HCIGETDEVLIST = _IOR('H', 210, int))
const HCIGETDEVLIST: libc::c_ulong = 0x800448D2;
const HCI_MAX_DEV: usize = 16;
const HCI_UP: u32 = 0;

// Define the sockaddr_hci structure
#[repr(C)]
struct SockaddrHci {
    hci_family: libc::sa_family_t,
    hci_dev: u16,
    hci_channel: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct HciDevReq {
    dev_id: u16,
    dev_opt: u32,
}

#[repr(C)]
struct HciDevListReq {
    dev_num: u16,
    dev_req: [HciDevReq; HCI_MAX_DEV],
}

/// Kernel HCI event filter, as understood by `SOL_HCI`/`HCI_FILTER`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HciFilter {
    pub(crate) type_mask: u32,
    pub(crate) event_mask: [u32; 2],
    pub(crate) opcode: u16,
}

impl HciFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32 & 31);
    }

    pub fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }

    pub fn set_opcode(&mut self, opcode: u16) {
        self.opcode = opcode;
    }
}

/// Outcome of a bounded wait on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Readable,
    TimedOut,
    Interrupted,
}

/// Represents an HCI socket
#[derive(Debug)]
pub struct HciSocket {
    fd: RawFd,
}

impl HciSocket {
    /// Opens a raw HCI socket bound to the given controller.
    pub fn open(dev_id: u16) -> Result<Self, HciError> {
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                BTPROTO_HCI,
            )
        };

        if fd < 0 {
            return Err(HciError::Socket(std::io::Error::last_os_error()));
        }

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };

        let result = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(HciError::Bind(err));
        }

        Ok(HciSocket { fd })
    }

    /// Resolves the default controller: the first device that is up.
    pub fn default_route() -> Result<u16, HciError> {
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                BTPROTO_HCI,
            )
        };
        if fd < 0 {
            return Err(HciError::Socket(std::io::Error::last_os_error()));
        }

        let mut list = HciDevListReq {
            dev_num: HCI_MAX_DEV as u16,
            dev_req: [HciDevReq {
                dev_id: 0,
                dev_opt: 0,
            }; HCI_MAX_DEV],
        };

        let result = unsafe { libc::ioctl(fd, HCIGETDEVLIST as _, &mut list as *mut _) };
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        if result < 0 {
            return Err(HciError::Socket(err));
        }

        let count = (list.dev_num as usize).min(HCI_MAX_DEV);
        list.dev_req[..count]
            .iter()
            .find(|dev| dev.dev_opt & (1 << HCI_UP) != 0)
            .map(|dev| dev.dev_id)
            .ok_or(HciError::RouteNotFound)
    }

    /// Reads the socket's current event filter.
    pub fn filter(&self) -> Result<HciFilter, HciError> {
        let mut filter = HciFilter::new();
        let mut len = std::mem::size_of::<HciFilter>() as libc::socklen_t;

        let result = unsafe {
            libc::getsockopt(
                self.fd,
                SOL_HCI,
                HCI_FILTER,
                &mut filter as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if result < 0 {
            return Err(HciError::GetFilter(std::io::Error::last_os_error()));
        }

        Ok(filter)
    }

    /// Installs an event filter on the socket.
    pub fn set_filter(&self, filter: &HciFilter) -> Result<(), HciError> {
        let result = unsafe {
            libc::setsockopt(
                self.fd,
                SOL_HCI,
                HCI_FILTER,
                filter as *const _ as *const libc::c_void,
                std::mem::size_of::<HciFilter>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(HciError::SetFilter(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Waits until the socket is readable, the timeout passes, or a signal
    /// interrupts the wait. A `None` timeout blocks indefinitely.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<WaitStatus, HciError> {
        let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_SET(self.fd, &mut read_fds);
        }

        let result = match timeout {
            Some(timeout) => {
                let mut timeout_val = libc::timeval {
                    tv_sec: timeout.as_secs() as libc::time_t,
                    tv_usec: timeout.subsec_micros() as libc::suseconds_t,
                };
                unsafe {
                    libc::select(
                        self.fd + 1,
                        &mut read_fds,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                        &mut timeout_val,
                    )
                }
            }
            None => unsafe {
                libc::select(
                    self.fd + 1,
                    &mut read_fds,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            },
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(WaitStatus::Interrupted);
            }
            return Err(HciError::Receive(err));
        }

        if result == 0 {
            return Ok(WaitStatus::TimedOut);
        }

        Ok(WaitStatus::Readable)
    }

    /// Read an HCI event frame from the socket.
    ///
    /// Non-event packets and frames too short to carry an event header are
    /// rejected as `InvalidPacketFormat`; the socket stream itself stays
    /// usable.
    pub fn read_event(&self) -> Result<HciEvent, HciError> {
        let mut buffer = [0u8; HCI_MAX_EVENT_SIZE];

        let bytes_read = unsafe {
            libc::read(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        };

        if bytes_read < 0 {
            return Err(HciError::Receive(std::io::Error::last_os_error()));
        }

        // A zero-byte read means the descriptor is gone, not a bad frame.
        if bytes_read == 0 {
            return Err(HciError::Receive(std::io::ErrorKind::UnexpectedEof.into()));
        }

        if bytes_read < 3 || buffer[0] != HCI_EVENT_PKT {
            return Err(HciError::InvalidPacketFormat);
        }

        match HciEvent::parse(&buffer[1..bytes_read as usize]) {
            Some(event) => Ok(event),
            None => Err(HciError::InvalidPacketFormat),
        }
    }

    /// Sends an HCI command to the controller without waiting for completion.
    pub fn send_command(&self, command: &HciCommand) -> Result<(), HciError> {
        let packet = command.to_packet();
        match unsafe {
            libc::write(
                self.fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
            )
        } {
            -1 => Err(HciError::Send(std::io::Error::last_os_error())),
            _ => Ok(()),
        }
    }

    /// Sends an HCI command and waits for the matching Command Complete.
    ///
    /// The socket filter is temporarily narrowed to command responses for
    /// this opcode and restored afterwards, whatever the outcome.
    pub fn send_command_wait(
        &self,
        command: &HciCommand,
        timeout: Duration,
    ) -> Result<(), HciError> {
        let saved = self.filter()?;

        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_CMD_COMPLETE);
        filter.set_event(EVT_CMD_STATUS);
        filter.set_opcode(command.opcode());
        self.set_filter(&filter)?;

        let result = self.wait_command_response(command, timeout);

        if let Err(err) = self.set_filter(&saved) {
            log::warn!("could not restore socket filter: {}", err);
        }

        result
    }

    fn wait_command_response(
        &self,
        command: &HciCommand,
        timeout: Duration,
    ) -> Result<(), HciError> {
        self.send_command(command)?;

        let opcode = command.opcode();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HciError::CommandTimeout);
            }

            match self.wait_readable(Some(remaining))? {
                WaitStatus::TimedOut => return Err(HciError::CommandTimeout),
                WaitStatus::Interrupted => continue,
                WaitStatus::Readable => {}
            }

            let event = match self.read_event() {
                Ok(event) => event,
                Err(HciError::InvalidPacketFormat) => continue,
                Err(err) => return Err(err),
            };

            if let Some(status) = event.command_complete_status(opcode) {
                if status == 0 {
                    return Ok(());
                }
                return Err(HciError::CommandFailed { opcode, status });
            }

            if let Some(status) = event.command_status(opcode) {
                // Zero means the command is still in flight.
                if status != 0 {
                    return Err(HciError::CommandFailed { opcode, status });
                }
            }
        }
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl FromRawFd for HciSocket {
    /// Wraps an already-open descriptor. The socket takes ownership and
    /// closes it on drop.
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        HciSocket { fd }
    }
}

impl Drop for HciSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
