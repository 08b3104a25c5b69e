//! HCI packet structures and parsing
//!
//! This module contains structures and methods for handling HCI packets.

use crate::address::DeviceAddress;
use crate::hci::constants::*;

/// HCI commands used for LE passive scanning
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HciCommand {
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable {
        enable: bool,
        filter_duplicates: bool,
    },
    LeClearWhiteList,
    LeAddDeviceToWhiteList {
        address_type: u8,
        address: DeviceAddress,
    },
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            Self::LeSetScanParameters { .. } => (OGF_LE, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE, OCF_LE_SET_SCAN_ENABLE),
            Self::LeClearWhiteList => (OGF_LE, OCF_LE_CLEAR_WHITE_LIST),
            Self::LeAddDeviceToWhiteList { .. } => (OGF_LE, OCF_LE_ADD_DEVICE_TO_WHITE_LIST),
        }
    }

    /// Get the combined 16-bit opcode for this command
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        ((ogf as u16) << 10) | (ocf & 0x3ff)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        match *self {
            Self::LeClearWhiteList => vec![],

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(own_address_type);
                params.push(filter_policy);
                params
            }

            Self::LeSetScanEnable {
                enable,
                filter_duplicates,
            } => {
                vec![enable as u8, filter_duplicates as u8]
            }

            Self::LeAddDeviceToWhiteList {
                address_type,
                address,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(address_type);
                params.extend_from_slice(address.as_bytes());
                params
            }
        }
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }
}

/// HCI Event packet
#[derive(Debug, Clone)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let event_code = data[0];
        let parameter_total_length = data[1];

        if data.len() < (parameter_total_length as usize + 2) {
            return None;
        }

        let parameters = data[2..(parameter_total_length as usize + 2)].to_vec();

        Some(HciEvent {
            event_code,
            parameter_total_length,
            parameters,
        })
    }

    /// Returns the status of a Command Complete event for `opcode`, if this
    /// is one.
    pub fn command_complete_status(&self, opcode: u16) -> Option<u8> {
        if self.event_code != EVT_CMD_COMPLETE || self.parameters.len() < 4 {
            return None;
        }
        let event_opcode = u16::from_le_bytes([self.parameters[1], self.parameters[2]]);
        if event_opcode != opcode {
            return None;
        }
        Some(self.parameters[3])
    }

    /// Returns the status of a Command Status event for `opcode`, if this is
    /// one. A zero status means the command is still pending.
    pub fn command_status(&self, opcode: u16) -> Option<u8> {
        if self.event_code != EVT_CMD_STATUS || self.parameters.len() < 4 {
            return None;
        }
        let event_opcode = u16::from_le_bytes([self.parameters[2], self.parameters[3]]);
        if event_opcode != opcode {
            return None;
        }
        Some(self.parameters[0])
    }
}

/// LE Advertising Report Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvertisingReport {
    pub event_type: u8,
    pub address_type: u8,
    pub address: DeviceAddress,
    pub data: Vec<u8>,
    pub rssi: i8,
}

impl LeAdvertisingReport {
    /// Parse an LE Advertising Report from an HCI LE Meta Event.
    ///
    /// Only the first report of a multi-report event is parsed; additional
    /// bundled reports are ignored.
    pub fn parse_from_meta_event(event: &HciEvent) -> Option<Self> {
        if event.event_code != EVT_LE_META_EVENT || event.parameters.is_empty() {
            return None;
        }

        let subevent_code = event.parameters[0];
        if subevent_code != EVT_LE_ADVERTISING_REPORT {
            return None;
        }

        // subevent(1) + num_reports(1) + evt_type(1) + addr_type(1) + addr(6)
        // + data_len(1) + rssi(1)
        if event.parameters.len() < 12 {
            return None;
        }

        let num_reports = event.parameters[1];
        if num_reports == 0 {
            return None;
        }

        let event_type = event.parameters[2];
        let address_type = event.parameters[3];
        let address = DeviceAddress::from_wire(&event.parameters[4..10])?;

        let data_length = event.parameters[10] as usize;
        if event.parameters.len() < 11 + data_length + 1 {
            return None;
        }

        let data = event.parameters[11..11 + data_length].to_vec();
        let rssi = event.parameters[11 + data_length] as i8;

        Some(LeAdvertisingReport {
            event_type,
            address_type,
            address,
            data,
            rssi,
        })
    }
}
