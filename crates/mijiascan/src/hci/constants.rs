//! HCI protocol constants
//!
//! This module contains constants used in the Bluetooth HCI protocol.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_EVENT_PKT: u8 = 0x04;

// Maximum size of an HCI event packet (1 type byte + 2 header + 255 params)
pub const HCI_MAX_EVENT_SIZE: usize = 258;

// Common OGF (Opcode Group Field) values
pub const OGF_LE: u8 = 0x08;

// LE Command OCF values (OGF: 0x08)
pub const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
pub const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;
pub const OCF_LE_CLEAR_WHITE_LIST: u16 = 0x0010;
pub const OCF_LE_ADD_DEVICE_TO_WHITE_LIST: u16 = 0x0011;

// HCI Events
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_CMD_STATUS: u8 = 0x0F;
pub const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta Events
pub const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// Scan types
pub const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address types
pub const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Scan filter policies
pub const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;
pub const FILTER_POLICY_WHITE_LIST: u8 = 0x01;
