//! Unit tests for HCI packet parsing and serialization

use super::constants::*;
use super::packet::*;
use super::socket::{HciFilter, HciSocket};
use crate::address::DeviceAddress;
use crate::error::HciError;
use std::os::unix::io::FromRawFd;

#[test]
fn test_scan_parameter_command_serialization() {
    let command = HciCommand::LeSetScanParameters {
        scan_type: LE_SCAN_PASSIVE,
        scan_interval: 0x0010,
        scan_window: 0x0010,
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_WHITE_LIST,
    };

    let packet = command.to_packet();

    assert_eq!(packet[0], HCI_COMMAND_PKT);

    // Opcode: LE Set Scan Parameters (0x000B)
    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x200B); // OGF_LE << 10 | OCF_LE_SET_SCAN_PARAMETERS

    // Param length: 7
    assert_eq!(packet[3], 7);

    assert_eq!(packet[4], 0x00); // passive scan
    assert_eq!(u16::from_le_bytes([packet[5], packet[6]]), 0x0010); // scan_interval
    assert_eq!(u16::from_le_bytes([packet[7], packet[8]]), 0x0010); // scan_window
    assert_eq!(packet[9], 0x00); // own_address_type
    assert_eq!(packet[10], 0x01); // whitelist filter policy
}

#[test]
fn test_scan_enable_command_serialization() {
    let command = HciCommand::LeSetScanEnable {
        enable: true,
        filter_duplicates: false,
    };

    let packet = command.to_packet();

    assert_eq!(packet[0], HCI_COMMAND_PKT);

    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x200C); // OGF_LE << 10 | OCF_LE_SET_SCAN_ENABLE

    assert_eq!(packet[3], 2);
    assert_eq!(packet[4], 0x01); // enable
    assert_eq!(packet[5], 0x00); // duplicates not filtered
}

#[test]
fn test_whitelist_command_serialization() {
    let command = HciCommand::LeClearWhiteList;
    let packet = command.to_packet();

    assert_eq!(packet[0], HCI_COMMAND_PKT);
    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x2010); // OGF_LE << 10 | OCF_LE_CLEAR_WHITE_LIST
    assert_eq!(packet[3], 0);

    let address: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
    let command = HciCommand::LeAddDeviceToWhiteList {
        address_type: LE_PUBLIC_ADDRESS,
        address,
    };
    let packet = command.to_packet();

    let opcode = u16::from_le_bytes([packet[1], packet[2]]);
    assert_eq!(opcode, 0x2011); // OGF_LE << 10 | OCF_LE_ADD_DEVICE_TO_WHITE_LIST
    assert_eq!(packet[3], 7);
    assert_eq!(packet[4], 0x00); // address type
    // Address in wire order (least-significant byte first)
    assert_eq!(&packet[5..11], &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
}

#[test]
fn test_hci_event_parsing() {
    // A Command Complete event for LE Clear White List
    let data = [
        EVT_CMD_COMPLETE, // Event code
        4,                // Parameter length
        1,                // Num_HCI_Command_Packets
        0x10,             // Command_Opcode (low byte)
        0x20,             // Command_Opcode (high byte)
        0x00,             // Status
    ];

    let event = HciEvent::parse(&data).unwrap();

    assert_eq!(event.event_code, EVT_CMD_COMPLETE);
    assert_eq!(event.parameter_total_length, 4);
    assert_eq!(event.parameters, vec![1, 0x10, 0x20, 0x00]);

    assert_eq!(event.command_complete_status(0x2010), Some(0x00));
    assert_eq!(event.command_complete_status(0x200C), None);
    assert_eq!(event.command_status(0x2010), None);

    // Invalid data tests
    assert!(HciEvent::parse(&[]).is_none()); // Empty data
    assert!(HciEvent::parse(&[EVT_CMD_COMPLETE, 10, 1, 2]).is_none()); // Too short for parameter length
}

#[test]
fn test_command_status_parsing() {
    let data = [
        EVT_CMD_STATUS, // Event code
        4,              // Parameter length
        0x0C,           // Status (command disallowed)
        1,              // Num_HCI_Command_Packets
        0x0C,           // Command_Opcode (low byte)
        0x20,           // Command_Opcode (high byte)
    ];

    let event = HciEvent::parse(&data).unwrap();

    assert_eq!(event.command_status(0x200C), Some(0x0C));
    assert_eq!(event.command_status(0x2010), None);
    assert_eq!(event.command_complete_status(0x200C), None);
}

#[test]
fn test_le_advertising_report_parsing() {
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameter_total_length: 16,
        parameters: vec![
            EVT_LE_ADVERTISING_REPORT, // Subevent code
            1,                         // Num_Reports
            0,                         // Event_Type
            0,                         // Address_Type
            0x01,
            0x02,
            0x03,
            0x04,
            0x05,
            0x06, // Address (wire order)
            3,    // Data_Length
            0x09,
            0x54,
            0x65, // Data
            0xC3, // RSSI (-61 dBm)
        ],
    };

    let report = LeAdvertisingReport::parse_from_meta_event(&event).unwrap();

    assert_eq!(report.event_type, 0);
    assert_eq!(report.address_type, 0);
    assert_eq!(report.address.to_string(), "06:05:04:03:02:01");
    assert_eq!(report.data, vec![0x09, 0x54, 0x65]);
    assert_eq!(report.rssi, -61);
}

#[test]
fn test_le_advertising_report_rejects_irrelevant_events() {
    // Not an LE Meta event
    let event = HciEvent {
        event_code: EVT_CMD_COMPLETE,
        parameter_total_length: 4,
        parameters: vec![1, 0x10, 0x20, 0x00],
    };
    assert!(LeAdvertisingReport::parse_from_meta_event(&event).is_none());

    // LE Meta event but not an advertising report
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameter_total_length: 3,
        parameters: vec![0x01, 0x00, 0x00],
    };
    assert!(LeAdvertisingReport::parse_from_meta_event(&event).is_none());

    // Advertising report with no reports
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameter_total_length: 2,
        parameters: vec![EVT_LE_ADVERTISING_REPORT, 0],
    };
    assert!(LeAdvertisingReport::parse_from_meta_event(&event).is_none());

    // Truncated report: claims 10 data bytes, carries none
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameter_total_length: 12,
        parameters: vec![
            EVT_LE_ADVERTISING_REPORT,
            1,
            0,
            0,
            0x01,
            0x02,
            0x03,
            0x04,
            0x05,
            0x06,
            10, // Data_Length larger than remaining bytes
            0xC3,
        ],
    };
    assert!(LeAdvertisingReport::parse_from_meta_event(&event).is_none());
}

#[test]
fn test_le_advertising_report_first_of_many() {
    // Two bundled reports; only the first is surfaced.
    let mut parameters = vec![
        EVT_LE_ADVERTISING_REPORT,
        2, // Num_Reports
        0,
        0,
        0x01,
        0x02,
        0x03,
        0x04,
        0x05,
        0x06,
        1,    // Data_Length
        0xAB, // Data
        0xC3, // RSSI
    ];
    // Second report, same shape but different address
    parameters.extend_from_slice(&[0, 0, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 1, 0xCD, 0xC4]);

    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameter_total_length: parameters.len() as u8,
        parameters,
    };

    let report = LeAdvertisingReport::parse_from_meta_event(&event).unwrap();
    assert_eq!(report.address.to_string(), "06:05:04:03:02:01");
    assert_eq!(report.data, vec![0xAB]);
}

#[test]
fn test_hci_filter_setup() {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    // HCI_EVENT_PKT (0x04) sets bit 4 in the type mask, EVT_LE_META_EVENT
    // (0x3E = 62) sets bit 30 of the second event mask word.
    assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
    assert_eq!(filter.event_mask[0], 0);
    assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));

    filter.set_opcode(0x200C);
    assert_eq!(filter.opcode, 0x200C);
}

#[test]
fn test_read_event_on_dead_socket_is_an_error() {
    // A socketpair with a closed peer reads as end-of-file. That must
    // surface as a receive error, not as a discardable bad frame.
    let mut fds = [0; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0);
    unsafe { libc::close(fds[1]) };

    let socket = unsafe { HciSocket::from_raw_fd(fds[0]) };
    match socket.read_event() {
        Err(HciError::Receive(err)) => {
            assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
        }
        other => panic!("expected a receive error, got {:?}", other),
    }
}
