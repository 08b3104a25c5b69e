//! Error types for the mijiascan library
//!
//! This module defines the error types used throughout the library.

use thiserror::Error;

/// Errors that can occur when working with HCI sockets
#[derive(Error, Debug)]
pub enum HciError {
    #[error("Failed to open HCI socket: {0}")]
    Socket(std::io::Error),

    #[error("Failed to bind to HCI device: {0}")]
    Bind(std::io::Error),

    #[error("No usable Bluetooth controller found")]
    RouteNotFound,

    #[error("Invalid HCI device: {0}")]
    InvalidDevice(String),

    #[error("Failed to send HCI command: {0}")]
    Send(std::io::Error),

    #[error("Failed to receive HCI event: {0}")]
    Receive(std::io::Error),

    #[error("Could not get socket filter: {0}")]
    GetFilter(std::io::Error),

    #[error("Could not set socket filter: {0}")]
    SetFilter(std::io::Error),

    #[error("Controller rejected command 0x{opcode:04X} with status 0x{status:02X}")]
    CommandFailed { opcode: u16, status: u8 },

    #[error("Timed out waiting for command completion")]
    CommandTimeout,

    #[error("Invalid HCI packet format")]
    InvalidPacketFormat,
}

/// Top-level errors for scan sessions
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Hci(#[from] HciError),

    #[error("No valid device address in whitelist")]
    EmptyWhitelist,

    #[error("Session is closed")]
    Closed,
}
