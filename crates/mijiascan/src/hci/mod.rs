//! Bluetooth HCI (Host Controller Interface) implementation
//!
//! This module provides functionality for interacting with HCI interfaces.

pub mod constants;
pub mod packet;
pub mod socket;

#[cfg(test)]
mod tests;

pub use packet::{HciCommand, HciEvent, LeAdvertisingReport};
pub use socket::{HciFilter, HciSocket, WaitStatus};
