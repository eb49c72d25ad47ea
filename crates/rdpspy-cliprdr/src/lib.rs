//! This crate implements RDP clipboard channel PDU encode/decode logic as
//! defined in [MS-RDPECLIP]: Remote Desktop Protocol: Clipboard Virtual
//! Channel Extension.

pub mod pdu;

pub use pdu::*;
