//! PDUs for [MS-RDPEFS]: Remote Desktop Protocol: File System Virtual
//! Channel Extension, covering the subset the proxy inspects: announce and
//! capability exchange, the client device list, and device I/O
//! requests/responses with Create/Read/Write/Close bodies.

pub mod pdu;

pub use pdu::*;
