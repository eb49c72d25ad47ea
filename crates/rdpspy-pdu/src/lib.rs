//! Encoding and decoding for the RDP protocol layers the interception proxy
//! terminates: TPKT, X.224 class 0, MCS (T.125), GCC (T.124), the RDP
//! connection-sequence PDUs, fast-path framing, and RDP standard security.

use core::fmt;

#[macro_use]
mod macros;

pub mod crypto;
pub mod cursor;
pub mod fast_path;
pub mod gcc;
pub mod mcs;
pub mod nego;
pub mod rdp;
pub mod tpdu;
pub mod tpkt;
pub mod utils;
pub mod vc;
pub mod x224;

pub(crate) mod ber;
pub(crate) mod per;

use crate::cursor::{ReadCursor, WriteCursor};

pub type PduResult<T> = Result<T, PduError>;

/// Error raised while encoding or decoding a PDU: the name of the codec that
/// failed, a structured kind, and optionally the error underneath.
#[derive(Debug)]
pub struct PduError {
    pub context: &'static str,
    pub kind: PduErrorKind,
    source: Option<Box<dyn std::error::Error + Sync + Send>>,
}

#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum PduErrorKind {
    NotEnoughBytes { received: usize, expected: usize },
    InvalidMessage { field: &'static str, reason: &'static str },
    UnexpectedMessageType { got: u8 },
    UnsupportedVersion { got: u8 },
    UnsupportedValue { name: &'static str, value: String },
}

impl PduError {
    #[cold]
    #[must_use]
    pub fn new(context: &'static str, kind: PduErrorKind) -> Self {
        Self {
            context,
            kind,
            source: None,
        }
    }

    #[cold]
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> &PduErrorKind {
        &self.kind
    }
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.kind)
    }
}

impl fmt::Display for PduErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughBytes { received, expected } => {
                write!(f, "truncated input ({received} bytes left, {expected} needed)")
            }
            Self::InvalidMessage { field, reason } => write!(f, "bad `{field}` field: {reason}"),
            Self::UnexpectedMessageType { got } => write!(f, "unexpected message type 0x{got:02x}"),
            Self::UnsupportedVersion { got } => write!(f, "unsupported version {got}"),
            Self::UnsupportedValue { name, value } => write!(f, "unsupported {name}: {value}"),
        }
    }
}

impl std::error::Error for PduError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<PduError> for std::io::Error {
    fn from(error: PduError) -> Self {
        Self::new(std::io::ErrorKind::InvalidData, error)
    }
}

/// Constructors for [`PduError`]; the helper macros in this crate call these
/// through the trait so other crates can reuse them.
pub trait PduErrorExt {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self;
    fn invalid_message(context: &'static str, field: &'static str, reason: &'static str) -> Self;
    fn unexpected_message_type(context: &'static str, got: u8) -> Self;
    fn unsupported_version(context: &'static str, got: u8) -> Self;
    fn unsupported_value(context: &'static str, name: &'static str, value: String) -> Self;
}

impl PduErrorExt for PduError {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self {
        Self::new(context, PduErrorKind::NotEnoughBytes { received, expected })
    }

    fn invalid_message(context: &'static str, field: &'static str, reason: &'static str) -> Self {
        Self::new(context, PduErrorKind::InvalidMessage { field, reason })
    }

    fn unexpected_message_type(context: &'static str, got: u8) -> Self {
        Self::new(context, PduErrorKind::UnexpectedMessageType { got })
    }

    fn unsupported_version(context: &'static str, got: u8) -> Self {
        Self::new(context, PduErrorKind::UnsupportedVersion { got })
    }

    fn unsupported_value(context: &'static str, name: &'static str, value: String) -> Self {
        Self::new(context, PduErrorKind::UnsupportedValue { name, value })
    }
}

/// A PDU that knows how to serialize itself into a caller-provided buffer.
///
/// Object-safe so layers can hold boxed PDUs.
pub trait PduEncode {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()>;

    fn name(&self) -> &'static str;

    /// Exact encoded size in bytes.
    fn size(&self) -> usize;
}

assert_obj_safe!(PduEncode);

/// A PDU parsed from a complete binary message.
pub trait PduDecode<'de>: Sized {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self>;
}

/// Encodes `pdu` into `dst`, returning the number of bytes written.
pub fn encode<T>(pdu: &T, dst: &mut [u8]) -> PduResult<usize>
where
    T: PduEncode + ?Sized,
{
    let mut cursor = WriteCursor::new(dst);
    pdu.encode(&mut cursor)?;
    Ok(cursor.pos())
}

/// Encodes `pdu` into a freshly allocated buffer of exactly the right size.
pub fn encode_vec<T>(pdu: &T) -> PduResult<Vec<u8>>
where
    T: PduEncode + ?Sized,
{
    let mut buf = vec![0; pdu.size()];
    let written = encode(pdu, &mut buf)?;
    debug_assert_eq!(written, buf.len());
    Ok(buf)
}

/// Decodes one `T` from the start of `src`.
pub fn decode<'de, T>(src: &'de [u8]) -> PduResult<T>
where
    T: PduDecode<'de>,
{
    T::decode(&mut ReadCursor::new(src))
}

/// Decodes one `T` from the cursor, leaving the remainder in place.
pub fn decode_cursor<'de, T>(src: &mut ReadCursor<'de>) -> PduResult<T>
where
    T: PduDecode<'de>,
{
    T::decode(src)
}

/// Raw bytes forwarded verbatim.
impl PduEncode for Vec<u8> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: "raw", in: dst, size: self.len());
        dst.write_slice(self);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "raw"
    }

    fn size(&self) -> usize {
        self.len()
    }
}

/// The action bits discriminating the outer framing of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    FastPath = 0x0,
    X224 = 0x3,
}

/// Result of successfully sniffing the start of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PduInfo {
    pub action: Action,
    /// Size of the whole frame, outer headers included.
    pub length: usize,
}

/// Finds the size of the next frame in `bytes`, if enough bytes are available.
///
/// TPKT frames start with the version byte 3; fast-path frames have the two
/// low bits of the first byte cleared. Anything else is not valid RDP traffic
/// and yields an error carrying the offending byte.
pub fn find_size(bytes: &[u8]) -> PduResult<Option<PduInfo>> {
    const CTX: &str = "Segmentation";

    let Some(&header) = bytes.first() else {
        return Ok(None);
    };

    if header == tpkt::TpktHeader::VERSION {
        if bytes.len() < tpkt::TpktHeader::SIZE {
            return Ok(None);
        }

        let length = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));

        if length < tpkt::TpktHeader::SIZE {
            return Err(invalid_message_err!(CTX, "length", "TPKT length smaller than its header"));
        }

        Ok(Some(PduInfo {
            action: Action::X224,
            length,
        }))
    } else if header & 0b11 == Action::FastPath as u8 {
        // PER length: one byte when < 0x80, two bytes otherwise.
        let Some(&length1) = bytes.get(1) else {
            return Ok(None);
        };

        let (length, sizeof_length) = if length1 & 0x80 != 0 {
            let Some(&length2) = bytes.get(2) else {
                return Ok(None);
            };
            (usize::from(length1 & 0x7f) << 8 | usize::from(length2), 2)
        } else {
            (usize::from(length1), 1)
        };

        if length < 1 + sizeof_length {
            return Err(invalid_message_err!(
                CTX,
                "length",
                "fast-path length smaller than its header",
            ));
        }

        Ok(Some(PduInfo {
            action: Action::FastPath,
            length,
        }))
    } else {
        Err(unexpected_message_type_err!(CTX, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_size_needs_more_bytes_for_tpkt() {
        assert_eq!(find_size(&[0x03, 0x00]).unwrap(), None);
    }

    #[test]
    fn find_size_reads_tpkt_length() {
        let info = find_size(&[0x03, 0x00, 0x00, 0x13]).unwrap().unwrap();
        assert_eq!(info.action, Action::X224);
        assert_eq!(info.length, 0x13);
    }

    #[test]
    fn find_size_reads_fast_path_short_length() {
        let info = find_size(&[0x00, 0x08]).unwrap().unwrap();
        assert_eq!(info.action, Action::FastPath);
        assert_eq!(info.length, 8);
    }

    #[test]
    fn find_size_reads_fast_path_long_length() {
        let info = find_size(&[0x00, 0x81, 0x2a]).unwrap().unwrap();
        assert_eq!(info.action, Action::FastPath);
        assert_eq!(info.length, 0x12a);
    }

    #[test]
    fn find_size_rejects_unknown_header() {
        let err = find_size(&[0xff, 0x00, 0x00, 0x04]).unwrap_err();
        match err.kind() {
            PduErrorKind::UnexpectedMessageType { got } => assert_eq!(*got, 0xff),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
