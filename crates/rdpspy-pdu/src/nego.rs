//! Connection Initiation: the negotiation blocks carried by the X.224
//! Connection Request and Connection Confirm TPDUs.

use bitflags::bitflags;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::tpdu::{TpduCode, TpduHeader};
use crate::x224::X224Pdu;
use crate::{PduError, PduErrorExt as _, PduResult};

// RDP_NEG_* message types.
const NEG_MSG_REQUEST: u8 = 0x01;
const NEG_MSG_RESPONSE: u8 = 0x02;
const NEG_MSG_FAILURE: u8 = 0x03;

/// Every RDP_NEG_* block is exactly eight bytes:
/// type, flags, length and a 4-byte protocol/code payload.
const NEG_BLOCK_SIZE: usize = 1 + 1 + 2 + 4;

const COOKIE_PREFIX: &str = "Cookie: mstshash=";
const ROUTING_TOKEN_PREFIX: &str = "Cookie: msts=";
const CRLF: &[u8] = b"\r\n";

bitflags! {
    /// Security protocols negotiated during connection initiation
    /// (`requestedProtocols` / `selectedProtocol`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const RDSTLS = 0x0000_0004;
        const HYBRID_EX = 0x0000_0008;
        const RDSAAD = 0x0000_0010;
    }
}

impl SecurityProtocol {
    /// True when the negotiated protocol runs inside a TLS tunnel.
    pub fn is_tls_based(self) -> bool {
        self.intersects(Self::SSL | Self::HYBRID | Self::HYBRID_EX | Self::RDSTLS)
    }

    /// True when the protocol demands CredSSP, which the proxy does not speak.
    pub fn requires_nla(self) -> bool {
        self.intersects(Self::HYBRID | Self::HYBRID_EX)
    }
}

bitflags! {
    /// Flags of the RDP_NEG_REQ block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    /// Flags of the RDP_NEG_RSP block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const RDP_NEG_RSP_RESERVED = 0x04;
        const RESTRICTED_ADMIN_MODE_SUPPORTED = 0x08;
        const REDIRECTED_AUTHENTICATION_MODE_SUPPORTED = 0x10;
    }
}

/// Code carried by an RDP_NEG_FAILURE block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(1);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(2);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(3);
    pub const INCONSISTENT_FLAGS: Self = Self(4);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(5);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(6);
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match *self {
            Self::SSL_REQUIRED_BY_SERVER => "SSL_REQUIRED_BY_SERVER",
            Self::SSL_NOT_ALLOWED_BY_SERVER => "SSL_NOT_ALLOWED_BY_SERVER",
            Self::SSL_CERT_NOT_ON_SERVER => "SSL_CERT_NOT_ON_SERVER",
            Self::INCONSISTENT_FLAGS => "INCONSISTENT_FLAGS",
            Self::HYBRID_REQUIRED_BY_SERVER => "HYBRID_REQUIRED_BY_SERVER",
            Self::SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER => "SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER",
            Self(other) => return write!(f, "failure code {other}"),
        };

        f.write_str(name)
    }
}

/// The CRLF-terminated identification string a client may put in front of
/// its negotiation request: either a load-balancing token or a username
/// cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegoRequestData {
    RoutingToken(String),
    Cookie(String),
}

impl NegoRequestData {
    fn prefix(&self) -> &'static str {
        match self {
            NegoRequestData::RoutingToken(_) => ROUTING_TOKEN_PREFIX,
            NegoRequestData::Cookie(_) => COOKIE_PREFIX,
        }
    }

    fn value(&self) -> &str {
        match self {
            NegoRequestData::RoutingToken(value) | NegoRequestData::Cookie(value) => value,
        }
    }

    fn size(&self) -> usize {
        self.prefix().len() + self.value().len() + CRLF.len()
    }

    fn write(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: "NegoRequestData", in: dst, size: self.size());

        dst.write_slice(self.prefix().as_bytes());
        dst.write_slice(self.value().as_bytes());
        dst.write_slice(CRLF);

        Ok(())
    }

    /// Scans the variable part for a known prefix followed by a CRLF-ended
    /// identifier; absent data is not an error.
    fn read(src: &mut ReadCursor<'_>) -> PduResult<Option<Self>> {
        for prefix in [ROUTING_TOKEN_PREFIX, COOKIE_PREFIX] {
            if src.len() < prefix.len() || src.peek_slice(prefix.len()) != prefix.as_bytes() {
                continue;
            }

            let rest = &src.remaining()[prefix.len()..];
            let end = rest
                .windows(CRLF.len())
                .position(|window| window == CRLF)
                .ok_or_else(|| PduError::invalid_message("NegoRequestData", "identifier", "missing CRLF"))?;

            let value = core::str::from_utf8(&rest[..end])
                .map_err(|_| PduError::invalid_message("NegoRequestData", "identifier", "not valid UTF-8"))?
                .to_owned();

            src.advance(prefix.len() + end + CRLF.len());

            let data = if prefix == COOKIE_PREFIX {
                NegoRequestData::Cookie(value)
            } else {
                NegoRequestData::RoutingToken(value)
            };

            return Ok(Some(data));
        }

        Ok(None)
    }
}

fn write_neg_block(dst: &mut WriteCursor<'_>, message_type: u8, flags: u8, payload: u32) {
    dst.write_array([message_type, flags]);
    dst.write_u16(NEG_BLOCK_SIZE as u16);
    dst.write_u32(payload);
}

/// Client X.224 Connection Request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub nego_data: Option<NegoRequestData>,
    pub flags: RequestFlags,
    pub protocol: SecurityProtocol,
}

impl ConnectionRequest {
    const NAME: &'static str = "Client X.224 Connection Request";

    /// Legacy clients omit the RDP_NEG_REQ block entirely.
    fn has_neg_block(&self) -> bool {
        self.protocol != SecurityProtocol::RDP
    }
}

impl X224Pdu for ConnectionRequest {
    const X224_NAME: &'static str = Self::NAME;

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_REQUEST;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        if let Some(data) = &self.nego_data {
            data.write(dst)?;
        }

        if self.has_neg_block() {
            write_neg_block(dst, NEG_MSG_REQUEST, self.flags.bits(), self.protocol.bits());
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpdu: &TpduHeader) -> PduResult<Self> {
        let variable_part_size = tpdu.variable_part_size();
        ensure_size!(ctx: Self::NAME, in: src, size: variable_part_size);

        let before = src.len();
        let nego_data = NegoRequestData::read(src)?;
        let consumed = before - src.len();

        let rest = variable_part_size
            .checked_sub(consumed)
            .ok_or_else(|| PduError::invalid_message(Self::NAME, "li", "variable part smaller than its contents"))?;

        // No block left: a legacy request asking for plain RDP security.
        if rest < NEG_BLOCK_SIZE {
            return Ok(Self {
                nego_data,
                flags: RequestFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        let [message_type, raw_flags] = src.read_array();
        if message_type != NEG_MSG_REQUEST {
            return Err(unexpected_message_type_err!(Self::NAME, message_type));
        }

        let flags = RequestFlags::from_bits_truncate(raw_flags);
        if flags.contains(RequestFlags::CORRELATION_INFO_PRESENT) {
            return Err(PduError::invalid_message(
                Self::NAME,
                "flags",
                "RDP_NEG_CORRELATION_INFO is not supported",
            ));
        }

        let _block_length = src.read_u16();
        let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

        Ok(Self {
            nego_data,
            flags,
            protocol,
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        let data_size = self.nego_data.as_ref().map(NegoRequestData::size).unwrap_or(0);
        let block_size = if self.has_neg_block() { NEG_BLOCK_SIZE } else { 0 };

        data_size + block_size
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

/// Server X.224 Connection Confirm PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response {
        flags: ResponseFlags,
        protocol: SecurityProtocol,
    },
    Failure {
        code: FailureCode,
    },
}

impl ConnectionConfirm {
    const NAME: &'static str = "Server X.224 Connection Confirm";
}

impl X224Pdu for ConnectionConfirm {
    const X224_NAME: &'static str = Self::NAME;

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_CONFIRM;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        match self {
            ConnectionConfirm::Response { flags, protocol } => {
                write_neg_block(dst, NEG_MSG_RESPONSE, flags.bits(), protocol.bits());
            }
            ConnectionConfirm::Failure { code } => {
                write_neg_block(dst, NEG_MSG_FAILURE, 0, u32::from(*code));
            }
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpdu: &TpduHeader) -> PduResult<Self> {
        let variable_part_size = tpdu.variable_part_size();
        ensure_size!(ctx: Self::NAME, in: src, size: variable_part_size);

        // Ancient servers answer without any block at all.
        if variable_part_size == 0 {
            return Ok(Self::Response {
                flags: ResponseFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        ensure_size!(ctx: Self::NAME, in: src, size: NEG_BLOCK_SIZE);

        let [message_type, raw_flags] = src.read_array();
        let _block_length = src.read_u16();
        let payload = src.read_u32();

        match message_type {
            NEG_MSG_RESPONSE => Ok(Self::Response {
                flags: ResponseFlags::from_bits_truncate(raw_flags),
                protocol: SecurityProtocol::from_bits_truncate(payload),
            }),
            NEG_MSG_FAILURE => Ok(Self::Failure {
                code: FailureCode::from(payload),
            }),
            unexpected => Err(unexpected_message_type_err!(Self::NAME, unexpected)),
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        NEG_BLOCK_SIZE
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn connection_request_with_cookie_round_trips() {
        let pdu = ConnectionRequest {
            nego_data: Some(NegoRequestData::Cookie("victim".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ConnectionRequest = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn routing_token_is_told_apart_from_a_cookie() {
        let pdu = ConnectionRequest {
            nego_data: Some(NegoRequestData::RoutingToken("12345".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ConnectionRequest = decode(&encoded).unwrap();
        assert!(matches!(decoded.nego_data, Some(NegoRequestData::RoutingToken(_))));
    }

    #[test]
    fn plain_rdp_request_has_no_neg_block() {
        let pdu = ConnectionRequest {
            nego_data: None,
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::RDP,
        };

        let encoded = encode_vec(&pdu).unwrap();
        // li (6) + code + DST-REF + SRC-REF + class
        assert_eq!(encoded, [0x06, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn failure_confirm_round_trips() {
        let pdu = ConnectionConfirm::Failure {
            code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ConnectionConfirm = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn tls_confirm_reports_tls_selected() {
        let pdu = ConnectionConfirm::Response {
            flags: ResponseFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ConnectionConfirm = decode(&encoded).unwrap();

        match decoded {
            ConnectionConfirm::Response { protocol, .. } => {
                assert!(protocol.is_tls_based());
                assert!(!protocol.requires_nla());
            }
            ConnectionConfirm::Failure { .. } => panic!("expected a response"),
        }
    }
}
