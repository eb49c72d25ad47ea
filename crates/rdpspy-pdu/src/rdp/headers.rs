use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

pub const BASIC_SECURITY_HEADER_SIZE: usize = 4;

/// TS_SECURITY_HEADER, the non-FIPS basic security header: the flags word
/// plus an unused flagsHi word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicSecurityHeader {
    pub flags: BasicSecurityHeaderFlags,
}

impl BasicSecurityHeader {
    const NAME: &'static str = "BasicSecurityHeader";

    pub const FIXED_PART_SIZE: usize = BASIC_SECURITY_HEADER_SIZE;
}

impl PduEncode for BasicSecurityHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());
        dst.write_u16(0); // flagsHi
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for BasicSecurityHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = BasicSecurityHeaderFlags::from_bits(src.read_u16())
            .ok_or_else(|| invalid_message_err!("flags", "unknown security header flag"))?;
        let _flags_hi = src.read_u16();

        Ok(Self { flags })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BasicSecurityHeaderFlags: u16 {
        const EXCHANGE_PKT = 0x0001;
        const TRANSPORT_REQ = 0x0002;
        const TRANSPORT_RSP = 0x0004;
        const ENCRYPT = 0x0008;
        const RESET_SEQNO = 0x0010;
        const IGNORE_SEQNO = 0x0020;
        const INFO_PKT = 0x0040;
        const LICENSE_PKT = 0x0080;
        const LICENSE_ENCRYPT = 0x0200;
        const REDIRECTION_PKT = 0x0400;
        const SECURE_CHECKSUM = 0x0800;
        const AUTODETECT_REQ = 0x1000;
        const AUTODETECT_RSP = 0x2000;
        const HEARTBEAT = 0x4000;
        const FLAGSHI_VALID = 0x8000;
    }
}

/// TS_SHARECONTROLHEADER plus the share id every slow-path PDU starts with.
///
/// The proxy relays slow-path PDUs without interpreting their bodies, so the
/// body is carried as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareControlHeader {
    pub pdu_type: ShareControlPduType,
    pub pdu_source: u16,
    pub share_id: u32,
    pub data: Vec<u8>,
}

impl ShareControlHeader {
    const NAME: &'static str = "ShareControlHeader";

    const FIXED_PART_SIZE: usize = 2 /* totalLength */ + 2 /* pduType */ + 2 /* pduSource */ + 4 /* shareId */;

    /// The low nibble of pduType carries the type; the rest must hold the
    /// protocol version.
    const TYPE_BITS: u16 = 0x000F;
    const VERSION_BITS: u16 = 0x0010;
}

impl PduEncode for ShareControlHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(cast_length!("totalLength", self.size())?);
        dst.write_u16(Self::VERSION_BITS | self.pdu_type.to_u16().unwrap());
        dst.write_u16(self.pdu_source);
        dst.write_u32(self.share_id);
        dst.write_slice(&self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.data.len()
    }
}

impl<'de> PduDecode<'de> for ShareControlHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let total_length = usize::from(src.read_u16());
        let type_and_version = src.read_u16();
        let pdu_source = src.read_u16();
        let share_id = src.read_u32();

        if type_and_version & !Self::TYPE_BITS != Self::VERSION_BITS {
            return Err(invalid_message_err!("pduType", "bad protocol version"));
        }

        let pdu_type = ShareControlPduType::from_u16(type_and_version & Self::TYPE_BITS)
            .ok_or_else(|| invalid_message_err!("pduType", "unknown PDU type"))?;

        let data_length = total_length
            .checked_sub(Self::FIXED_PART_SIZE)
            .ok_or_else(|| invalid_message_err!("totalLength", "smaller than the share control header"))?;

        Ok(Self {
            pdu_type,
            pdu_source,
            share_id,
            data: src.try_read_slice(Self::NAME, data_length)?.to_vec(),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ShareControlPduType {
    DemandActivePdu = 0x1,
    ConfirmActivePdu = 0x3,
    DeactivateAllPdu = 0x6,
    DataPdu = 0x7,
    ServerRedirectPdu = 0xA,
}

impl ShareControlPduType {
    pub fn as_short_name(self) -> &'static str {
        match self {
            Self::DemandActivePdu => "Server Demand Active PDU",
            Self::ConfirmActivePdu => "Client Confirm Active PDU",
            Self::DeactivateAllPdu => "Server Deactivate All PDU",
            Self::DataPdu => "Data PDU",
            Self::ServerRedirectPdu => "Server Redirect PDU",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn basic_security_header_round_trips() {
        let header = BasicSecurityHeader {
            flags: BasicSecurityHeaderFlags::INFO_PKT | BasicSecurityHeaderFlags::ENCRYPT,
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded, [0x48, 0x00, 0x00, 0x00]);

        let decoded: BasicSecurityHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn share_control_header_round_trips() {
        let header = ShareControlHeader {
            pdu_type: ShareControlPduType::DataPdu,
            pdu_source: 1002,
            share_id: 0x0001_03EA,
            data: vec![0x01, 0x02, 0x03, 0x04],
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded.len(), header.size());

        let decoded: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn share_control_header_rejects_bad_version() {
        let bytes = [0x0A, 0x00, 0x07, 0x00, 0xEA, 0x03, 0x00, 0x00, 0x00, 0x00];
        assert!(decode::<ShareControlHeader>(&bytes).is_err());
    }
}
