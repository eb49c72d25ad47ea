//! RDP connection-sequence and slow-path PDUs.

pub mod client_info;
pub mod headers;

pub use self::client_info::{ClientInfo, ClientInfoFlags, CompressionType, Credentials};
pub use self::headers::{
    BasicSecurityHeader, BasicSecurityHeaderFlags, ShareControlHeader, ShareControlPduType, BASIC_SECURITY_HEADER_SIZE,
};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

/// TS_SECURITY_PACKET, the client random encrypted with the server public
/// key, behind a length prefix that counts the 8 zero padding bytes of
/// MS-RDPBCGR 5.3.4.2 (already part of the blob here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityExchangePdu {
    pub encrypted_client_random: Vec<u8>,
}

impl SecurityExchangePdu {
    const NAME: &'static str = "SecurityExchangePdu";

    const FIXED_PART_SIZE: usize = 4 /* length */;
}

impl PduEncode for SecurityExchangePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(cast_length!("length", self.encrypted_client_random.len())?);
        dst.write_slice(&self.encrypted_client_random);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.encrypted_client_random.len()
    }
}

impl<'de> PduDecode<'de> for SecurityExchangePdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let length: usize = cast_length!("length", src.read_u32())?;

        Ok(Self {
            encrypted_client_random: src.try_read_slice(Self::NAME, length)?.to_vec(),
        })
    }
}
