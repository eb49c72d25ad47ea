use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

/// 2.2.1.3.5 Client Cluster Data (TS_UD_CS_CLUSTER).
///
/// The redirection version is packed into bits 2..6 of the flags field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientClusterData {
    pub flags: RedirectionFlags,
    pub redirection_version: RedirectionVersion,
    pub redirected_session_id: u32,
}

impl ClientClusterData {
    const NAME: &'static str = "ClientClusterData";

    const FIXED_PART_SIZE: usize = 4 /* flags */ + 4 /* redirectedSessionId */;

    const VERSION_SHIFT: u32 = 2;
    const VERSION_MASK: u32 = 0b1111 << Self::VERSION_SHIFT;
}

impl PduEncode for ClientClusterData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        let packed = self.flags.bits() | (self.redirection_version as u32) << Self::VERSION_SHIFT;

        dst.write_u32(packed);
        dst.write_u32(self.redirected_session_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for ClientClusterData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let packed = src.read_u32();
        let version_bits = (packed & Self::VERSION_MASK) >> Self::VERSION_SHIFT;

        Ok(Self {
            flags: RedirectionFlags::from_bits_truncate(packed & !Self::VERSION_MASK),
            redirection_version: RedirectionVersion::from_u32(version_bits)
                .ok_or_else(|| invalid_message_err!("redirectionVersion", "unknown version"))?,
            redirected_session_id: src.read_u32(),
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RedirectionFlags: u32 {
        const REDIRECTION_SUPPORTED = 0x0000_0001;
        const REDIRECTED_SESSION_FIELD_VALID = 0x0000_0002;
        const REDIRECTED_SMARTCARD = 0x0000_0040;
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum RedirectionVersion {
    V1 = 0,
    V2 = 1,
    V3 = 2,
    V4 = 3,
    V5 = 4,
    V6 = 5,
}
