use bitflags::bitflags;

use super::RdpVersion;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::nego::SecurityProtocol;
use crate::{PduDecode, PduEncode, PduResult};

/// 2.2.1.4.2 Server Core Data (TS_UD_SC_CORE).
///
/// Only the version is mandatory; servers may append the echoed client
/// protocols and their own early capability flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCoreData {
    pub version: RdpVersion,
    pub optional_data: ServerCoreOptionalData,
}

impl ServerCoreData {
    const NAME: &'static str = "ServerCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */;
}

impl PduEncode for ServerCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.0);
        self.optional_data.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.optional_data.size()
    }
}

impl<'de> PduDecode<'de> for ServerCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            version: RdpVersion(src.read_u32()),
            optional_data: ServerCoreOptionalData::decode(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerCoreOptionalData {
    pub client_requested_protocols: Option<SecurityProtocol>,
    pub early_capability_flags: Option<ServerEarlyCapabilityFlags>,
}

impl ServerCoreOptionalData {
    const NAME: &'static str = "ServerCoreOptionalData";
}

impl PduEncode for ServerCoreOptionalData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        if self.early_capability_flags.is_some() && self.client_requested_protocols.is_none() {
            return Err(invalid_message_err!(
                "clientRequestedProtocols",
                "must be present when earlyCapabilityFlags is"
            ));
        }

        if let Some(protocols) = self.client_requested_protocols {
            dst.write_u32(protocols.bits());
        }
        if let Some(flags) = self.early_capability_flags {
            dst.write_u32(flags.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.client_requested_protocols.map_or(0, |_| 4) + self.early_capability_flags.map_or(0, |_| 4)
    }
}

impl<'de> PduDecode<'de> for ServerCoreOptionalData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let mut data = Self::default();

        if src.len() < 4 {
            return Ok(data);
        }
        data.client_requested_protocols = Some(SecurityProtocol::from_bits_truncate(src.read_u32()));

        if src.len() < 4 {
            return Ok(data);
        }
        data.early_capability_flags = Some(ServerEarlyCapabilityFlags::from_bits_truncate(src.read_u32()));

        Ok(data)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ServerEarlyCapabilityFlags: u32 {
        const EDGE_ACTIONS_SUPPORTED_V1 = 0x0000_0001;
        const DYNAMIC_DST_SUPPORTED = 0x0000_0002;
        const EDGE_ACTIONS_SUPPORTED_V2 = 0x0000_0004;
        const SKIP_CHANNELJOIN_SUPPORTED = 0x0000_0008;
        const _ = !0;
    }
}
