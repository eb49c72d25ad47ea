use bitflags::bitflags;
use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::{ensure_size, invalid_message_err, PduDecode, PduEncode, PduResult};

use super::PartialHeader;

const CAPABILITY_SET_TYPE_GENERAL: u16 = 0x0001;

const CAPABILITY_SET_HEADER_SIZE: usize = 2 /* type */ + 2 /* length */;

/// Represents `CLIPRDR_CAPS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub capabilities: Vec<CapabilitySet>,
}

impl Capabilities {
    const NAME: &'static str = "CLIPRDR_CAPS";

    const FIXED_PART_SIZE: usize = 2 /* cCapabilitiesSets */ + 2 /* pad */;

    /// Returns the negotiated general flags, when the general set is present.
    pub fn general_flags(&self) -> Option<ClipboardGeneralCapabilityFlags> {
        self.capabilities.iter().find_map(|set| match set {
            CapabilitySet::General(general) => Some(general.general_flags),
            CapabilitySet::Unknown(_) => None,
        })
    }

    fn inner_size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.capabilities.iter().map(|c| c.size()).sum::<usize>()
    }
}

impl PduEncode for Capabilities {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let header = PartialHeader::new(self.inner_size() as u32);
        header.encode(dst)?;

        dst.write_u16(self.capabilities.len() as u16);
        dst.write_u16(0); // pad

        for capability in &self.capabilities {
            capability.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + self.inner_size()
    }
}

impl<'de> PduDecode<'de> for Capabilities {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let _header = PartialHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);
        let count = usize::from(src.read_u16());
        let _pad = src.read_u16();

        let mut capabilities = Vec::with_capacity(count);
        for _ in 0..count {
            capabilities.push(CapabilitySet::decode(src)?);
        }

        Ok(Self { capabilities })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    General(GeneralCapabilitySet),
    Unknown(UnknownCapabilitySet),
}

impl CapabilitySet {
    const NAME: &'static str = "CLIPRDR_CAPS_SET";
}

impl PduEncode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        match self {
            CapabilitySet::General(general) => {
                dst.write_u16(CAPABILITY_SET_TYPE_GENERAL);
                dst.write_u16(self.size() as u16);
                dst.write_u32(general.version);
                dst.write_u32(general.general_flags.bits());
            }
            CapabilitySet::Unknown(unknown) => {
                dst.write_u16(unknown.set_type);
                dst.write_u16(self.size() as u16);
                dst.write_slice(&unknown.data);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let data_size = match self {
            CapabilitySet::General(_) => 8,
            CapabilitySet::Unknown(unknown) => unknown.data.len(),
        };

        CAPABILITY_SET_HEADER_SIZE + data_size
    }
}

impl<'de> PduDecode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: CAPABILITY_SET_HEADER_SIZE);

        let set_type = src.read_u16();
        let length = usize::from(src.read_u16());

        let Some(data_length) = length.checked_sub(CAPABILITY_SET_HEADER_SIZE) else {
            return Err(invalid_message_err!(
                Self::NAME,
                "lengthCapability",
                "smaller than the set header"
            ));
        };

        ensure_size!(ctx: Self::NAME, in: src, size: data_length);

        match set_type {
            CAPABILITY_SET_TYPE_GENERAL => {
                if data_length != 8 {
                    return Err(invalid_message_err!(
                        Self::NAME,
                        "lengthCapability",
                        "invalid general capability set length"
                    ));
                }

                let version = src.read_u32();
                let general_flags = ClipboardGeneralCapabilityFlags::from_bits_truncate(src.read_u32());

                Ok(CapabilitySet::General(GeneralCapabilitySet {
                    version,
                    general_flags,
                }))
            }
            _ => Ok(CapabilitySet::Unknown(UnknownCapabilitySet {
                set_type,
                data: src.read_slice(data_length).to_vec(),
            })),
        }
    }
}

/// Represents `CLIPRDR_GENERAL_CAPABILITY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralCapabilitySet {
    pub version: u32,
    pub general_flags: ClipboardGeneralCapabilityFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapabilitySet {
    pub set_type: u16,
    pub data: Vec<u8>,
}

bitflags! {
    /// Represents `generalFlags` field of `CLIPRDR_GENERAL_CAPABILITY` structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClipboardGeneralCapabilityFlags: u32 {
        const USE_LONG_FORMAT_NAMES = 0x0000_0002;
        const STREAM_FILECLIP_ENABLED = 0x0000_0004;
        const FILECLIP_NO_FILE_PATHS = 0x0000_0008;
        const CAN_LOCK_CLIPDATA = 0x0000_0010;
        const HUGE_FILE_SUPPORT_ENABLED = 0x0000_0020;
    }
}
