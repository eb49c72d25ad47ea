//! Static virtual channel framing (CHANNEL_PDU_HEADER).
//!
//! Channel messages longer than the negotiated chunk size are split across
//! several PDUs; `length` always advertises the size of the whole
//! reassembled message, and the FIRST/LAST flags delimit the chunks
//! (MS-RDPBCGR 3.1.5.2.2).

use bitflags::bitflags;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

pub const CHANNEL_PDU_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPduHeader {
    /// Total length of the uncompressed channel message, this header
    /// excluded.
    pub length: u32,
    pub flags: ChannelControlFlags,
}

impl ChannelPduHeader {
    const NAME: &'static str = "ChannelPduHeader";

    const FIXED_PART_SIZE: usize = 4 /* length */ + 4 /* flags */;
}

impl PduEncode for ChannelPduHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.length);
        dst.write_u32(self.flags.bits());
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for ChannelPduHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            length: src.read_u32(),
            flags: ChannelControlFlags::from_bits_truncate(src.read_u32()),
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ChannelControlFlags: u32 {
        const FLAG_FIRST = 0x0000_0001;
        const FLAG_LAST = 0x0000_0002;
        const FLAG_SHOW_PROTOCOL = 0x0000_0010;
        const FLAG_SUSPEND = 0x0000_0020;
        const FLAG_RESUME = 0x0000_0040;
        const FLAG_SHADOW_PERSISTENT = 0x0000_0080;
        const PACKET_COMPRESSED = 0x0020_0000;
        const PACKET_AT_FRONT = 0x0040_0000;
        const PACKET_FLUSHED = 0x0080_0000;
        const COMPRESSION_TYPE_MASK = 0x000F_0000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn channel_pdu_header_round_trips() {
        let header = ChannelPduHeader {
            length: 1234,
            flags: ChannelControlFlags::FLAG_FIRST | ChannelControlFlags::FLAG_LAST,
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded.len(), CHANNEL_PDU_HEADER_SIZE);

        let decoded: ChannelPduHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }
}
