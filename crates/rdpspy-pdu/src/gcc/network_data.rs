use core::str;

use bitflags::bitflags;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

/// At most 31 optional static channels fit one connection.
const STATIC_CHANNEL_LIMIT: usize = 31;

/// A static virtual channel name: up to seven ANSI characters plus the
/// mandatory null terminator, padded to eight bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName {
    bytes: [u8; Self::SIZE],
}

impl ChannelName {
    pub const SIZE: usize = 8;

    /// Wraps a raw field, forcing the terminator byte.
    pub const fn new(mut bytes: [u8; Self::SIZE]) -> Self {
        bytes[Self::SIZE - 1] = 0;
        Self { bytes }
    }

    /// Builds a channel name from ASCII text of at most seven characters.
    pub fn from_utf8(name: &str) -> Option<Self> {
        if name.len() >= Self::SIZE || !name.is_ascii() {
            return None;
        }

        let mut bytes = [0u8; Self::SIZE];
        bytes[..name.len()].copy_from_slice(name.as_bytes());

        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }

    /// The name as text, when it is valid ASCII.
    pub fn as_str(&self) -> Option<&str> {
        let terminator = self.bytes.iter().position(|&byte| byte == 0)?;
        let name = &self.bytes[..terminator];

        name.is_ascii().then(|| str::from_utf8(name).expect("checked ASCII"))
    }
}

/// CHANNEL_DEF: a name plus its option bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDef {
    pub name: ChannelName,
    pub options: ChannelOptions,
}

impl ChannelDef {
    const NAME: &'static str = "ChannelDef";

    const FIXED_PART_SIZE: usize = ChannelName::SIZE + 4 /* options */;
}

impl PduEncode for ChannelDef {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_slice(self.name.as_bytes());
        dst.write_u32(self.options.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for ChannelDef {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            name: ChannelName::new(src.read_array()),
            options: ChannelOptions::from_bits_truncate(src.read_u32()),
        })
    }
}

/// 2.2.1.3.4 Client Network Data (TS_UD_CS_NET).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNetworkData {
    pub channels: Vec<ChannelDef>,
}

impl ClientNetworkData {
    const NAME: &'static str = "ClientNetworkData";

    const FIXED_PART_SIZE: usize = 4 /* channelCount */;
}

impl PduEncode for ClientNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(cast_length!("channelCount", self.channels.len())?);
        for channel in &self.channels {
            channel.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channels.iter().map(PduEncode::size).sum::<usize>()
    }
}

impl<'de> PduDecode<'de> for ClientNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let count: usize = cast_length!("channelCount", src.read_u32())?;
        if count > STATIC_CHANNEL_LIMIT {
            return Err(invalid_message_err!("channelCount", "over the static channel limit"));
        }

        let channels = (0..count)
            .map(|_| ChannelDef::decode(src))
            .collect::<PduResult<Vec<_>>>()?;

        Ok(Self { channels })
    }
}

/// 2.2.1.4.4 Server Network Data (TS_UD_SC_NET).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNetworkData {
    pub channel_ids: Vec<u16>,
    pub io_channel: u16,
}

impl ServerNetworkData {
    const NAME: &'static str = "ServerNetworkData";

    const FIXED_PART_SIZE: usize = 2 /* MCSChannelId */ + 2 /* channelCount */;

    /// The block size must be a multiple of four, so an odd id count drags
    /// two bytes of padding along.
    fn pad_len(&self) -> usize {
        self.channel_ids.len() % 2 * 2
    }
}

impl PduEncode for ServerNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.io_channel);
        dst.write_u16(cast_length!("channelCount", self.channel_ids.len())?);
        for &channel_id in &self.channel_ids {
            dst.write_u16(channel_id);
        }
        write_padding!(dst, self.pad_len());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channel_ids.len() * 2 + self.pad_len()
    }
}

impl<'de> PduDecode<'de> for ServerNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let io_channel = src.read_u16();
        let count = usize::from(src.read_u16());

        ensure_size!(in: src, size: count * 2);
        let channel_ids = (0..count).map(|_| src.read_u16()).collect();

        // Trailing padding, when the peer bothered to send it.
        if src.len() >= 2 {
            read_padding!(src, 2);
        }

        Ok(Self {
            channel_ids,
            io_channel,
        })
    }
}

bitflags! {
    /// CHANNEL_DEF options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ChannelOptions: u32 {
        const INITIALIZED = 0x8000_0000;
        const ENCRYPT_RDP = 0x4000_0000;
        const ENCRYPT_SC = 0x2000_0000;
        const ENCRYPT_CS = 0x1000_0000;
        const PRI_HIGH = 0x0800_0000;
        const PRI_MED = 0x0400_0000;
        const PRI_LOW = 0x0200_0000;
        const COMPRESS_RDP = 0x0080_0000;
        const COMPRESS = 0x0040_0000;
        const SHOW_PROTOCOL = 0x0020_0000;
        const REMOTE_CONTROL_PERSISTENT = 0x0010_0000;
        const _ = !0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn channel_name_keeps_seven_characters() {
        let name = ChannelName::from_utf8("cliprdr").unwrap();
        assert_eq!(name.as_bytes(), b"cliprdr\0");
        assert_eq!(name.as_str(), Some("cliprdr"));

        assert!(ChannelName::from_utf8("toolongname").is_none());
    }

    #[test]
    fn server_network_data_pads_odd_channel_count() {
        let data = ServerNetworkData {
            io_channel: 1003,
            channel_ids: vec![1004, 1005, 1006],
        };

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded.len() % 4, 0);

        let decoded: ServerNetworkData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
