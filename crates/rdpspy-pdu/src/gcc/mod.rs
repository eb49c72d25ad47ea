//! GCC (T.124) conference blocks carried by the MCS connect PDUs.

pub mod conference_create;

mod cluster_data;
mod core_data;
mod message_channel_data;
mod monitor_data;
mod multi_transport_channel_data;
mod network_data;
mod security_data;

pub use self::cluster_data::{ClientClusterData, RedirectionFlags, RedirectionVersion};
pub use self::conference_create::{ConferenceCreateRequest, ConferenceCreateResponse};
pub use self::core_data::client::{
    ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ColorDepth, ConnectionType, HighColorDepth,
    KeyboardType, SecureAccessSequence, SupportedColorDepths,
};
pub use self::core_data::server::{ServerCoreData, ServerCoreOptionalData, ServerEarlyCapabilityFlags};
pub use self::core_data::RdpVersion;
pub use self::message_channel_data::{ClientMessageChannelData, ServerMessageChannelData};
pub use self::monitor_data::{ClientMonitorData, Monitor};
pub use self::multi_transport_channel_data::{MultiTransportChannelData, MultiTransportFlags};
pub use self::network_data::{ChannelDef, ChannelName, ChannelOptions, ClientNetworkData, ServerNetworkData};
pub use self::security_data::{
    ClientSecurityData, EncryptionLevel, EncryptionMethod, ServerSecurityData, SERVER_RANDOM_LEN,
};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

/// 2.2.1.3 Client MCS Connect Initial PDU with GCC Conference Create Request
///
/// [2.2.1.3]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/db6713ee-1c0e-4064-a3b3-0fac30b4037b
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGccBlocks {
    pub core: ClientCoreData,
    pub security: ClientSecurityData,
    /// The Network GCC block is required by the standard, but FreeRDP omits it
    /// when it has no channel to join and real servers accept that, so it is
    /// optional here as well.
    pub network: Option<ClientNetworkData>,
    pub cluster: Option<ClientClusterData>,
    pub monitor: Option<ClientMonitorData>,
    pub message_channel: Option<ClientMessageChannelData>,
    pub multi_transport_channel: Option<MultiTransportChannelData>,
}

impl ClientGccBlocks {
    const NAME: &'static str = "ClientGccBlocks";

    pub fn channel_definitions(&self) -> Vec<ChannelDef> {
        self.network
            .as_ref()
            .map(|network| network.channels.clone())
            .unwrap_or_default()
    }
}

impl PduEncode for ClientGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        write_block(dst, BlockType::CLIENT_CORE, &self.core)?;
        write_block(dst, BlockType::CLIENT_SECURITY, &self.security)?;

        if let Some(block) = &self.network {
            write_block(dst, BlockType::CLIENT_NETWORK, block)?;
        }
        if let Some(block) = &self.cluster {
            write_block(dst, BlockType::CLIENT_CLUSTER, block)?;
        }
        if let Some(block) = &self.monitor {
            write_block(dst, BlockType::CLIENT_MONITOR, block)?;
        }
        if let Some(block) = &self.message_channel {
            write_block(dst, BlockType::CLIENT_MESSAGE_CHANNEL, block)?;
        }
        if let Some(block) = &self.multi_transport_channel {
            write_block(dst, BlockType::CLIENT_MULTI_TRANSPORT, block)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let optional = [
            self.network.as_ref().map(PduEncode::size),
            self.cluster.as_ref().map(PduEncode::size),
            self.monitor.as_ref().map(PduEncode::size),
            self.message_channel.as_ref().map(PduEncode::size),
            self.multi_transport_channel.as_ref().map(PduEncode::size),
        ];

        let mut total = block_size(&self.core) + block_size(&self.security);
        for block in optional.into_iter().flatten() {
            total += BLOCK_HEADER_SIZE + block;
        }

        total
    }
}

impl<'de> PduDecode<'de> for ClientGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;
        let mut cluster = None;
        let mut monitor = None;
        let mut message_channel = None;
        let mut multi_transport_channel = None;

        while src.len() >= BLOCK_HEADER_SIZE {
            let (block_type, mut body) = read_block(src, Self::NAME)?;

            match block_type {
                BlockType::CLIENT_CORE => core = Some(ClientCoreData::decode(&mut body)?),
                BlockType::CLIENT_SECURITY => security = Some(ClientSecurityData::decode(&mut body)?),
                BlockType::CLIENT_NETWORK => network = Some(ClientNetworkData::decode(&mut body)?),
                BlockType::CLIENT_CLUSTER => cluster = Some(ClientClusterData::decode(&mut body)?),
                BlockType::CLIENT_MONITOR => monitor = Some(ClientMonitorData::decode(&mut body)?),
                BlockType::CLIENT_MESSAGE_CHANNEL => {
                    message_channel = Some(ClientMessageChannelData::decode(&mut body)?);
                }
                BlockType::CLIENT_MULTI_TRANSPORT => {
                    multi_transport_channel = Some(MultiTransportChannelData::decode(&mut body)?);
                }
                unknown => return Err(unsupported_value_err!("blockType", format!("0x{:04X}", unknown.0))),
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_message_err!("core", "required GCC core is absent"))?,
            security: security.ok_or_else(|| invalid_message_err!("security", "required GCC security is absent"))?,
            network,
            cluster,
            monitor,
            message_channel,
            multi_transport_channel,
        })
    }
}

/// 2.2.1.4 Server MCS Connect Response PDU with GCC Conference Create Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGccBlocks {
    pub core: ServerCoreData,
    pub network: ServerNetworkData,
    pub security: ServerSecurityData,
    pub message_channel: Option<ServerMessageChannelData>,
    pub multi_transport_channel: Option<MultiTransportChannelData>,
}

impl ServerGccBlocks {
    const NAME: &'static str = "ServerGccBlocks";
}

impl PduEncode for ServerGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_block(dst, BlockType::SERVER_CORE, &self.core)?;
        write_block(dst, BlockType::SERVER_NETWORK, &self.network)?;
        write_block(dst, BlockType::SERVER_SECURITY, &self.security)?;

        if let Some(block) = &self.message_channel {
            write_block(dst, BlockType::SERVER_MESSAGE_CHANNEL, block)?;
        }
        if let Some(block) = &self.multi_transport_channel {
            write_block(dst, BlockType::SERVER_MULTI_TRANSPORT, block)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let optional = [
            self.message_channel.as_ref().map(PduEncode::size),
            self.multi_transport_channel.as_ref().map(PduEncode::size),
        ];

        let mut total = block_size(&self.core) + block_size(&self.network) + block_size(&self.security);
        for block in optional.into_iter().flatten() {
            total += BLOCK_HEADER_SIZE + block;
        }

        total
    }
}

impl<'de> PduDecode<'de> for ServerGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let mut core = None;
        let mut network = None;
        let mut security = None;
        let mut message_channel = None;
        let mut multi_transport_channel = None;

        while src.len() >= BLOCK_HEADER_SIZE {
            let (block_type, mut body) = read_block(src, Self::NAME)?;

            match block_type {
                BlockType::SERVER_CORE => core = Some(ServerCoreData::decode(&mut body)?),
                BlockType::SERVER_NETWORK => network = Some(ServerNetworkData::decode(&mut body)?),
                BlockType::SERVER_SECURITY => security = Some(ServerSecurityData::decode(&mut body)?),
                BlockType::SERVER_MESSAGE_CHANNEL => {
                    message_channel = Some(ServerMessageChannelData::decode(&mut body)?);
                }
                BlockType::SERVER_MULTI_TRANSPORT => {
                    multi_transport_channel = Some(MultiTransportChannelData::decode(&mut body)?);
                }
                unknown => return Err(unsupported_value_err!("blockType", format!("0x{:04X}", unknown.0))),
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_message_err!("core", "required GCC core is absent"))?,
            network: network.ok_or_else(|| invalid_message_err!("network", "required GCC network is absent"))?,
            security: security.ok_or_else(|| invalid_message_err!("security", "required GCC security is absent"))?,
            message_channel,
            multi_transport_channel,
        })
    }
}

/// TS_UD_HEADER block type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockType(pub u16);

impl BlockType {
    pub const CLIENT_CORE: Self = Self(0xC001);
    pub const CLIENT_SECURITY: Self = Self(0xC002);
    pub const CLIENT_NETWORK: Self = Self(0xC003);
    pub const CLIENT_CLUSTER: Self = Self(0xC004);
    pub const CLIENT_MONITOR: Self = Self(0xC005);
    pub const CLIENT_MESSAGE_CHANNEL: Self = Self(0xC006);
    pub const CLIENT_MULTI_TRANSPORT: Self = Self(0xC00A);

    pub const SERVER_CORE: Self = Self(0x0C01);
    pub const SERVER_SECURITY: Self = Self(0x0C02);
    pub const SERVER_NETWORK: Self = Self(0x0C03);
    pub const SERVER_MESSAGE_CHANNEL: Self = Self(0x0C04);
    pub const SERVER_MULTI_TRANSPORT: Self = Self(0x0C08);
}

/// TS_UD_HEADER: block type and block length, the length covering the
/// header itself.
const BLOCK_HEADER_SIZE: usize = 2 /* type */ + 2 /* length */;

fn block_size<B: PduEncode>(block: &B) -> usize {
    BLOCK_HEADER_SIZE + block.size()
}

fn write_block<B: PduEncode>(dst: &mut WriteCursor<'_>, block_type: BlockType, block: &B) -> PduResult<()> {
    ensure_size!(ctx: block.name(), in: dst, size: block_size(block));

    dst.write_u16(block_type.0);
    dst.write_u16(cast_length!(block.name(), "blockLen", block_size(block))?);
    block.encode(dst)
}

/// Reads one block header and hands back a cursor restricted to its body.
fn read_block<'a>(src: &mut ReadCursor<'a>, ctx: &'static str) -> PduResult<(BlockType, ReadCursor<'a>)> {
    let block_type = BlockType(src.try_read_u16(ctx)?);
    let block_length = usize::from(src.try_read_u16(ctx)?);

    let body_length = block_length
        .checked_sub(BLOCK_HEADER_SIZE)
        .ok_or_else(|| invalid_message_err!(ctx, "blockLen", "shorter than the block header"))?;

    let body = src.try_read_slice(ctx, body_length)?;

    Ok((block_type, ReadCursor::new(body)))
}

#[cfg(test)]
mod tests;
