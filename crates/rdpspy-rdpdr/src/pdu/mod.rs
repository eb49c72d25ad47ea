pub mod efs;

pub use efs::*;

use core::fmt;

use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::{ensure_size, PduDecode, PduEncode, PduResult};

/// [2.2.1.1 Shared Header (RDPDR_HEADER)](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpefs/29d4108f-8163-4a67-8271-e48c4b9c2a7c)
///
/// A header that is shared by all RDPDR PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedHeader {
    pub component: Component,
    pub packet_id: PacketId,
}

impl SharedHeader {
    const NAME: &'static str = "RDPDR_HEADER";

    pub const SIZE: usize = 4;

    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::SIZE);

        Ok(Self {
            component: Component(src.read_u16()),
            packet_id: PacketId(src.read_u16()),
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: Self::SIZE);

        dst.write_u16(self.component.0);
        dst.write_u16(self.packet_id.0);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component(pub u16);

impl Component {
    pub const CORE: Self = Self(0x4472);
    pub const PRN: Self = Self(0x5052);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(pub u16);

impl PacketId {
    pub const CORE_SERVER_ANNOUNCE: Self = Self(0x496E);
    pub const CORE_CLIENTID_CONFIRM: Self = Self(0x4343);
    pub const CORE_CLIENT_NAME: Self = Self(0x434E);
    pub const CORE_DEVICELIST_ANNOUNCE: Self = Self(0x4441);
    pub const CORE_DEVICE_REPLY: Self = Self(0x6472);
    pub const CORE_DEVICE_IOREQUEST: Self = Self(0x4952);
    pub const CORE_DEVICE_IOCOMPLETION: Self = Self(0x4943);
    pub const CORE_SERVER_CAPABILITY: Self = Self(0x5350);
    pub const CORE_CLIENT_CAPABILITY: Self = Self(0x4350);
    pub const CORE_DEVICELIST_REMOVE: Self = Self(0x444D);
    pub const CORE_USER_LOGGEDON: Self = Self(0x554C);
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::CORE_SERVER_ANNOUNCE => "PAKID_CORE_SERVER_ANNOUNCE",
            Self::CORE_CLIENTID_CONFIRM => "PAKID_CORE_CLIENTID_CONFIRM",
            Self::CORE_CLIENT_NAME => "PAKID_CORE_CLIENT_NAME",
            Self::CORE_DEVICELIST_ANNOUNCE => "PAKID_CORE_DEVICELIST_ANNOUNCE",
            Self::CORE_DEVICE_REPLY => "PAKID_CORE_DEVICE_REPLY",
            Self::CORE_DEVICE_IOREQUEST => "PAKID_CORE_DEVICE_IOREQUEST",
            Self::CORE_DEVICE_IOCOMPLETION => "PAKID_CORE_DEVICE_IOCOMPLETION",
            Self::CORE_SERVER_CAPABILITY => "PAKID_CORE_SERVER_CAPABILITY",
            Self::CORE_CLIENT_CAPABILITY => "PAKID_CORE_CLIENT_CAPABILITY",
            Self::CORE_DEVICELIST_REMOVE => "PAKID_CORE_DEVICELIST_REMOVE",
            Self::CORE_USER_LOGGEDON => "PAKID_CORE_USER_LOGGEDON",
            _ => return write!(f, "PAKID(0x{:04X})", self.0),
        };

        f.write_str(name)
    }
}

/// The RDPDR PDUs the proxy models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdpdrPdu {
    ServerAnnounceRequest(VersionAndIdPdu),
    ClientAnnounceReply(VersionAndIdPdu),
    ServerClientIdConfirm(VersionAndIdPdu),
    CoreCapability(CoreCapability),
    ClientDeviceListAnnounce(ClientDeviceListAnnounce),
    DeviceIoRequest(DeviceIoRequest),
    DeviceIoResponse(DeviceIoResponse),
    /// Any other RDPDR message, forwarded verbatim.
    Unknown(UnknownRdpdrPdu),
}

impl RdpdrPdu {
    const NAME: &'static str = "RdpdrPdu";

    fn header(&self) -> SharedHeader {
        match self {
            RdpdrPdu::ServerAnnounceRequest(_) => SharedHeader {
                component: Component::CORE,
                packet_id: PacketId::CORE_SERVER_ANNOUNCE,
            },
            RdpdrPdu::ClientAnnounceReply(_) | RdpdrPdu::ServerClientIdConfirm(_) => SharedHeader {
                component: Component::CORE,
                packet_id: PacketId::CORE_CLIENTID_CONFIRM,
            },
            RdpdrPdu::CoreCapability(pdu) => SharedHeader {
                component: Component::CORE,
                packet_id: match pdu.kind {
                    CoreCapabilityKind::ServerCoreCapabilityRequest => PacketId::CORE_SERVER_CAPABILITY,
                    CoreCapabilityKind::ClientCoreCapabilityResponse => PacketId::CORE_CLIENT_CAPABILITY,
                },
            },
            RdpdrPdu::ClientDeviceListAnnounce(_) => SharedHeader {
                component: Component::CORE,
                packet_id: PacketId::CORE_DEVICELIST_ANNOUNCE,
            },
            RdpdrPdu::DeviceIoRequest(_) => SharedHeader {
                component: Component::CORE,
                packet_id: PacketId::CORE_DEVICE_IOREQUEST,
            },
            RdpdrPdu::DeviceIoResponse(_) => SharedHeader {
                component: Component::CORE,
                packet_id: PacketId::CORE_DEVICE_IOCOMPLETION,
            },
            RdpdrPdu::Unknown(pdu) => pdu.header,
        }
    }
}

impl<'de> PduDecode<'de> for RdpdrPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = SharedHeader::decode(src)?;

        if header.component != Component::CORE {
            return Ok(RdpdrPdu::Unknown(UnknownRdpdrPdu::decode_with_header(src, header)?));
        }

        match header.packet_id {
            PacketId::CORE_SERVER_ANNOUNCE => Ok(RdpdrPdu::ServerAnnounceRequest(VersionAndIdPdu::decode(src)?)),
            PacketId::CORE_CLIENTID_CONFIRM => {
                // Client reply and server confirm share the wire layout; the
                // direction tells them apart, which the caller knows.
                Ok(RdpdrPdu::ClientAnnounceReply(VersionAndIdPdu::decode(src)?))
            }
            PacketId::CORE_SERVER_CAPABILITY => Ok(RdpdrPdu::CoreCapability(CoreCapability::decode_with_kind(
                src,
                CoreCapabilityKind::ServerCoreCapabilityRequest,
            )?)),
            PacketId::CORE_CLIENT_CAPABILITY => Ok(RdpdrPdu::CoreCapability(CoreCapability::decode_with_kind(
                src,
                CoreCapabilityKind::ClientCoreCapabilityResponse,
            )?)),
            PacketId::CORE_DEVICELIST_ANNOUNCE => {
                Ok(RdpdrPdu::ClientDeviceListAnnounce(ClientDeviceListAnnounce::decode(src)?))
            }
            PacketId::CORE_DEVICE_IOREQUEST => Ok(RdpdrPdu::DeviceIoRequest(DeviceIoRequest::decode(src)?)),
            PacketId::CORE_DEVICE_IOCOMPLETION => Ok(RdpdrPdu::DeviceIoResponse(DeviceIoResponse::decode(src)?)),
            _ => Ok(RdpdrPdu::Unknown(UnknownRdpdrPdu::decode_with_header(src, header)?)),
        }
    }
}

impl PduEncode for RdpdrPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        self.header().encode(dst)?;

        match self {
            RdpdrPdu::ServerAnnounceRequest(pdu)
            | RdpdrPdu::ClientAnnounceReply(pdu)
            | RdpdrPdu::ServerClientIdConfirm(pdu) => pdu.encode(dst),
            RdpdrPdu::CoreCapability(pdu) => pdu.encode(dst),
            RdpdrPdu::ClientDeviceListAnnounce(pdu) => pdu.encode(dst),
            RdpdrPdu::DeviceIoRequest(pdu) => pdu.encode(dst),
            RdpdrPdu::DeviceIoResponse(pdu) => pdu.encode(dst),
            RdpdrPdu::Unknown(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RdpdrPdu::ServerAnnounceRequest(_) => "ServerAnnounceRequest",
            RdpdrPdu::ClientAnnounceReply(_) => "ClientAnnounceReply",
            RdpdrPdu::ServerClientIdConfirm(_) => "ServerClientIdConfirm",
            RdpdrPdu::CoreCapability(pdu) => pdu.name(),
            RdpdrPdu::ClientDeviceListAnnounce(pdu) => pdu.name(),
            RdpdrPdu::DeviceIoRequest(pdu) => pdu.name(),
            RdpdrPdu::DeviceIoResponse(pdu) => pdu.name(),
            RdpdrPdu::Unknown(_) => Self::NAME,
        }
    }

    fn size(&self) -> usize {
        let body_size = match self {
            RdpdrPdu::ServerAnnounceRequest(pdu)
            | RdpdrPdu::ClientAnnounceReply(pdu)
            | RdpdrPdu::ServerClientIdConfirm(pdu) => pdu.size(),
            RdpdrPdu::CoreCapability(pdu) => pdu.size(),
            RdpdrPdu::ClientDeviceListAnnounce(pdu) => pdu.size(),
            RdpdrPdu::DeviceIoRequest(pdu) => pdu.size(),
            RdpdrPdu::DeviceIoResponse(pdu) => pdu.size(),
            RdpdrPdu::Unknown(pdu) => pdu.size(),
        };

        SharedHeader::SIZE + body_size
    }
}

/// An RDPDR message the proxy does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRdpdrPdu {
    pub header: SharedHeader,
    pub data: Vec<u8>,
}

impl UnknownRdpdrPdu {
    const NAME: &'static str = "RDPDR unknown PDU";

    fn decode_with_header(src: &mut ReadCursor<'_>, header: SharedHeader) -> PduResult<Self> {
        Ok(Self {
            header,
            data: src.read_remaining().to_vec(),
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);
        Ok(())
    }

    fn size(&self) -> usize {
        self.data.len()
    }
}
