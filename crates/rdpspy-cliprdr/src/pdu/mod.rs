mod capabilities;
mod file_contents;
mod format_data;
mod format_list;

pub use capabilities::*;
pub use file_contents::*;
pub use format_data::*;
pub use format_list::*;

use bitflags::bitflags;
use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::{ensure_fixed_part_size, ensure_size, PduDecode, PduEncode, PduResult};

const MSG_TYPE_MONITOR_READY: u16 = 0x0001;
const MSG_TYPE_FORMAT_LIST: u16 = 0x0002;
const MSG_TYPE_FORMAT_LIST_RESPONSE: u16 = 0x0003;
const MSG_TYPE_FORMAT_DATA_REQUEST: u16 = 0x0004;
const MSG_TYPE_FORMAT_DATA_RESPONSE: u16 = 0x0005;
const MSG_TYPE_TEMPORARY_DIRECTORY: u16 = 0x0006;
const MSG_TYPE_CAPABILITIES: u16 = 0x0007;
const MSG_TYPE_FILE_CONTENTS_REQUEST: u16 = 0x0008;
const MSG_TYPE_FILE_CONTENTS_RESPONSE: u16 = 0x0009;
const MSG_TYPE_LOCK_CLIPDATA: u16 = 0x000A;
const MSG_TYPE_UNLOCK_CLIPDATA: u16 = 0x000B;

/// CF_UNICODETEXT, the format the clipboard stealer asks for.
pub const FORMAT_ID_UNICODE_TEXT: u32 = 13;
pub const FORMAT_ID_TEXT: u32 = 1;

/// Header without message type included
pub(crate) struct PartialHeader {
    pub message_flags: ClipboardPduFlags,
    pub data_length: u32,
}

impl PartialHeader {
    const NAME: &'static str = "CLIPRDR_HEADER";

    const FIXED_PART_SIZE: usize = 2 /* msgFlags */ + 4 /* dataLen */;

    pub(crate) const SIZE: usize = Self::FIXED_PART_SIZE;

    pub(crate) fn new(data_length: u32) -> Self {
        Self::new_with_flags(data_length, ClipboardPduFlags::empty())
    }

    pub(crate) fn new_with_flags(data_length: u32, message_flags: ClipboardPduFlags) -> Self {
        Self {
            message_flags,
            data_length,
        }
    }

    pub(crate) fn data_length(&self) -> usize {
        self.data_length as usize
    }
}

impl<'de> PduDecode<'de> for PartialHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let message_flags = ClipboardPduFlags::from_bits_truncate(src.read_u16());
        let data_length = src.read_u32();

        Ok(Self {
            message_flags,
            data_length,
        })
    }
}

impl PduEncode for PartialHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.message_flags.bits());
        dst.write_u32(self.data_length);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

/// Clipboard channel message PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPdu {
    MonitorReady,
    FormatList(FormatList),
    FormatListResponse(FormatListResponse),
    FormatDataRequest(FormatDataRequest),
    FormatDataResponse(FormatDataResponse),
    TemporaryDirectory(ClientTemporaryDirectory),
    Capabilities(Capabilities),
    FileContentsRequest(FileContentsRequest),
    FileContentsResponse(FileContentsResponse),
    LockData(LockDataId),
    UnlockData(LockDataId),
    /// A message type the proxy does not model; forwarded verbatim.
    Unknown(UnknownClipboardPdu),
}

impl ClipboardPdu {
    const NAME: &'static str = "ClipboardPdu";

    const FIXED_PART_SIZE: usize = 2 /* msgType */;
}

impl PduEncode for ClipboardPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        let write_empty_pdu = |dst: &mut WriteCursor<'_>| PartialHeader::new(0).encode(dst);

        match self {
            ClipboardPdu::MonitorReady => {
                dst.write_u16(MSG_TYPE_MONITOR_READY);
                write_empty_pdu(dst)
            }
            ClipboardPdu::FormatList(pdu) => {
                dst.write_u16(MSG_TYPE_FORMAT_LIST);
                pdu.encode(dst)
            }
            ClipboardPdu::FormatListResponse(pdu) => {
                dst.write_u16(MSG_TYPE_FORMAT_LIST_RESPONSE);
                pdu.encode(dst)
            }
            ClipboardPdu::FormatDataRequest(pdu) => {
                dst.write_u16(MSG_TYPE_FORMAT_DATA_REQUEST);
                pdu.encode(dst)
            }
            ClipboardPdu::FormatDataResponse(pdu) => {
                dst.write_u16(MSG_TYPE_FORMAT_DATA_RESPONSE);
                pdu.encode(dst)
            }
            ClipboardPdu::TemporaryDirectory(pdu) => {
                dst.write_u16(MSG_TYPE_TEMPORARY_DIRECTORY);
                pdu.encode(dst)
            }
            ClipboardPdu::Capabilities(pdu) => {
                dst.write_u16(MSG_TYPE_CAPABILITIES);
                pdu.encode(dst)
            }
            ClipboardPdu::FileContentsRequest(pdu) => {
                dst.write_u16(MSG_TYPE_FILE_CONTENTS_REQUEST);
                pdu.encode(dst)
            }
            ClipboardPdu::FileContentsResponse(pdu) => {
                dst.write_u16(MSG_TYPE_FILE_CONTENTS_RESPONSE);
                pdu.encode(dst)
            }
            ClipboardPdu::LockData(pdu) => {
                dst.write_u16(MSG_TYPE_LOCK_CLIPDATA);
                pdu.encode(dst)
            }
            ClipboardPdu::UnlockData(pdu) => {
                dst.write_u16(MSG_TYPE_UNLOCK_CLIPDATA);
                pdu.encode(dst)
            }
            ClipboardPdu::Unknown(pdu) => {
                dst.write_u16(pdu.message_type);
                pdu.encode(dst)
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let body_size = match self {
            ClipboardPdu::MonitorReady => PartialHeader::SIZE,
            ClipboardPdu::FormatList(pdu) => pdu.size(),
            ClipboardPdu::FormatListResponse(pdu) => pdu.size(),
            ClipboardPdu::FormatDataRequest(pdu) => pdu.size(),
            ClipboardPdu::FormatDataResponse(pdu) => pdu.size(),
            ClipboardPdu::TemporaryDirectory(pdu) => pdu.size(),
            ClipboardPdu::Capabilities(pdu) => pdu.size(),
            ClipboardPdu::FileContentsRequest(pdu) => pdu.size(),
            ClipboardPdu::FileContentsResponse(pdu) => pdu.size(),
            ClipboardPdu::LockData(pdu) => pdu.size(),
            ClipboardPdu::UnlockData(pdu) => pdu.size(),
            ClipboardPdu::Unknown(pdu) => pdu.size(),
        };

        Self::FIXED_PART_SIZE + body_size
    }
}

impl<'de> PduDecode<'de> for ClipboardPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let message_type = src.read_u16();

        let pdu = match message_type {
            MSG_TYPE_MONITOR_READY => {
                let _header = PartialHeader::decode(src)?;
                ClipboardPdu::MonitorReady
            }
            MSG_TYPE_FORMAT_LIST => ClipboardPdu::FormatList(FormatList::decode(src)?),
            MSG_TYPE_FORMAT_LIST_RESPONSE => ClipboardPdu::FormatListResponse(FormatListResponse::decode(src)?),
            MSG_TYPE_FORMAT_DATA_REQUEST => ClipboardPdu::FormatDataRequest(FormatDataRequest::decode(src)?),
            MSG_TYPE_FORMAT_DATA_RESPONSE => ClipboardPdu::FormatDataResponse(FormatDataResponse::decode(src)?),
            MSG_TYPE_TEMPORARY_DIRECTORY => ClipboardPdu::TemporaryDirectory(ClientTemporaryDirectory::decode(src)?),
            MSG_TYPE_CAPABILITIES => ClipboardPdu::Capabilities(Capabilities::decode(src)?),
            MSG_TYPE_FILE_CONTENTS_REQUEST => ClipboardPdu::FileContentsRequest(FileContentsRequest::decode(src)?),
            MSG_TYPE_FILE_CONTENTS_RESPONSE => ClipboardPdu::FileContentsResponse(FileContentsResponse::decode(src)?),
            MSG_TYPE_LOCK_CLIPDATA => ClipboardPdu::LockData(LockDataId::decode(src)?),
            MSG_TYPE_UNLOCK_CLIPDATA => ClipboardPdu::UnlockData(LockDataId::decode(src)?),
            _ => ClipboardPdu::Unknown(UnknownClipboardPdu::decode_with_type(src, message_type)?),
        };

        Ok(pdu)
    }
}

/// Represents `CLIPRDR_TEMP_DIRECTORY`, kept as the raw 520-byte path block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTemporaryDirectory {
    path: Vec<u8>,
}

impl ClientTemporaryDirectory {
    const NAME: &'static str = "CLIPRDR_TEMP_DIRECTORY";

    const PATH_SIZE: usize = 520;
}

impl PduEncode for ClientTemporaryDirectory {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        PartialHeader::new(Self::PATH_SIZE as u32).encode(dst)?;
        dst.write_slice(&self.path);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + Self::PATH_SIZE
    }
}

impl<'de> PduDecode<'de> for ClientTemporaryDirectory {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let _header = PartialHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: Self::PATH_SIZE);
        let path = src.read_slice(Self::PATH_SIZE).to_vec();

        Ok(Self { path })
    }
}

/// Represents `CLIPRDR_LOCK_CLIPDATA`/`CLIPRDR_UNLOCK_CLIPDATA`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockDataId(pub u32);

impl LockDataId {
    const NAME: &'static str = "CLIPRDR_LOCK_CLIPDATA";
}

impl PduEncode for LockDataId {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        PartialHeader::new(4).encode(dst)?;
        dst.write_u32(self.0);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + 4
    }
}

impl<'de> PduDecode<'de> for LockDataId {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let _header = PartialHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: 4);

        Ok(Self(src.read_u32()))
    }
}

/// An unmodelled clipboard message, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownClipboardPdu {
    pub message_type: u16,
    pub message_flags: ClipboardPduFlags,
    pub data: Vec<u8>,
}

impl UnknownClipboardPdu {
    const NAME: &'static str = "CLIPRDR unknown PDU";

    fn decode_with_type(src: &mut ReadCursor<'_>, message_type: u16) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: header.data_length());
        let data = src.read_slice(header.data_length()).to_vec();

        Ok(Self {
            message_type,
            message_flags: header.message_flags,
            data,
        })
    }
}

impl PduEncode for UnknownClipboardPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let header = PartialHeader::new_with_flags(self.data.len() as u32, self.message_flags);
        header.encode(dst)?;
        dst.write_slice(&self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + self.data.len()
    }
}

bitflags! {
    /// Represents `msgFlags` field of `CLIPRDR_HEADER` structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClipboardPduFlags: u16 {
        /// Used by the Format List Response PDU, Format Data Response PDU, and File
        /// Contents Response PDU to indicate that the associated request was processed
        /// successfully
        const RESPONSE_OK = 0x0001;
        /// Used by the Format List Response PDU, Format Data Response PDU, and File
        /// Contents Response PDU to indicate that the associated request was not
        /// processed successfully
        const RESPONSE_FAIL = 0x0002;
        /// Used by the Short Format Name variant of the Format List Response PDU to
        /// indicate that the format names are in ASCII 8
        const ASCII_NAMES = 0x0004;
    }
}
