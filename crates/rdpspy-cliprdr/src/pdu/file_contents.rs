use bitflags::bitflags;
use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::{ensure_size, invalid_message_err, PduDecode, PduEncode, PduResult};

use super::{ClipboardPduFlags, PartialHeader};

bitflags! {
    /// Represents `dwFlags` field of `CLIPRDR_FILECONTENTS_REQUEST` structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FileContentsFlags: u32 {
        const SIZE = 0x0000_0001;
        const DATA = 0x0000_0002;
    }
}

/// Represents `CLIPRDR_FILECONTENTS_REQUEST`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsRequest {
    pub stream_id: u32,
    pub index: u32,
    pub flags: FileContentsFlags,
    pub position: u64,
    pub requested_size: u32,
    pub data_id: Option<u32>,
}

impl FileContentsRequest {
    const NAME: &'static str = "CLIPRDR_FILECONTENTS_REQUEST";

    const FIXED_PART_SIZE: usize = 4 /* streamId */ + 4 /* lindex */ + 4 /* dwFlags */
        + 8 /* nPosition */ + 4 /* cbRequested */;

    fn inner_size(&self) -> usize {
        let data_id_size = match self.data_id {
            Some(_) => 4,
            None => 0,
        };

        Self::FIXED_PART_SIZE + data_id_size
    }
}

impl PduEncode for FileContentsRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        PartialHeader::new(self.inner_size() as u32).encode(dst)?;

        dst.write_u32(self.stream_id);
        dst.write_u32(self.index);
        dst.write_u32(self.flags.bits());
        dst.write_u32(self.position as u32);
        dst.write_u32((self.position >> 32) as u32);
        dst.write_u32(self.requested_size);

        if let Some(data_id) = self.data_id {
            dst.write_u32(data_id);
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

impl<'de> PduDecode<'de> for FileContentsRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        let data_id_present = match header.data_length() {
            24 => false,
            28 => true,
            _ => {
                return Err(invalid_message_err!(
                    Self::NAME,
                    "dataLen",
                    "invalid file contents request size"
                ))
            }
        };

        ensure_size!(ctx: Self::NAME, in: src, size: header.data_length());

        let stream_id = src.read_u32();
        let index = src.read_u32();
        let flags = FileContentsFlags::from_bits_truncate(src.read_u32());
        let position_lo = src.read_u32();
        let position_hi = src.read_u32();
        let position = u64::from(position_lo) | (u64::from(position_hi) << 32);
        let requested_size = src.read_u32();

        let data_id = if data_id_present { Some(src.read_u32()) } else { None };

        Ok(Self {
            stream_id,
            index,
            flags,
            position,
            requested_size,
            data_id,
        })
    }
}

/// Represents `CLIPRDR_FILECONTENTS_RESPONSE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsResponse {
    pub is_error: bool,
    pub stream_id: u32,
    pub data: Vec<u8>,
}

impl FileContentsResponse {
    const NAME: &'static str = "CLIPRDR_FILECONTENTS_RESPONSE";

    const FIXED_PART_SIZE: usize = 4 /* streamId */;
}

impl PduEncode for FileContentsResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let flags = if self.is_error {
            ClipboardPduFlags::RESPONSE_FAIL
        } else {
            ClipboardPduFlags::RESPONSE_OK
        };

        PartialHeader::new_with_flags((Self::FIXED_PART_SIZE + self.data.len()) as u32, flags).encode(dst)?;

        dst.write_u32(self.stream_id);
        dst.write_slice(&self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + Self::FIXED_PART_SIZE + self.data.len()
    }
}

impl<'de> PduDecode<'de> for FileContentsResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        let is_error = header.message_flags.contains(ClipboardPduFlags::RESPONSE_FAIL);

        let Some(data_length) = header.data_length().checked_sub(Self::FIXED_PART_SIZE) else {
            return Err(invalid_message_err!(Self::NAME, "dataLen", "missing stream id"));
        };

        ensure_size!(ctx: Self::NAME, in: src, size: header.data_length());

        let stream_id = src.read_u32();
        let data = src.read_slice(data_length).to_vec();

        Ok(Self {
            is_error,
            stream_id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::ClipboardPdu;
    use rdpspy_pdu::{decode, encode_vec};

    #[test]
    fn file_contents_request_round_trips() {
        let pdu = ClipboardPdu::FileContentsRequest(FileContentsRequest {
            stream_id: 7,
            index: 0,
            flags: FileContentsFlags::DATA,
            position: 0x1_0000_0000,
            requested_size: 4096,
            data_id: Some(2),
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ClipboardPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn file_contents_response_round_trips() {
        let pdu = ClipboardPdu::FileContentsResponse(FileContentsResponse {
            is_error: false,
            stream_id: 7,
            data: vec![0x01, 0x02, 0x03],
        });

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ClipboardPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
