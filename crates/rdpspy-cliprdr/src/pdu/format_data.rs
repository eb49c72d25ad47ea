use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::utils::{from_utf16_bytes, to_utf16_bytes};
use rdpspy_pdu::{ensure_size, PduDecode, PduEncode, PduResult};

use super::{ClipboardPduFlags, PartialHeader};

/// Represents `CLIPRDR_FORMAT_DATA_REQUEST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDataRequest {
    pub format_id: u32,
}

impl FormatDataRequest {
    const NAME: &'static str = "CLIPRDR_FORMAT_DATA_REQUEST";

    const FIXED_PART_SIZE: usize = 4 /* requestedFormatId */;
}

impl PduEncode for FormatDataRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        PartialHeader::new(Self::FIXED_PART_SIZE as u32).encode(dst)?;
        dst.write_u32(self.format_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for FormatDataRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let _header = PartialHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);
        let format_id = src.read_u32();

        Ok(Self { format_id })
    }
}

/// Represents `CLIPRDR_FORMAT_DATA_RESPONSE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDataResponse {
    pub is_error: bool,
    pub data: Vec<u8>,
}

impl FormatDataResponse {
    const NAME: &'static str = "CLIPRDR_FORMAT_DATA_RESPONSE";

    pub fn new_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            is_error: false,
            data: data.into(),
        }
    }

    pub fn new_error() -> Self {
        Self {
            is_error: true,
            data: Vec::new(),
        }
    }

    /// Builds a response carrying CF_UNICODETEXT payload.
    pub fn new_unicode_string(value: &str) -> Self {
        let mut data = to_utf16_bytes(value);
        data.extend_from_slice(&[0, 0]);

        Self { is_error: false, data }
    }

    /// Interprets the payload as CF_UNICODETEXT.
    pub fn to_unicode_string(&self) -> String {
        from_utf16_bytes(&self.data).trim_end_matches('\u{0}').to_owned()
    }
}

impl PduEncode for FormatDataResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let flags = if self.is_error {
            ClipboardPduFlags::RESPONSE_FAIL
        } else {
            ClipboardPduFlags::RESPONSE_OK
        };

        PartialHeader::new_with_flags(self.data.len() as u32, flags).encode(dst)?;
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

impl<'de> PduDecode<'de> for FormatDataResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        let is_error = header.message_flags.contains(ClipboardPduFlags::RESPONSE_FAIL);

        ensure_size!(ctx: Self::NAME, in: src, size: header.data_length());
        let data = src.read_slice(header.data_length()).to_vec();

        Ok(Self { is_error, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::ClipboardPdu;
    use rdpspy_pdu::{decode, encode_vec};

    #[test]
    fn data_request_round_trips() {
        let pdu = ClipboardPdu::FormatDataRequest(FormatDataRequest {
            format_id: super::super::FORMAT_ID_UNICODE_TEXT,
        });

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x04, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0D, 0x00, 0x00, 0x00]);

        let decoded: ClipboardPdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn unicode_response_decodes_back_to_text() {
        let response = FormatDataResponse::new_unicode_string("hello");
        assert_eq!(response.to_unicode_string(), "hello");

        let pdu = ClipboardPdu::FormatDataResponse(response);
        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ClipboardPdu = decode(&encoded).unwrap();

        match decoded {
            ClipboardPdu::FormatDataResponse(response) => {
                assert!(!response.is_error);
                assert_eq!(response.to_unicode_string(), "hello");
            }
            other => panic!("unexpected pdu: {other:?}"),
        }
    }
}
