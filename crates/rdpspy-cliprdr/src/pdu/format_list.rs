use rdpspy_pdu::cursor::{ReadCursor, WriteCursor};
use rdpspy_pdu::utils::{read_string_from_cursor, to_utf16_bytes, write_string_with_null_terminator, CharacterSet};
use rdpspy_pdu::{ensure_size, PduDecode, PduEncode, PduResult};

use super::{ClipboardPduFlags, PartialHeader};

/// Represents `CLIPRDR_SHORT_FORMAT_NAME` and `CLIPRDR_LONG_FORMAT_NAME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardFormat {
    pub id: u32,
    pub name: String,
}

/// Represents `CLIPRDR_FORMAT_LIST`
///
/// The short/long wire layout of the format names depends on the negotiated
/// capabilities, which this layer does not know, so the encoded name block is
/// carried as bytes and interpreted on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatList {
    use_ascii: bool,
    encoded_formats: Vec<u8>,
}

impl FormatList {
    const NAME: &'static str = "CLIPRDR_FORMAT_LIST";

    // `CLIPRDR_SHORT_FORMAT_NAME` size
    const SHORT_FORMAT_SIZE: usize = 4 + 32;

    fn new_impl(formats: &[ClipboardFormat], use_long_format: bool, use_ascii: bool) -> PduResult<Self> {
        let charset = if use_ascii {
            CharacterSet::Ansi
        } else {
            CharacterSet::Unicode
        };

        if use_long_format {
            let mut buffer = Vec::with_capacity(formats.len() * 8);

            for format in formats {
                let encoded_string = match charset {
                    CharacterSet::Ansi => {
                        let mut str_buffer = format.name.as_bytes().to_vec();
                        str_buffer.push(b'\0');
                        str_buffer
                    }
                    CharacterSet::Unicode => {
                        let mut str_buffer = to_utf16_bytes(&format.name);
                        str_buffer.push(b'\0');
                        str_buffer.push(b'\0');
                        str_buffer
                    }
                };

                buffer.extend_from_slice(&format.id.to_le_bytes());
                buffer.extend_from_slice(&encoded_string);
            }

            Ok(Self {
                use_ascii,
                encoded_formats: buffer,
            })
        } else {
            let mut buffer = vec![0u8; Self::SHORT_FORMAT_SIZE * formats.len()];
            for (idx, format) in formats.iter().enumerate() {
                let mut cursor = WriteCursor::new(&mut buffer[idx * Self::SHORT_FORMAT_SIZE..]);
                cursor.write_u32(format.id);
                write_string_with_null_terminator(&mut cursor, &format.name, charset)?;
            }

            Ok(Self {
                use_ascii,
                encoded_formats: buffer,
            })
        }
    }

    pub fn new_unicode(formats: &[ClipboardFormat], use_long_format: bool) -> PduResult<Self> {
        Self::new_impl(formats, use_long_format, false)
    }

    pub fn new_ascii(formats: &[ClipboardFormat], use_long_format: bool) -> PduResult<Self> {
        Self::new_impl(formats, use_long_format, true)
    }

    pub fn get_formats(&self, use_long_format: bool) -> PduResult<Vec<ClipboardFormat>> {
        let mut src = ReadCursor::new(self.encoded_formats.as_slice());
        let charset = if self.use_ascii {
            CharacterSet::Ansi
        } else {
            CharacterSet::Unicode
        };

        if use_long_format {
            // Minimal `CLIPRDR_LONG_FORMAT_NAME` size (id + null terminator)
            const MINIMAL_FORMAT_SIZE: usize = 4 + 2;

            let mut formats = Vec::with_capacity(16);

            while src.len() >= MINIMAL_FORMAT_SIZE {
                let id = src.read_u32();
                let name = read_string_from_cursor(&mut src, charset, true)?;

                formats.push(ClipboardFormat { id, name });
            }

            Ok(formats)
        } else {
            let mut formats = Vec::with_capacity(self.encoded_formats.len() / Self::SHORT_FORMAT_SIZE);

            while src.len() >= Self::SHORT_FORMAT_SIZE {
                let id = src.read_u32();
                let name_block = src.read_slice(Self::SHORT_FORMAT_SIZE - 4);

                let mut name_cursor = ReadCursor::new(name_block);
                let name = read_string_from_cursor(&mut name_cursor, charset, true)?;

                formats.push(ClipboardFormat { id, name });
            }

            Ok(formats)
        }
    }

    /// Format ids without the names, regardless of the long/short layout.
    ///
    /// The long layout parse is attempted first; a short-form list decodes as
    /// long-form garbage names but the ids survive only in the short parse,
    /// so callers that only filter by id should try both. The stealer uses
    /// the capability-negotiated layout through `get_formats`.
    pub fn raw(&self) -> &[u8] {
        &self.encoded_formats
    }
}

impl PduEncode for FormatList {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let flags = if self.use_ascii {
            ClipboardPduFlags::ASCII_NAMES
        } else {
            ClipboardPduFlags::empty()
        };

        let header = PartialHeader::new_with_flags(self.encoded_formats.len() as u32, flags);
        header.encode(dst)?;

        dst.write_slice(&self.encoded_formats);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE + self.encoded_formats.len()
    }
}

impl<'de> PduDecode<'de> for FormatList {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        let use_ascii = header.message_flags.contains(ClipboardPduFlags::ASCII_NAMES);

        ensure_size!(ctx: Self::NAME, in: src, size: header.data_length());
        let encoded_formats = src.read_slice(header.data_length()).to_vec();

        Ok(Self {
            use_ascii,
            encoded_formats,
        })
    }
}

/// Represents `CLIPRDR_FORMAT_LIST_RESPONSE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatListResponse {
    Ok,
    Fail,
}

impl FormatListResponse {
    const NAME: &'static str = "CLIPRDR_FORMAT_LIST_RESPONSE";
}

impl PduEncode for FormatListResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let flags = match self {
            FormatListResponse::Ok => ClipboardPduFlags::RESPONSE_OK,
            FormatListResponse::Fail => ClipboardPduFlags::RESPONSE_FAIL,
        };

        PartialHeader::new_with_flags(0, flags).encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        PartialHeader::SIZE
    }
}

impl<'de> PduDecode<'de> for FormatListResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = PartialHeader::decode(src)?;

        if header.message_flags.contains(ClipboardPduFlags::RESPONSE_FAIL) {
            Ok(FormatListResponse::Fail)
        } else {
            Ok(FormatListResponse::Ok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::ClipboardPdu;
    use rdpspy_pdu::{decode, encode_vec};

    #[test]
    fn long_format_list_round_trips() {
        let formats = vec![
            ClipboardFormat {
                id: super::super::FORMAT_ID_UNICODE_TEXT,
                name: String::new(),
            },
            ClipboardFormat {
                id: 0xC004,
                name: "Rich Text Format".to_owned(),
            },
        ];

        let list = FormatList::new_unicode(&formats, true).unwrap();
        let pdu = ClipboardPdu::FormatList(list.clone());

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded: ClipboardPdu = decode(&encoded).unwrap();
        match decoded {
            ClipboardPdu::FormatList(decoded_list) => {
                assert_eq!(decoded_list.get_formats(true).unwrap(), formats);
            }
            other => panic!("unexpected pdu: {other:?}"),
        }
    }

    #[test]
    fn short_format_list_round_trips() {
        let formats = vec![ClipboardFormat {
            id: 1,
            name: "text".to_owned(),
        }];

        let list = FormatList::new_ascii(&formats, false).unwrap();
        let parsed = list.get_formats(false).unwrap();

        assert_eq!(parsed, formats);
    }
}
