//! Fast-path framing (TS_FP_UPDATE_PDU and TS_FP_INPUT_PDU headers).
//!
//! The proxy re-frames fast-path traffic (possibly decrypting and
//! re-encrypting the payload) without interpreting the events themselves, so
//! only the headers are modelled; event payloads stay opaque.
//!
//! The first byte packs the action (bits 0..2, zero for fast path), the
//! input event count (bits 2..6, input direction only) and the encryption
//! flags (bits 6..8). A 1- or 2-byte PER length covering the whole frame
//! follows.

use bitflags::bitflags;

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{per, PduDecode, PduEncode, PduResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

const FLAGS_SHIFT: u8 = 6;
const EVENT_COUNT_SHIFT: u8 = 2;
const EVENT_COUNT_BITS: u8 = 0x0F;

/// Total frame size for a payload following the length field, picking the
/// short or long length form.
fn framed_size(payload_len: usize) -> usize {
    let with_short_length = 1 /* header */ + 1 /* length */ + payload_len;
    if with_short_length > 0x7f {
        with_short_length + 1 // long length form
    } else {
        with_short_length
    }
}

/// TS_FP_UPDATE_PDU header (server to client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    /// A peer may use the 2-byte length form even when the short one would
    /// do; remembered so re-encoding preserves the exact framing.
    wide_length_form: bool,
}

impl FastPathHeader {
    const NAME: &'static str = "TS_FP_UPDATE_PDU header";

    pub fn new(flags: EncryptionFlags, data_length: usize) -> Self {
        Self {
            flags,
            data_length,
            wide_length_form: false,
        }
    }
}

impl PduEncode for FastPathHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(self.flags.bits() << FLAGS_SHIFT);

        let frame_len: u16 = cast_length!("length", self.data_length + self.size())?;

        if self.wide_length_form {
            dst.write_u16_be(frame_len | 0x8000);
        } else {
            per::write_length(dst, frame_len);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        if self.wide_length_form {
            1 + 2
        } else {
            framed_size(self.data_length) - self.data_length
        }
    }
}

impl<'de> PduDecode<'de> for FastPathHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let packed = src.try_read_u8(Self::NAME)?;
        let flags = EncryptionFlags::from_bits_truncate(packed >> FLAGS_SHIFT);

        let (frame_len, length_field_size) = per::read_length(src)?;

        let header_size = 1 + length_field_size;
        let data_length = usize::from(frame_len)
            .checked_sub(header_size)
            .ok_or_else(|| invalid_message_err!("length", "frame shorter than its header"))?;

        Ok(Self {
            flags,
            data_length,
            wide_length_form: length_field_size == 2 && frame_len < 0x80,
        })
    }
}

/// TS_FP_INPUT_PDU header (client to server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInputHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    pub num_events: u8,
}

impl FastPathInputHeader {
    const NAME: &'static str = "TS_FP_INPUT_PDU header";

    /// Counts above 15 do not fit the header byte and spill into a
    /// dedicated byte after the length.
    fn spilled_count_len(&self) -> usize {
        usize::from(self.num_events > EVENT_COUNT_BITS)
    }
}

impl PduEncode for FastPathInputHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        let packed_count = if self.num_events <= EVENT_COUNT_BITS {
            self.num_events
        } else {
            0
        };
        dst.write_u8(self.flags.bits() << FLAGS_SHIFT | packed_count << EVENT_COUNT_SHIFT);

        let frame_len: u16 = cast_length!("length", self.data_length + self.size())?;
        per::write_length(dst, frame_len);

        if self.num_events > EVENT_COUNT_BITS {
            dst.write_u8(self.num_events);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        framed_size(self.data_length + self.spilled_count_len()) - self.data_length
    }
}

impl<'de> PduDecode<'de> for FastPathInputHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let packed = src.try_read_u8(Self::NAME)?;
        let flags = EncryptionFlags::from_bits_truncate(packed >> FLAGS_SHIFT);
        let packed_count = packed >> EVENT_COUNT_SHIFT & EVENT_COUNT_BITS;

        let (frame_len, length_field_size) = per::read_length(src)?;

        // A zero packed count means the real one follows the length field.
        let (num_events, spilled) = if packed_count == 0 {
            (src.try_read_u8(Self::NAME)?, 1)
        } else {
            (packed_count, 0)
        };

        let header_size = 1 + length_field_size + spilled;
        let data_length = usize::from(frame_len)
            .checked_sub(header_size)
            .ok_or_else(|| invalid_message_err!("length", "frame shorter than its header"))?;

        Ok(Self {
            flags,
            data_length,
            num_events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn output_header_with_short_length_round_trips() {
        let header = FastPathHeader::new(EncryptionFlags::empty(), 6);

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded, [0x00, 0x08]);

        let decoded: FastPathHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn output_header_with_long_length_round_trips() {
        let header = FastPathHeader::new(EncryptionFlags::ENCRYPTED, 0x200);

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded.len(), 3);
        assert_eq!(encoded[0], 0x80); // encrypted flag in bits 6..8

        let decoded: FastPathHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn non_optimal_length_packing_is_preserved() {
        // Long-form length for a frame that would fit the short form.
        let bytes = [0x00, 0x80, 0x08];

        let decoded: FastPathHeader = decode(&bytes).unwrap();
        assert_eq!(decoded.data_length, 8 - 2 - 1);

        let reencoded = encode_vec(&decoded).unwrap();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn input_header_carries_event_count() {
        let header = FastPathInputHeader {
            flags: EncryptionFlags::empty(),
            data_length: 10,
            num_events: 3,
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!((encoded[0] >> 2) & 0x0F, 3);

        let decoded: FastPathInputHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn input_header_with_many_events_uses_extra_byte() {
        let header = FastPathInputHeader {
            flags: EncryptionFlags::empty(),
            data_length: 100,
            num_events: 20,
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded.len(), 3);

        let decoded: FastPathInputHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }
}
