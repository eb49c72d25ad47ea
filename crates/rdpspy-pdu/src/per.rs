//! The ALIGNED BASIC-PER subset that MCS domain PDUs and the GCC conference
//! wrappers use: 1/2-byte lengths, constrained integers, enumerations,
//! octet/numeric strings and object identifiers.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduResult, PduError, PduErrorExt as _};

const CTX: &str = "PER";

pub(crate) const CHOICE_SIZE: usize = 1;
pub(crate) const ENUM_SIZE: usize = 1;
pub(crate) const U16_SIZE: usize = 2;

const OID_TUPLE_COUNT: usize = 6;

/// Reads a 1- or 2-byte length determinant; also returns how many bytes the
/// determinant itself took.
pub(crate) fn read_length(src: &mut ReadCursor<'_>) -> PduResult<(u16, usize)> {
    let first = src.try_read_u8(CTX)?;

    if first & 0x80 == 0 {
        return Ok((u16::from(first), 1));
    }

    let second = src.try_read_u8(CTX)?;
    Ok((u16::from(first & 0x7f) << 8 | u16::from(second), 2))
}

pub(crate) fn write_length(dst: &mut WriteCursor<'_>, length: u16) {
    if length < 0x80 {
        dst.write_u8(length as u8);
    } else {
        dst.write_u16_be(length | 0x8000);
    }
}

pub(crate) fn sizeof_length(length: u16) -> usize {
    if length < 0x80 {
        1
    } else {
        2
    }
}

pub(crate) fn write_choice(dst: &mut WriteCursor<'_>, choice: u8) {
    dst.write_u8(choice);
}

pub(crate) fn write_selection(dst: &mut WriteCursor<'_>, selection: u8) {
    dst.write_u8(selection);
}

pub(crate) fn write_number_of_sets(dst: &mut WriteCursor<'_>, number_of_sets: u8) {
    dst.write_u8(number_of_sets);
}

pub(crate) fn read_padding(src: &mut ReadCursor<'_>, count: usize) {
    src.advance(count);
}

pub(crate) fn write_padding(dst: &mut WriteCursor<'_>, count: usize) {
    for _ in 0..count {
        dst.write_u8(0);
    }
}

/// Unconstrained INTEGER: a length determinant followed by that many
/// big-endian value bytes (0, 1, 2 or 4 of them).
pub(crate) fn read_u32(src: &mut ReadCursor<'_>) -> PduResult<u32> {
    let (byte_count, _) = read_length(src)?;

    match byte_count {
        0 => Ok(0),
        1 => Ok(u32::from(src.try_read_u8(CTX)?)),
        2 => Ok(u32::from(src.try_read_u16_be(CTX)?)),
        4 => src.try_read_u32_be(CTX),
        _ => Err(PduError::invalid_message(CTX, "integer", "length over 4 bytes")),
    }
}

pub(crate) fn write_u32(dst: &mut WriteCursor<'_>, value: u32) {
    if value <= u32::from(u8::MAX) {
        write_length(dst, 1);
        dst.write_u8(value as u8);
    } else if value <= u32::from(u16::MAX) {
        write_length(dst, 2);
        dst.write_u16_be(value as u16);
    } else {
        write_length(dst, 4);
        dst.write_u32_be(value);
    }
}

pub(crate) fn sizeof_u32(value: u32) -> usize {
    if value <= u32::from(u8::MAX) {
        1 + 1
    } else if value <= u32::from(u16::MAX) {
        1 + 2
    } else {
        1 + 4
    }
}

/// Constrained 16-bit integer, stored as an offset from its lower bound.
pub(crate) fn read_u16(src: &mut ReadCursor<'_>, min: u16) -> PduResult<u16> {
    let offset = src.try_read_u16_be(CTX)?;

    min.checked_add(offset)
        .ok_or_else(|| PduError::invalid_message(CTX, "integer16", "out of range"))
}

pub(crate) fn write_u16(dst: &mut WriteCursor<'_>, value: u16, min: u16) -> PduResult<()> {
    let offset = value
        .checked_sub(min)
        .ok_or_else(|| PduError::invalid_message(CTX, "integer16", "below the lower bound"))?;

    dst.write_u16_be(offset);
    Ok(())
}

pub(crate) fn read_enum(src: &mut ReadCursor<'_>, variant_count: u8) -> PduResult<u8> {
    let value = src.try_read_u8(CTX)?;

    if value >= variant_count {
        return Err(PduError::invalid_message(CTX, "enumerated", "unknown variant"));
    }

    Ok(value)
}

pub(crate) fn write_enum(dst: &mut WriteCursor<'_>, value: u8) {
    dst.write_u8(value);
}

/// OBJECT_IDENTIFIER restricted to six tuples, the shape the T.124 key uses.
pub(crate) fn read_object_id(src: &mut ReadCursor<'_>) -> PduResult<[u8; OID_TUPLE_COUNT]> {
    let (byte_count, _) = read_length(src)?;
    if usize::from(byte_count) != OID_TUPLE_COUNT - 1 {
        return Err(PduError::invalid_message(CTX, "oid", "unexpected length"));
    }

    // The first two tuples share one byte.
    let packed = src.try_read_u8(CTX)?;

    let mut oid = [0u8; OID_TUPLE_COUNT];
    oid[0] = packed / 40;
    oid[1] = packed % 40;
    for tuple in &mut oid[2..] {
        *tuple = src.try_read_u8(CTX)?;
    }

    Ok(oid)
}

pub(crate) fn write_object_id(dst: &mut WriteCursor<'_>, oid: [u8; OID_TUPLE_COUNT]) {
    write_length(dst, (OID_TUPLE_COUNT - 1) as u16);

    dst.write_u8(oid[0] * 40 + oid[1]);
    dst.write_slice(&oid[2..]);
}

/// OCTET_STRING with a lower size bound; the determinant stores the excess.
pub(crate) fn read_octet_string<'a>(src: &mut ReadCursor<'a>, min: usize) -> PduResult<&'a [u8]> {
    let (excess, _) = read_length(src)?;
    src.try_read_slice(CTX, min + usize::from(excess))
}

pub(crate) fn write_octet_string(dst: &mut WriteCursor<'_>, value: &[u8], min: usize) -> PduResult<()> {
    let excess = value
        .len()
        .checked_sub(min)
        .ok_or_else(|| PduError::invalid_message(CTX, "octetString", "below the minimum size"))?;

    write_length(dst, cast_length!(CTX, "octetString", excess)?);
    dst.write_slice(value);
    Ok(())
}

/// NumericString; the digits themselves are irrelevant here, so reading just
/// skips the packed characters.
pub(crate) fn read_numeric_string(src: &mut ReadCursor<'_>, min: u16) -> PduResult<()> {
    let (excess, _) = read_length(src)?;
    let packed_len = usize::from((excess + min).div_ceil(2));

    src.try_read_slice(CTX, packed_len)?;
    Ok(())
}

pub(crate) fn write_numeric_string(dst: &mut WriteCursor<'_>, digits: &[u8], min: usize) -> PduResult<()> {
    let excess = digits
        .len()
        .checked_sub(min)
        .ok_or_else(|| PduError::invalid_message(CTX, "numericString", "below the minimum size"))?;

    write_length(dst, cast_length!(CTX, "numericString", excess)?);

    // Two 4-bit digits per byte, '0'-relative, right-padded with zero.
    for pair in digits.chunks(2) {
        let high = (pair[0] - b'0') % 10;
        let low = if let [_, second] = pair { (second - b'0') % 10 } else { 0 };

        dst.write_u8(high << 4 | low);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_round_trips_in_both_encodings() {
        for length in [0u16, 0x7f, 0x80, 0x1234, 0x7fff] {
            let mut buf = [0u8; 2];
            let mut dst = WriteCursor::new(&mut buf);
            write_length(&mut dst, length);
            let written = dst.pos();

            let mut src = ReadCursor::new(&buf[..written]);
            let (read, sizeof) = read_length(&mut src).unwrap();
            assert_eq!(read, length);
            assert_eq!(sizeof, written);
            assert_eq!(sizeof, sizeof_length(length));
        }
    }

    #[test]
    fn u16_is_offset_by_min() {
        let mut buf = [0u8; 2];
        let mut dst = WriteCursor::new(&mut buf);
        write_u16(&mut dst, 1003, 1001).unwrap();
        assert_eq!(buf, [0x00, 0x02]);

        let mut src = ReadCursor::new(&buf);
        assert_eq!(read_u16(&mut src, 1001).unwrap(), 1003);
    }

    #[test]
    fn unconstrained_integer_picks_the_smallest_width() {
        for (value, expected_size) in [(0x10u32, 2usize), (0x1000, 3), (0x10_0000, 5)] {
            let mut buf = [0u8; 5];
            let mut dst = WriteCursor::new(&mut buf);
            write_u32(&mut dst, value);
            assert_eq!(dst.pos(), expected_size);
            assert_eq!(expected_size, sizeof_u32(value));

            let mut src = ReadCursor::new(&buf[..expected_size]);
            assert_eq!(read_u32(&mut src).unwrap(), value);
        }
    }

    #[test]
    fn object_id_round_trips() {
        const OID: [u8; 6] = [0, 0, 20, 124, 0, 1];

        let mut buf = [0u8; 6];
        let mut dst = WriteCursor::new(&mut buf);
        write_object_id(&mut dst, OID);

        let mut src = ReadCursor::new(&buf);
        assert_eq!(read_object_id(&mut src).unwrap(), OID);
    }
}
