//! The small BER (X.690) subset the MCS Connect-Initial / Connect-Response
//! PDUs are built from: universal SEQUENCE/INTEGER/BOOLEAN/ENUMERATED/OCTET
//! STRING encodings plus the high-tag-number application tags T.125 uses.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduError, PduErrorExt as _, PduResult};

const CTX: &str = "BER";

// Universal class identifiers, constructed bit included where it is fixed.
const ID_BOOLEAN: u8 = 0x01;
const ID_INTEGER: u8 = 0x02;
const ID_OCTET_STRING: u8 = 0x04;
const ID_ENUMERATED: u8 = 0x0A;
const ID_SEQUENCE: u8 = 0x30; // constructed
const ID_APPLICATION_BASE: u8 = 0x60; // application class, constructed
const HIGH_TAG_MARKER: u8 = 0x1F;

pub(crate) const SIZEOF_ENUMERATED: usize = 3;
pub(crate) const SIZEOF_BOOL: usize = 3;

fn expect_identifier(src: &mut ReadCursor<'_>, expected: u8, what: &'static str) -> PduResult<()> {
    let identifier = src.try_read_u8(CTX)?;
    if identifier != expected {
        return Err(PduError::invalid_message(CTX, what, "unexpected BER identifier"));
    }
    Ok(())
}

fn read_length(src: &mut ReadCursor<'_>) -> PduResult<u16> {
    let first = src.try_read_u8(CTX)?;

    if first & 0x80 == 0 {
        return Ok(u16::from(first));
    }

    match first & 0x7f {
        1 => Ok(u16::from(src.try_read_u8(CTX)?)),
        2 => src.try_read_u16_be(CTX),
        _ => Err(PduError::invalid_message(CTX, "length", "length-of-length out of range")),
    }
}

fn write_length(dst: &mut WriteCursor<'_>, length: u16) -> usize {
    if length <= 0x7f {
        dst.write_u8(length as u8);
        1
    } else if length <= 0xff {
        dst.write_array([0x81, length as u8]);
        2
    } else {
        dst.write_u8(0x82);
        dst.write_u16_be(length);
        3
    }
}

fn sizeof_length(length: u16) -> usize {
    if length <= 0x7f {
        1
    } else if length <= 0xff {
        2
    } else {
        3
    }
}

pub(crate) fn sizeof_sequence_tag(length: u16) -> usize {
    1 + sizeof_length(length)
}

pub(crate) fn sizeof_application_tag(tagnum: u8, length: u16) -> usize {
    let identifier_len = if tagnum > 0x1E { 2 } else { 1 };
    identifier_len + sizeof_length(length)
}

pub(crate) fn sizeof_octet_string(length: u16) -> usize {
    1 + sizeof_length(length) + usize::from(length)
}

pub(crate) fn sizeof_integer(value: u32) -> usize {
    // identifier + length byte + 1..4 content bytes, with a sign pad where
    // the top bit of the leading content byte would be set
    2 + match value {
        0..=0x7f => 1,
        0x80..=0x7fff => 2,
        0x8000..=0x007f_ffff => 3,
        _ => 4,
    }
}

pub(crate) fn write_sequence_tag(dst: &mut WriteCursor<'_>, length: u16) -> PduResult<usize> {
    ensure_size!(ctx: CTX, in: dst, size: sizeof_sequence_tag(length));

    dst.write_u8(ID_SEQUENCE);
    Ok(1 + write_length(dst, length))
}

pub(crate) fn read_sequence_tag(src: &mut ReadCursor<'_>) -> PduResult<u16> {
    expect_identifier(src, ID_SEQUENCE, "sequence")?;
    read_length(src)
}

pub(crate) fn write_application_tag(dst: &mut WriteCursor<'_>, tagnum: u8, length: u16) -> PduResult<usize> {
    ensure_size!(ctx: CTX, in: dst, size: sizeof_application_tag(tagnum, length));

    let identifier_len = if tagnum > 0x1E {
        // High tag numbers spill into a second identifier byte.
        dst.write_array([ID_APPLICATION_BASE | HIGH_TAG_MARKER, tagnum]);
        2
    } else {
        dst.write_u8(ID_APPLICATION_BASE | tagnum);
        1
    };

    Ok(identifier_len + write_length(dst, length))
}

pub(crate) fn read_application_tag(src: &mut ReadCursor<'_>, tagnum: u8) -> PduResult<u16> {
    if tagnum > 0x1E {
        expect_identifier(src, ID_APPLICATION_BASE | HIGH_TAG_MARKER, "application tag")?;
        let second = src.try_read_u8(CTX)?;
        if second != tagnum {
            return Err(PduError::invalid_message(CTX, "application tag", "wrong tag number"));
        }
    } else {
        expect_identifier(src, ID_APPLICATION_BASE | tagnum, "application tag")?;
    }

    read_length(src)
}

pub(crate) fn write_enumerated(dst: &mut WriteCursor<'_>, value: u8) -> PduResult<usize> {
    ensure_size!(ctx: CTX, in: dst, size: SIZEOF_ENUMERATED);

    dst.write_array([ID_ENUMERATED, 1, value]);
    Ok(SIZEOF_ENUMERATED)
}

pub(crate) fn read_enumerated(src: &mut ReadCursor<'_>, variant_count: u8) -> PduResult<u8> {
    expect_identifier(src, ID_ENUMERATED, "enumerated")?;

    if read_length(src)? != 1 {
        return Err(PduError::invalid_message(CTX, "enumerated", "unexpected content length"));
    }

    let value = src.try_read_u8(CTX)?;
    if value >= variant_count {
        return Err(PduError::invalid_message(CTX, "enumerated", "unknown variant"));
    }

    Ok(value)
}

pub(crate) fn write_bool(dst: &mut WriteCursor<'_>, value: bool) -> PduResult<usize> {
    ensure_size!(ctx: CTX, in: dst, size: SIZEOF_BOOL);

    dst.write_array([ID_BOOLEAN, 1, if value { 0xFF } else { 0x00 }]);
    Ok(SIZEOF_BOOL)
}

pub(crate) fn read_bool(src: &mut ReadCursor<'_>) -> PduResult<bool> {
    expect_identifier(src, ID_BOOLEAN, "boolean")?;

    if read_length(src)? != 1 {
        return Err(PduError::invalid_message(CTX, "boolean", "unexpected content length"));
    }

    Ok(src.try_read_u8(CTX)? != 0)
}

pub(crate) fn write_integer(dst: &mut WriteCursor<'_>, value: u32) -> PduResult<usize> {
    let total = sizeof_integer(value);
    ensure_size!(ctx: CTX, in: dst, size: total);

    dst.write_u8(ID_INTEGER);

    match total - 2 {
        1 => {
            dst.write_array([1, value as u8]);
        }
        2 => {
            dst.write_u8(2);
            dst.write_u16_be(value as u16);
        }
        3 => {
            dst.write_array([3, (value >> 16) as u8]);
            dst.write_u16_be(value as u16);
        }
        _ => {
            dst.write_u8(4);
            dst.write_u32_be(value);
        }
    }

    Ok(total)
}

pub(crate) fn read_integer(src: &mut ReadCursor<'_>) -> PduResult<u64> {
    expect_identifier(src, ID_INTEGER, "integer")?;

    match read_length(src)? {
        1 => Ok(u64::from(src.try_read_u8(CTX)?)),
        2 => Ok(u64::from(src.try_read_u16_be(CTX)?)),
        3 => {
            let high = src.try_read_u8(CTX)?;
            let low = src.try_read_u16_be(CTX)?;
            Ok(u64::from(high) << 16 | u64::from(low))
        }
        4 => Ok(u64::from(src.try_read_u32_be(CTX)?)),
        8 => {
            let high = src.try_read_u32_be(CTX)?;
            let low = src.try_read_u32_be(CTX)?;
            Ok(u64::from(high) << 32 | u64::from(low))
        }
        _ => Err(PduError::invalid_message(CTX, "integer", "unexpected content length")),
    }
}

pub(crate) fn write_octet_string_tag(dst: &mut WriteCursor<'_>, length: u16) -> PduResult<usize> {
    ensure_size!(ctx: CTX, in: dst, size: 1 + sizeof_length(length));

    dst.write_u8(ID_OCTET_STRING);
    Ok(1 + write_length(dst, length))
}

pub(crate) fn write_octet_string(dst: &mut WriteCursor<'_>, value: &[u8]) -> PduResult<usize> {
    let tag_len = write_octet_string_tag(dst, cast_length!(CTX, "octetString", value.len())?)?;

    ensure_size!(ctx: CTX, in: dst, size: value.len());
    dst.write_slice(value);

    Ok(tag_len + value.len())
}

pub(crate) fn read_octet_string_tag(src: &mut ReadCursor<'_>) -> PduResult<u16> {
    expect_identifier(src, ID_OCTET_STRING, "octetString")?;
    read_length(src)
}

pub(crate) fn read_octet_string(src: &mut ReadCursor<'_>) -> PduResult<Vec<u8>> {
    let length = usize::from(read_octet_string_tag(src)?);
    Ok(src.try_read_slice(CTX, length)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_tag_round_trips() {
        let mut buf = [0u8; 4];
        let mut dst = WriteCursor::new(&mut buf);
        let written = write_sequence_tag(&mut dst, 0x100).unwrap();
        assert_eq!(written, 4);
        assert_eq!(buf, [0x30, 0x82, 0x01, 0x00]);

        let mut src = ReadCursor::new(&buf);
        assert_eq!(read_sequence_tag(&mut src).unwrap(), 0x100);
    }

    #[test]
    fn application_tag_round_trips_with_high_tag_number() {
        let mut buf = [0u8; 8];
        let mut dst = WriteCursor::new(&mut buf);
        let written = write_application_tag(&mut dst, 0x65, 0x10).unwrap();
        assert_eq!(written, 3);
        assert_eq!(&buf[..3], [0x7F, 0x65, 0x10]);

        let mut src = ReadCursor::new(&buf[..3]);
        assert_eq!(read_application_tag(&mut src, 0x65).unwrap(), 0x10);
    }

    #[test]
    fn integer_width_tracks_the_value() {
        for (value, expected) in [(0x7fu32, 3usize), (0x7fff, 4), (0x7f_ffff, 5), (0xffff_ffff, 6)] {
            let mut buf = [0u8; 6];
            let mut dst = WriteCursor::new(&mut buf);
            let written = write_integer(&mut dst, value).unwrap();
            assert_eq!(written, expected);
            assert_eq!(written, sizeof_integer(value));

            let mut src = ReadCursor::new(&buf[..written]);
            assert_eq!(read_integer(&mut src).unwrap(), u64::from(value));
        }
    }

    #[test]
    fn bool_round_trips() {
        let mut buf = [0u8; 3];
        let mut dst = WriteCursor::new(&mut buf);
        write_bool(&mut dst, true).unwrap();
        assert_eq!(buf, [0x01, 0x01, 0xFF]);

        let mut src = ReadCursor::new(&buf);
        assert!(read_bool(&mut src).unwrap());
    }

    #[test]
    fn octet_string_round_trips() {
        let mut buf = [0u8; 8];
        let mut dst = WriteCursor::new(&mut buf);
        let written = write_octet_string(&mut dst, &[0xDE, 0xAD]).unwrap();
        assert_eq!(written, 4);

        let mut src = ReadCursor::new(&buf[..written]);
        assert_eq!(read_octet_string(&mut src).unwrap(), vec![0xDE, 0xAD]);
    }
}
