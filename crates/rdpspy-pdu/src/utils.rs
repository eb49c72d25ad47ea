//! String handling shared by the codecs: RDP mixes fixed-width UTF-16LE
//! fields, length-prefixed strings with mandatory terminators, and
//! null-terminated scans.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::PduResult;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CharacterSet {
    Ansi = 1,
    Unicode = 2,
}

impl CharacterSet {
    /// Size in bytes of one code unit (and of the null terminator).
    pub fn unit_size(self) -> usize {
        match self {
            CharacterSet::Ansi => 1,
            CharacterSet::Unicode => 2,
        }
    }
}

pub fn to_utf16_bytes(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() * 2);
    for unit in value.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

pub fn from_utf16_bytes(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16_lossy(&units)
}

/// Encoded length of `value` in bytes, excluding any null terminator.
pub fn encoded_str_len(value: &str, character_set: CharacterSet) -> u16 {
    let len = match character_set {
        CharacterSet::Ansi => value.len(),
        CharacterSet::Unicode => value.encode_utf16().count() * 2,
    };

    u16::try_from(len).unwrap_or(u16::MAX)
}

/// Reads a string of `size` bytes followed by a mandatory null terminator.
pub fn read_sized_string(src: &mut ReadCursor<'_>, size: usize, character_set: CharacterSet) -> PduResult<String> {
    const CTX: &str = "read_sized_string";

    let content = src.try_read_slice(CTX, size + character_set.unit_size())?;
    let content = &content[..size]; // terminator dropped

    let value = match character_set {
        CharacterSet::Ansi => String::from_utf8(content.to_vec())
            .map_err(|_| invalid_message_err!(CTX, "string", "not valid UTF-8"))?,
        CharacterSet::Unicode => from_utf16_bytes(content),
    };

    Ok(value.trim_end_matches('\u{0}').to_owned())
}

/// Writes `value` followed by a null terminator.
pub fn write_string_with_null_terminator(
    dst: &mut WriteCursor<'_>,
    value: &str,
    character_set: CharacterSet,
) -> PduResult<()> {
    const CTX: &str = "write_string_with_null_terminator";

    match character_set {
        CharacterSet::Ansi => {
            ensure_size!(ctx: CTX, in: dst, size: value.len() + 1);
            dst.write_slice(value.as_bytes());
            dst.write_u8(0);
        }
        CharacterSet::Unicode => {
            let encoded = to_utf16_bytes(value);
            ensure_size!(ctx: CTX, in: dst, size: encoded.len() + 2);
            dst.write_slice(&encoded);
            dst.write_u16(0);
        }
    }

    Ok(())
}

/// Reads a null-terminated string, consuming the whole input when no
/// terminator is found.
pub fn read_string_from_cursor(
    src: &mut ReadCursor<'_>,
    character_set: CharacterSet,
    read_null_terminator: bool,
) -> PduResult<String> {
    const CTX: &str = "read_string_from_cursor";

    let unit = character_set.unit_size();
    let available_units = src.len() / unit;

    // Units to consume: up to and including the terminator, or everything.
    let terminator_at = if read_null_terminator {
        src.remaining()
            .chunks_exact(unit)
            .position(|chunk| chunk.iter().all(|&byte| byte == 0))
    } else {
        None
    };
    let unit_count = terminator_at.map(|index| index + 1).unwrap_or(available_units);

    if unit_count == 0 {
        return Ok(String::new());
    }

    let content = src.try_read_slice(CTX, unit_count * unit)?;

    let value = match character_set {
        CharacterSet::Ansi => String::from_utf8(content.to_vec())
            .map_err(|_| invalid_message_err!(CTX, "string", "not valid UTF-8"))?,
        CharacterSet::Unicode => from_utf16_bytes(content),
    };

    Ok(value.trim_end_matches('\u{0}').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_helpers_round_trip() {
        let original = "C:\\Users\\victim";
        let encoded = to_utf16_bytes(original);
        assert_eq!(from_utf16_bytes(&encoded), original);
    }

    #[test]
    fn sized_string_reads_null_terminator() {
        let encoded = {
            let mut bytes = to_utf16_bytes("user");
            bytes.extend_from_slice(&[0, 0]);
            bytes
        };

        let mut src = ReadCursor::new(&encoded);
        let decoded = read_sized_string(&mut src, encoded.len() - 2, CharacterSet::Unicode).unwrap();

        assert_eq!(decoded, "user");
        assert!(src.is_empty());
    }

    #[test]
    fn cursor_string_stops_at_null() {
        let bytes = b"first\0second\0";
        let mut src = ReadCursor::new(bytes);

        assert_eq!(
            read_string_from_cursor(&mut src, CharacterSet::Ansi, true).unwrap(),
            "first"
        );
        assert_eq!(
            read_string_from_cursor(&mut src, CharacterSet::Ansi, true).unwrap(),
            "second"
        );
    }
}
