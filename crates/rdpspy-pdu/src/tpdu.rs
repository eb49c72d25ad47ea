//! X.224 class-0 TPDU headers.
//!
//! Every TPDU starts with a length indicator (the header length excluding
//! the LI byte itself) and a code byte. Data TPDUs follow with a single EOT
//! byte; the connection-management TPDUs instead carry DST-REF, SRC-REF and
//! the class byte, all zero for class 0.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::PduResult;

const EOT: u8 = 0x80;

/// TPDU code byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TpduCode(u8);

impl TpduCode {
    pub const CONNECTION_REQUEST: Self = Self(0xE0);
    pub const CONNECTION_CONFIRM: Self = Self(0xD0);
    pub const DISCONNECT_REQUEST: Self = Self(0x80);
    pub const DATA: Self = Self(0xF0);
    pub const ERROR: Self = Self(0x70);

    /// Header size for this code, LI byte included.
    pub fn header_fixed_part_size(self) -> usize {
        if self == TpduCode::DATA {
            TpduHeader::DATA_FIXED_PART_SIZE
        } else {
            TpduHeader::NOT_DATA_FIXED_PART_SIZE
        }
    }

    pub fn check_expected(self, expected: TpduCode) -> PduResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(unexpected_message_type_err!(TpduHeader::NAME, self.0))
        }
    }
}

impl From<u8> for TpduCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<TpduCode> for u8 {
    fn from(value: TpduCode) -> Self {
        value.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TpduHeader {
    /// Length indicator: header length in octets, parameters included,
    /// excluding the LI byte itself and any user data.
    pub li: u8,
    pub code: TpduCode,
}

impl TpduHeader {
    pub const DATA_FIXED_PART_SIZE: usize = 1 /* LI */ + 1 /* code */ + 1 /* EOT */;

    pub const NOT_DATA_FIXED_PART_SIZE: usize = 1 /* LI */ + 1 /* code */ + 2 /* DST-REF */ + 2 /* SRC-REF */ + 1 /* class */;

    pub const NAME: &'static str = "TpduHeader";

    const FIXED_PART_SIZE: usize = Self::DATA_FIXED_PART_SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let [li, code] = src.read_array();
        let code = TpduCode::from(code);

        // LI = 255 is reserved for protocol extensions.
        if li == u8::MAX {
            return Err(invalid_message_err!("li", "reserved length indicator"));
        }

        let fixed = code.header_fixed_part_size();
        if usize::from(li) + 1 < fixed {
            return Err(invalid_message_err!("li", "shorter than the fixed header part"));
        }

        // Data TPDUs: EOT. Everything else: DST-REF, SRC-REF, class 0.
        ensure_size!(in: src, size: fixed - 2);
        read_padding!(src, fixed - 2);

        Ok(Self { li, code })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.code.header_fixed_part_size());

        dst.write_array([self.li, u8::from(self.code)]);

        if self.code == TpduCode::DATA {
            dst.write_u8(EOT);
        } else {
            write_padding!(dst, 4); // DST-REF, SRC-REF
            dst.write_u8(0); // class 0
        }

        Ok(())
    }

    /// Fixed part of the TPDU header.
    pub fn fixed_part_size(&self) -> usize {
        self.code.header_fixed_part_size()
    }

    /// Variable part of the TPDU header.
    pub fn variable_part_size(&self) -> usize {
        self.size() - self.fixed_part_size()
    }

    /// Size of the whole TPDU header, LI field and variable part included.
    pub fn size(&self) -> usize {
        usize::from(self.li) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_round_trips() {
        let header = TpduHeader {
            li: 2,
            code: TpduCode::DATA,
        };

        let mut buf = [0u8; TpduHeader::DATA_FIXED_PART_SIZE];
        header.write(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x02, 0xF0, 0x80]);

        let decoded = TpduHeader::read(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.variable_part_size(), 0);
    }

    #[test]
    fn too_small_length_indicator_is_rejected() {
        // LI of 2 cannot cover a connection request's fixed part.
        let bytes = [0x02, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(TpduHeader::read(&mut ReadCursor::new(&bytes)).is_err());
    }
}
