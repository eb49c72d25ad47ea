//! TPKT packet header (T.123 / RFC 1006): one version byte, one reserved
//! byte, and the big-endian length of the whole packet, header included.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::PduResult;

#[derive(PartialEq, Eq, Debug)]
pub struct TpktHeader {
    /// Length of the entire packet in octets, this header included.
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;

    pub const SIZE: usize = 1 /* version */ + 1 /* reserved */ + 2 /* length */;

    pub const NAME: &'static str = "TpktHeader";

    const FIXED_PART_SIZE: usize = Self::SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let [version, _reserved] = src.read_array();
        if version != Self::VERSION {
            return Err(unsupported_version_err!(version));
        }

        Ok(Self {
            packet_length: src.read_u16_be(),
        })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_array([Self::VERSION, 0]);
        dst.write_u16_be(self.packet_length);

        Ok(())
    }

    pub fn packet_length(&self) -> usize {
        usize::from(self.packet_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PduErrorKind;

    #[test]
    fn header_round_trips() {
        let header = TpktHeader { packet_length: 0x2a };

        let mut buf = [0u8; TpktHeader::SIZE];
        header.write(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x03, 0x00, 0x00, 0x2a]);

        let decoded = TpktHeader::read(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_version_is_rejected() {
        let err = TpktHeader::read(&mut ReadCursor::new(&[0x02, 0x00, 0x00, 0x08])).unwrap_err();
        assert!(matches!(err.kind(), PduErrorKind::UnsupportedVersion { got: 2 }));
    }
}
