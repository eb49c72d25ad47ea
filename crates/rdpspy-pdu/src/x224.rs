//! Binding of PDUs to X.224 TPDUs.
//!
//! The TPKT framing lives one layer below and is handled there; everything
//! in this module encodes or decodes a TPDU header plus its body.

use crate::cursor::{ReadCursor, WriteCursor};
use crate::tpdu::{TpduCode, TpduHeader};
use crate::{PduDecode, PduEncode, PduResult};

/// A PDU carried in an X.224 TPDU.
///
/// Implementors describe their TPDU code and body; the blanket
/// [`PduEncode`]/[`PduDecode`] impls below take care of the header.
pub trait X224Pdu: Sized {
    const X224_NAME: &'static str;

    const TPDU_CODE: TpduCode;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()>;

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpdu: &TpduHeader) -> PduResult<Self>;

    /// Bytes this PDU contributes to the TPDU header's variable part.
    fn tpdu_header_variable_part_size(&self) -> usize;

    /// Bytes this PDU contributes after the TPDU header.
    fn tpdu_user_data_size(&self) -> usize;
}

impl<T> PduEncode for T
where
    T: X224Pdu,
{
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: T::X224_NAME, in: dst, size: self.size());

        let header_len = T::TPDU_CODE.header_fixed_part_size() + self.tpdu_header_variable_part_size();
        let header = TpduHeader {
            li: cast_length!(T::X224_NAME, "li", header_len - 1)?,
            code: T::TPDU_CODE,
        };

        header.write(dst)?;
        self.x224_body_encode(dst)
    }

    fn name(&self) -> &'static str {
        T::X224_NAME
    }

    fn size(&self) -> usize {
        T::TPDU_CODE.header_fixed_part_size() + self.tpdu_header_variable_part_size() + self.tpdu_user_data_size()
    }
}

impl<'de, T> PduDecode<'de> for T
where
    T: X224Pdu,
{
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let tpdu = TpduHeader::read(src)?;
        tpdu.code.check_expected(T::TPDU_CODE)?;

        T::x224_body_decode(src, &tpdu)
    }
}

/// User data carried by an X.224 Data TPDU, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X224Data {
    pub data: Vec<u8>,
}

impl X224Pdu for X224Data {
    const X224_NAME: &'static str = "X.224 Data";

    const TPDU_CODE: TpduCode = TpduCode::DATA;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: Self::X224_NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'_>, tpdu: &TpduHeader) -> PduResult<Self> {
        // A data TPDU has no defined variable part; tolerate and skip one.
        src.try_read_slice(Self::X224_NAME, tpdu.variable_part_size())?;

        Ok(Self {
            data: src.read_remaining().to_vec(),
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode_vec};

    #[test]
    fn data_tpdu_round_trips() {
        let pdu = X224Data {
            data: vec![0x68, 0x65, 0x6c, 0x6c, 0x6f],
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(&encoded[..3], [0x02, 0xF0, 0x80]);

        let decoded: X224Data = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
