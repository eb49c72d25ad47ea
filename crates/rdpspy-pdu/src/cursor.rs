//! Byte cursors used by every codec in this crate.
//!
//! The plain accessors panic when the buffer is too short; callers are
//! expected to run an `ensure_size!` check first. The `try_*` variants fold
//! the check in and return a `PduResult` instead.

use crate::{PduError, PduErrorExt as _, PduResult};

#[derive(Clone, Debug)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    #[inline]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub const fn len(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn pos(&self) -> usize {
        self.pos
    }

    /// The whole underlying buffer, consumed part included.
    #[inline]
    pub const fn inner(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    #[inline]
    fn require(&self, ctx: &'static str, count: usize) -> PduResult<()> {
        if self.len() < count {
            Err(PduError::not_enough_bytes(ctx, self.len(), count))
        } else {
            Ok(())
        }
    }

    /// Skips up to `count` bytes, clamped to the end of the buffer.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.buf.len());
    }

    #[inline]
    #[track_caller]
    pub fn read_slice(&mut self, count: usize) -> &'a [u8] {
        let taken = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        taken
    }

    #[inline]
    pub fn read_remaining(&mut self) -> &'a [u8] {
        self.read_slice(self.len())
    }

    #[inline]
    #[track_caller]
    pub fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N));
        out
    }

    #[inline]
    #[track_caller]
    pub fn read_u8(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    #[inline]
    #[track_caller]
    pub fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read_array())
    }

    #[inline]
    #[track_caller]
    pub fn read_u16_be(&mut self) -> u16 {
        u16::from_be_bytes(self.read_array())
    }

    #[inline]
    #[track_caller]
    pub fn read_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.read_array())
    }

    #[inline]
    #[track_caller]
    pub fn read_u32_be(&mut self) -> u32 {
        u32::from_be_bytes(self.read_array())
    }

    #[inline]
    #[track_caller]
    pub fn read_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.read_array())
    }

    #[inline]
    pub fn try_read_u8(&mut self, ctx: &'static str) -> PduResult<u8> {
        self.require(ctx, 1)?;
        Ok(self.read_u8())
    }

    #[inline]
    pub fn try_read_u16(&mut self, ctx: &'static str) -> PduResult<u16> {
        self.require(ctx, 2)?;
        Ok(self.read_u16())
    }

    #[inline]
    pub fn try_read_u16_be(&mut self, ctx: &'static str) -> PduResult<u16> {
        self.require(ctx, 2)?;
        Ok(self.read_u16_be())
    }

    #[inline]
    pub fn try_read_u32(&mut self, ctx: &'static str) -> PduResult<u32> {
        self.require(ctx, 4)?;
        Ok(self.read_u32())
    }

    #[inline]
    pub fn try_read_u32_be(&mut self, ctx: &'static str) -> PduResult<u32> {
        self.require(ctx, 4)?;
        Ok(self.read_u32_be())
    }

    #[inline]
    pub fn try_read_slice(&mut self, ctx: &'static str, count: usize) -> PduResult<&'a [u8]> {
        self.require(ctx, count)?;
        Ok(self.read_slice(count))
    }

    #[inline]
    #[track_caller]
    pub fn peek_u8(&self) -> u8 {
        self.buf[self.pos]
    }

    #[inline]
    pub fn try_peek_u8(&self, ctx: &'static str) -> PduResult<u8> {
        self.require(ctx, 1)?;
        Ok(self.peek_u8())
    }

    #[inline]
    #[track_caller]
    pub fn peek_slice(&self, count: usize) -> &'a [u8] {
        &self.buf[self.pos..self.pos + count]
    }
}

#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Space left in the destination buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes written so far.
    #[inline]
    pub const fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    #[track_caller]
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    #[inline]
    #[track_caller]
    pub fn write_array<const N: usize>(&mut self, bytes: [u8; N]) {
        self.write_slice(&bytes);
    }

    #[inline]
    #[track_caller]
    pub fn write_u8(&mut self, value: u8) {
        self.write_array([value]);
    }

    #[inline]
    #[track_caller]
    pub fn write_u16(&mut self, value: u16) {
        self.write_array(value.to_le_bytes());
    }

    #[inline]
    #[track_caller]
    pub fn write_u16_be(&mut self, value: u16) {
        self.write_array(value.to_be_bytes());
    }

    #[inline]
    #[track_caller]
    pub fn write_u32(&mut self, value: u32) {
        self.write_array(value.to_le_bytes());
    }

    #[inline]
    #[track_caller]
    pub fn write_u32_be(&mut self, value: u32) {
        self.write_array(value.to_be_bytes());
    }

    #[inline]
    #[track_caller]
    pub fn write_u64(&mut self, value: u64) {
        self.write_array(value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_cursor_tracks_position_and_endianness() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut src = ReadCursor::new(&bytes);

        assert_eq!(src.read_u8(), 0x01);
        assert_eq!(src.read_u16(), 0x0302);
        assert_eq!(src.read_u16_be(), 0x0405);
        assert!(src.is_empty());
        assert_eq!(src.pos(), 5);
    }

    #[test]
    fn try_reads_fail_instead_of_panicking() {
        let mut src = ReadCursor::new(&[0xAA]);

        assert_eq!(src.try_read_u8("test").unwrap(), 0xAA);
        assert!(src.try_read_u8("test").is_err());
    }

    #[test]
    fn write_cursor_round_trips_through_read_cursor() {
        let mut buf = [0u8; 8];
        let mut dst = WriteCursor::new(&mut buf);
        dst.write_u16_be(0x0102);
        dst.write_u32(0xAABBCCDD);
        dst.write_u16(0x0403);
        assert!(dst.is_empty());

        let mut src = ReadCursor::new(&buf);
        assert_eq!(src.read_u16_be(), 0x0102);
        assert_eq!(src.read_u32(), 0xAABBCCDD);
        assert_eq!(src.read_u16(), 0x0403);
    }
}
