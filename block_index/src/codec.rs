//! Big-endian, length-prefixed primitives shared by the statistic and tree codecs.

use bytes::{BufMut, Bytes, BytesMut};
use snafu::{ensure, ResultExt};

use crate::error::{
    InvalidUtf8Snafu, NegativeLengthSnafu, Result, TrailingBytesSnafu, TruncatedSnafu,
};

const LEN_WIDTH: usize = std::mem::size_of::<i32>();

/// Growable output buffer.
///
/// Length prefixes that depend on bytes not yet written are reserved with
/// [`BinaryWriter::begin_len`] and back-filled once the framed section is done,
/// so nested sections are written in a single pass.
#[derive(Debug, Default)]
pub(crate) struct BinaryWriter {
    buf: BytesMut,
}

/// A reserved length prefix that still has to be filled.
#[derive(Debug)]
#[must_use = "a reserved length must be filled"]
pub(crate) struct LengthSlot {
    at: usize,
}

impl BinaryWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub(crate) fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Writes a non-negative length or count.
    ///
    /// # Panics
    ///
    /// Panics if `len` does not fit an `i32`.
    pub(crate) fn put_len(&mut self, len: usize) {
        self.buf.put_i32(to_wire_len(len));
    }

    pub(crate) fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Writes `len:i32` followed by `bytes`.
    pub(crate) fn put_len_prefixed(&mut self, bytes: &[u8]) {
        self.put_len(bytes.len());
        self.put_slice(bytes);
    }

    /// Writes a UTF-8 string with its byte length.
    pub(crate) fn put_str(&mut self, value: &str) {
        self.put_len_prefixed(value.as_bytes());
    }

    /// Reserves a length prefix at the current position.
    pub(crate) fn begin_len(&mut self) -> LengthSlot {
        let at = self.buf.len();
        self.buf.put_i32(0);
        LengthSlot { at }
    }

    /// Fills `slot` with the number of bytes written since it was reserved.
    pub(crate) fn end_len(&mut self, slot: LengthSlot) {
        let len = self.buf.len() - slot.at - LEN_WIDTH;
        self.fill_len(slot, len);
    }

    /// Fills `slot` with an explicit length.
    pub(crate) fn fill_len(&mut self, slot: LengthSlot, len: usize) {
        self.buf[slot.at..slot.at + LEN_WIDTH].copy_from_slice(&to_wire_len(len).to_be_bytes());
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn to_wire_len(len: usize) -> i32 {
    i32::try_from(len).expect("block index section exceeds i32::MAX bytes")
}

/// Cursor over an encoded section.
#[derive(Debug)]
pub(crate) struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn get_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        ensure!(
            len <= available,
            TruncatedSnafu {
                offset: self.pos,
                needed: len,
                available,
            }
        );
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_slice(1)?[0])
    }

    pub(crate) fn get_i32(&mut self) -> Result<i32> {
        let mut raw = [0_u8; LEN_WIDTH];
        raw.copy_from_slice(self.get_slice(LEN_WIDTH)?);
        Ok(i32::from_be_bytes(raw))
    }

    /// Reads a length or count, rejecting negative values.
    pub(crate) fn get_len(&mut self) -> Result<usize> {
        let offset = self.pos;
        let len = self.get_i32()?;
        usize::try_from(len)
            .ok()
            .ok_or_else(|| NegativeLengthSnafu { offset, len }.build())
    }

    pub(crate) fn get_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.get_len()?;
        self.get_slice(len)
    }

    pub(crate) fn get_string(&mut self, field: &'static str) -> Result<String> {
        let bytes = self.get_len_prefixed()?;
        String::from_utf8(bytes.to_vec()).context(InvalidUtf8Snafu { field })
    }

    /// Ensures the whole section was consumed.
    pub(crate) fn finish(self, what: &'static str) -> Result<()> {
        let remaining = self.remaining();
        ensure!(remaining == 0, TrailingBytesSnafu { what, remaining });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    #[test]
    fn test_back_filled_lengths() {
        let mut w = BinaryWriter::default();
        let outer = w.begin_len();
        w.put_str("abc");
        let inner = w.begin_len();
        w.put_u8(7);
        w.end_len(inner);
        w.end_len(outer);
        let bytes = w.finish();

        assert_eq!(
            bytes.as_ref(),
            &[0, 0, 0, 12, 0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 1, 7]
        );

        let mut r = BinaryReader::new(&bytes);
        let body = r.get_len_prefixed().unwrap();
        r.finish("outer").unwrap();

        let mut r = BinaryReader::new(body);
        assert_eq!(r.get_string("name").unwrap(), "abc");
        assert_eq!(r.get_len_prefixed().unwrap(), &[7]);
        r.finish("inner").unwrap();
    }

    #[test]
    fn test_truncated() {
        let mut r = BinaryReader::new(&[0, 0, 0, 9, 1, 2]);
        assert_matches!(
            r.get_len_prefixed(),
            Err(Error::Truncated {
                offset: 4,
                needed: 9,
                available: 2
            })
        );
    }

    #[test]
    fn test_negative_length() {
        let raw = (-2_i32).to_be_bytes();
        let mut r = BinaryReader::new(&raw);
        assert_matches!(r.get_len(), Err(Error::NegativeLength { offset: 0, len: -2 }));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut r = BinaryReader::new(&[1, 2, 3]);
        r.get_u8().unwrap();
        let err = r.finish("thing").unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(
            err.to_string(),
            "malformed block index binary: 2 trailing bytes after thing"
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mut r = BinaryReader::new(&[0, 0, 0, 1, 0xff]);
        assert_matches!(
            r.get_string("child name"),
            Err(Error::InvalidUtf8 {
                field: "child name",
                ..
            })
        );
    }
}
