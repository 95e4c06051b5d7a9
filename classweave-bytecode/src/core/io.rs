//! Big-endian cursor helpers shared by every decoder in this crate

use crate::error::{BytecodeError, Result};
use byteorder::{BigEndian, ByteOrder};

/// Bounds-checked big-endian reader over a borrowed buffer.
///
/// Running past the end yields [`BytecodeError::Truncated`] tagged with the
/// structure that was being read, never a panic.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(BytecodeError::Truncated {
                context,
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize, context: &'static str) -> Result<()> {
        self.take(len, context).map(|_| ())
    }

    pub fn u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.take(1, context)?[0])
    }

    pub fn u16(&mut self, context: &'static str) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2, context)?))
    }

    pub fn u32(&mut self, context: &'static str) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4, context)?))
    }

    pub fn i32(&mut self, context: &'static str) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4, context)?))
    }

    pub fn i16(&mut self, context: &'static str) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2, context)?))
    }

    /// Read a `u32`-length-prefixed blob, as used by attribute bodies
    pub fn blob32(&mut self, context: &'static str) -> Result<&'a [u8]> {
        let len = self.u32(context)? as usize;
        self.take(len, context)
    }
}

/// Append-only big-endian writer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.u16(value as u16)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.u32(value as u32)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Write a count that must fit the format's `u16` slot
    pub fn count16(&mut self, count: usize, what: &'static str) -> Result<&mut Self> {
        let value = u16::try_from(count).map_err(|_| BytecodeError::TooMany { what, count })?;
        Ok(self.u16(value))
    }

    /// Write a `u32`-length-prefixed blob
    pub fn blob32(&mut self, bytes: &[u8], what: &'static str) -> Result<&mut Self> {
        let len = u32::try_from(bytes.len()).map_err(|_| BytecodeError::TooMany {
            what,
            count: bytes.len(),
        })?;
        self.u32(len);
        Ok(self.bytes(bytes))
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
