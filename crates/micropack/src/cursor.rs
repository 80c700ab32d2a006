use crate::Error;
use crate::Result;

/// A bounds-checked, big-endian view over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    slice: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.slice.len().saturating_sub(self.pos)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::UnexpectedEnd);
        }
        let out = &self.slice[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn str(&mut self, len: usize) -> Result<&'a str> {
        let b = self.bytes(len)?;
        std::str::from_utf8(b).map_err(|_| Error::InvalidUtf8)
    }

    pub fn ascii(&mut self, len: usize) -> Result<&'a str> {
        let b = self.bytes(len)?;
        if !b.is_ascii() {
            return Err(Error::InvalidAscii);
        }
        std::str::from_utf8(b).map_err(|_| Error::InvalidAscii)
    }

    /// Fails if any bytes remain unread.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }
}

/// A big-endian writer over an exactly sized destination slice.
#[derive(Debug)]
pub struct Writer<'a> {
    slice: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(slice: &'a mut [u8]) -> Self {
        Self { slice, pos: 0 }
    }

    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        let end = self.pos + src.len();
        if end > self.slice.len() {
            return Err(Error::SizeMismatch { expected: self.slice.len(), actual: end });
        }
        self.slice[self.pos..end].copy_from_slice(src);
        self.pos = end;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_slice(&v.to_be_bytes())
    }

    /// Fails unless the destination was filled exactly.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.slice.len() {
            return Err(Error::SizeMismatch { expected: self.slice.len(), actual: self.pos });
        }
        Ok(())
    }
}
