//! A bounded byte sink used to encode fixed-size records.
//!
//! Grounded on the original pager's `FixedSizeSliceWriter`: a write that
//! would run past the end of the backing buffer fails instead of growing it,
//! so record encoders can lean on `byteorder`'s `WriteBytesExt` while staying
//! inside a caller-owned, page-sized allocation.

use std::io::{self, Write};

pub struct FixedSizeWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> FixedSizeWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        FixedSizeWriter { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl<'a> Write for FixedSizeWriter<'a> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let remaining = self.buf.len() - self.offset;
        if data.len() > remaining {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "fixed size writer overflow: {} bytes requested, {} remaining",
                    data.len(),
                    remaining
                ),
            ));
        }
        self.buf[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
