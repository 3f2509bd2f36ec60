//! Sequential byte readers over either a file or a borrowed in-memory slice.
//!
//! Both variants share the same two operations (`read`, `eof`); the core
//! never cares which one it has. Short reads are not an error at this layer
//! — callers (the primitive codec) decide whether a short read means
//! `UnexpectedEof`.

use std::fs::File;
use std::io::Read as _;

/// A polymorphic sequential reader. Closed set of two variants (file-backed,
/// slice-backed), so a plain enum is simpler than a trait object here.
pub enum ByteSource<'a> {
    File(File),
    Slice(SliceSource<'a>),
}

impl<'a> ByteSource<'a> {
    pub fn from_file(file: File) -> Self {
        ByteSource::File(file)
    }

    pub fn from_slice(data: &'a [u8]) -> Self {
        ByteSource::Slice(SliceSource { data, position: 0 })
    }

    /// Reads up to `dest.len()` bytes, returning the number actually read.
    /// Zero means end of input.
    pub fn read(&mut self, dest: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ByteSource::File(f) => f.read(dest),
            ByteSource::Slice(s) => Ok(s.read(dest)),
        }
    }

    pub fn eof(&self) -> bool {
        match self {
            ByteSource::File(_) => false, // determined only by a zero-length read
            ByteSource::Slice(s) => s.eof(),
        }
    }
}

/// Borrowed in-memory slice with an internal read cursor.
pub struct SliceSource<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data, position: 0 }
    }

    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let remaining = self.data.len() - self.position;
        let n = dest.len().min(remaining);
        dest[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        n
    }

    pub fn eof(&self) -> bool {
        self.position == self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_clamps_reads_to_remaining() {
        let data = [1u8, 2, 3];
        let mut src = SliceSource::new(&data);
        let mut buf = [0u8; 8];
        let n = src.read(&mut buf);
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &data[..]);
        assert!(src.eof());
    }

    #[test]
    fn slice_source_eof_exactly_at_end() {
        let data = [9u8; 4];
        let mut src = SliceSource::new(&data);
        assert!(!src.eof());
        let mut buf = [0u8; 2];
        src.read(&mut buf);
        assert!(!src.eof());
        src.read(&mut buf);
        assert!(src.eof());
        assert_eq!(src.read(&mut buf), 0);
    }

    #[test]
    fn byte_source_slice_variant_reads_through_enum() {
        let data = [7u8, 8, 9];
        let mut src = ByteSource::from_slice(&data);
        let mut buf = [0u8; 3];
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert!(src.eof());
    }
}
