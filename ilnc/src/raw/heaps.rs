//! The four metadata heaps referenced from table rows via `#Strings`,
//! `#US`, `#GUID` and `#Blob` stream indices (ECMA-335 §II.24.2.3).

use std::io::{Cursor, Error, ErrorKind};

use crate::utilities::{read_compressed_u32, FromByteStream};

/// An index into the `#Strings` heap; always UTF-8, NUL-terminated.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct StringIndex(pub u32);

/// An index into the `#Blob` heap; length-prefixed, opaque bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BlobIndex(pub u32);

/// An index into the `#GUID` heap; each entry is a fixed 16 bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct GuidIndex(pub u32);

/// An index into the `#US` (user string) heap.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct UserStringIndex(pub u32);

/// Owning view over the four metadata heaps, sliced out of the assembly's
/// raw file bytes at load time.
pub struct MetadataHeaps<'l> {
    strings: &'l [u8],
    us: &'l [u8],
    guid: &'l [u8],
    blob: &'l [u8],
}

impl<'l> MetadataHeaps<'l> {
    pub fn new(strings: &'l [u8], us: &'l [u8], guid: &'l [u8], blob: &'l [u8]) -> Self {
        Self { strings, us, guid, blob }
    }

    pub fn empty() -> MetadataHeaps<'static> {
        MetadataHeaps { strings: &[], us: &[], guid: &[], blob: &[] }
    }

    pub fn string(&self, index: StringIndex) -> std::io::Result<&'l str> {
        if index.0 == 0 {
            return Ok("");
        }
        let start = index.0 as usize;
        let bytes = self.strings.get(start..).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;
        let end = bytes.iter().position(|b| *b == 0).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;
        std::str::from_utf8(&bytes[..end]).map_err(|_| Error::from(ErrorKind::InvalidData))
    }

    pub fn blob(&self, index: BlobIndex) -> std::io::Result<&'l [u8]> {
        if index.0 == 0 {
            return Ok(&[]);
        }
        let start = index.0 as usize;
        let mut cursor = Cursor::new(self.blob.get(start..).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?);
        let len = read_compressed_u32(&mut cursor)? as usize;
        let data_start = start + cursor.position() as usize;
        self.blob
            .get(data_start..data_start + len)
            .ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))
    }

    pub fn guid(&self, index: GuidIndex) -> std::io::Result<[u8; 16]> {
        if index.0 == 0 {
            return Ok([0; 16]);
        }
        let start = (index.0 as usize - 1) * 16;
        let bytes = self.guid.get(start..start + 16).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;
        let mut out = [0u8; 16];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// User strings are UTF-16LE and are never NUL-terminated; length is
    /// stored as a compressed prefix, the same as blobs.
    pub fn user_string(&self, index: UserStringIndex) -> std::io::Result<String> {
        if index.0 == 0 {
            return Ok(String::new());
        }
        let start = index.0 as usize;
        let mut cursor = Cursor::new(self.us.get(start..).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?);
        let len = read_compressed_u32(&mut cursor)? as usize;
        let data_start = start + cursor.position() as usize;
        let bytes = self.us.get(data_start..data_start + len.saturating_sub(1)).ok_or_else(|| Error::from(ErrorKind::UnexpectedEof))?;
        let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        String::from_utf16(&units).map_err(|_| Error::from(ErrorKind::InvalidData))
    }
}

macro_rules! impl_heap_index_from_byte_stream {
    ($($ty: ident),*) => {$(
        impl FromByteStream for $ty {
            /// `true` when the owning heap is large enough to need a 4-byte index
            /// (ECMA-335 §II.24.2.6 heap-size bit for this heap is set).
            type Deps = bool;

            fn read(stream: &mut Cursor<&[u8]>, wide: &bool) -> std::io::Result<Self> {
                Ok($ty(if *wide { u32::read(stream, &())? } else { u16::read(stream, &())? as u32 }))
            }
        }
    )*};
}

impl_heap_index_from_byte_stream!(StringIndex, BlobIndex, GuidIndex, UserStringIndex);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nul_terminated_string() {
        let heap = b"\0Hello\0World\0";
        let heaps = MetadataHeaps::new(heap, &[], &[], &[]);
        assert_eq!(heaps.string(StringIndex(1)).unwrap(), "Hello");
        assert_eq!(heaps.string(StringIndex(7)).unwrap(), "World");
    }

    #[test]
    fn reads_length_prefixed_blob() {
        let heap = [0u8, 3, b'a', b'b', b'c'];
        let heaps = MetadataHeaps::new(&[], &[], &[], &heap);
        assert_eq!(heaps.blob(BlobIndex(1)).unwrap(), b"abc");
    }

    #[test]
    fn empty_index_is_empty_string() {
        let heaps = MetadataHeaps::empty();
        assert_eq!(heaps.string(StringIndex(0)).unwrap(), "");
    }
}
