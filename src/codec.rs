//! Binary layout primitives: little-endian fixed-width ints, length-prefixed
//! strings, bounded reads and CRC32 — the shapes, not the semantics.

use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{self, Read, Write};

pub trait ReadExt {
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>>;
    fn read_table_string(&mut self) -> Result<String>;
}

pub trait WriteExt {
    fn write_table_string(&mut self, value: &str) -> Result<()>;
}

impl<R: Read> ReadExt for R {
    /// Read exactly `len` bytes, rejecting absurd lengths before allocating.
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>> {
        const SANITY_LIMIT: usize = 1 << 32;
        if len > SANITY_LIMIT {
            return Err(Error::HeaderCorrupt(format!(
                "refusing to allocate {len} bytes for a single read"
            )));
        }
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// `(u16 length, bytes)` as used by the dir/name/ext string tables.
    fn read_table_string(&mut self) -> Result<String> {
        let len = self.read_u16::<LE>()? as usize;
        let bytes = self.read_len(len)?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<W: Write> WriteExt for W {
    fn write_table_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_u16::<LE>(
            bytes
                .len()
                .try_into()
                .map_err(|_| Error::Other(format!("string table entry too long: {value:?}")))?,
        )?;
        self.write_all(bytes)?;
        Ok(())
    }
}

/// CRC32 over an arbitrary byte range, used for `FileHeader::header_checksum`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Bounded read of `len` bytes directly at `offset` in a random-access reader,
/// without disturbing the reader's stream position semantics beyond the seek.
pub fn read_at<R: Read + io::Seek>(reader: &mut R, offset: u64, len: u64) -> Result<Vec<u8>> {
    reader.seek(io::SeekFrom::Start(offset))?;
    reader.read_len(len as usize)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn table_string_round_trips() {
        let mut buf = vec![];
        buf.write_table_string("dir/sub/").unwrap();
        buf.write_table_string("").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_table_string().unwrap(), "dir/sub/");
        assert_eq!(cursor.read_table_string().unwrap(), "");
    }

    #[test]
    fn read_len_rejects_truncated_input() {
        let mut cursor = Cursor::new(vec![1, 2, 3]);
        assert!(cursor.read_len(10).is_err());
    }

    #[test]
    fn crc32_is_deterministic() {
        assert_eq!(crc32(b"grimoire"), crc32(b"grimoire"));
        assert_ne!(crc32(b"grimoire"), crc32(b"grimoirf"));
    }
}
