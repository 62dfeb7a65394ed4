//! FileHeader, IndexHeader and DataHeader: the fixed-width framing records
//! that bound the index and data regions (§3).

use crate::codec::crc32;
use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{self, Read, Write};

pub const DEFAULT_MAGIC: [u8; 4] = *b"GRIM";
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMode {
    Manifest,
    Archive,
}

impl ContainerMode {
    fn as_u8(self) -> u8 {
        match self {
            ContainerMode::Manifest => 0,
            ContainerMode::Archive => 1,
        }
    }

    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(ContainerMode::Manifest),
            1 => Ok(ContainerMode::Archive),
            other => Err(Error::HeaderCorrupt(format!("unknown mode flag {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerMode::Manifest => "Manifest",
            ContainerMode::Archive => "Archive",
        }
    }
}

/// 50 bytes, fixed. `header_checksum` is a CRC32 over every preceding byte.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub format_version: u16,
    pub mode: ContainerMode,
    pub index_crypto_id: u16,
    pub checksum_algo_id: u16,
    pub path_hash_algo_id: u16,
    pub index_offset: u64,
    pub index_length: u64,
    pub data_offset: u64,
    pub data_length: u64,
}

impl FileHeader {
    /// Serialized size in bytes (fixed, §3).
    pub const SIZE: usize = 50;

    fn body_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE - 4);
        buf.extend_from_slice(&self.magic);
        buf.write_u16::<LE>(self.format_version).unwrap();
        buf.write_u8(self.mode.as_u8()).unwrap();
        buf.write_u8(0).unwrap(); // reserved
        buf.write_u16::<LE>(self.index_crypto_id).unwrap();
        buf.write_u16::<LE>(self.checksum_algo_id).unwrap();
        buf.write_u16::<LE>(self.path_hash_algo_id).unwrap();
        buf.write_u64::<LE>(self.index_offset).unwrap();
        buf.write_u64::<LE>(self.index_length).unwrap();
        buf.write_u64::<LE>(self.data_offset).unwrap();
        buf.write_u64::<LE>(self.data_length).unwrap();
        buf
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let body = self.body_bytes();
        debug_assert_eq!(body.len(), Self::SIZE - 4);
        writer.write_all(&body)?;
        writer.write_u32::<LE>(crc32(&body))?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, expected_magic: [u8; 4]) -> Result<Self> {
        let mut body = vec![0u8; Self::SIZE - 4];
        reader.read_exact(&mut body)?;
        let stored_checksum = reader.read_u32::<LE>()?;
        if crc32(&body) != stored_checksum {
            return Err(Error::HeaderCorrupt("header checksum mismatch".into()));
        }

        let mut cursor = io::Cursor::new(&body);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != expected_magic {
            return Err(Error::BadMagic {
                found: magic,
                expected: expected_magic,
            });
        }
        let format_version = cursor.read_u16::<LE>()?;
        if format_version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(format_version));
        }
        let mode = ContainerMode::from_u8(cursor.read_u8()?)?;
        let _reserved = cursor.read_u8()?;
        let index_crypto_id = cursor.read_u16::<LE>()?;
        let checksum_algo_id = cursor.read_u16::<LE>()?;
        let path_hash_algo_id = cursor.read_u16::<LE>()?;
        let index_offset = cursor.read_u64::<LE>()?;
        let index_length = cursor.read_u64::<LE>()?;
        let data_offset = cursor.read_u64::<LE>()?;
        let data_length = cursor.read_u64::<LE>()?;

        Ok(FileHeader {
            magic,
            format_version,
            mode,
            index_crypto_id,
            checksum_algo_id,
            path_hash_algo_id,
            index_offset,
            index_length,
            data_offset,
            data_length,
        })
    }
}

/// 24 bytes, fixed. First bytes of the index region, before any index-crypto.
#[derive(Debug, Clone)]
pub struct IndexHeader {
    pub entry_count: u32,
    pub checksum_size: u16,
    pub dir_table_length: u32,
    pub name_table_length: u32,
    pub ext_table_length: u32,
    pub entry_record_size: u16,
}

impl IndexHeader {
    pub const SIZE: usize = 24;

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LE>(self.entry_count)?;
        writer.write_u16::<LE>(self.checksum_size)?;
        writer.write_u32::<LE>(self.dir_table_length)?;
        writer.write_u32::<LE>(self.name_table_length)?;
        writer.write_u32::<LE>(self.ext_table_length)?;
        writer.write_u16::<LE>(self.entry_record_size)?;
        writer.write_u16::<LE>(0)?; // reserved
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let entry_count = reader.read_u32::<LE>()?;
        let checksum_size = reader.read_u16::<LE>()?;
        let dir_table_length = reader.read_u32::<LE>()?;
        let name_table_length = reader.read_u32::<LE>()?;
        let ext_table_length = reader.read_u32::<LE>()?;
        let entry_record_size = reader.read_u16::<LE>()?;
        let _reserved = reader.read_u16::<LE>()?;
        Ok(IndexHeader {
            entry_count,
            checksum_size,
            dir_table_length,
            name_table_length,
            ext_table_length,
            entry_record_size,
        })
    }
}

/// 16 bytes, Archive only. Immediately precedes the concatenated packed payloads.
#[derive(Debug, Clone)]
pub struct DataHeader {
    pub total_uncompressed_size: u64,
    pub total_packed_size: u64,
}

impl DataHeader {
    pub const SIZE: usize = 16;

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LE>(self.total_uncompressed_size)?;
        writer.write_u64::<LE>(self.total_packed_size)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(DataHeader {
            total_uncompressed_size: reader.read_u64::<LE>()?,
            total_packed_size: reader.read_u64::<LE>()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn file_header_round_trips() {
        let header = FileHeader {
            magic: DEFAULT_MAGIC,
            format_version: FORMAT_VERSION,
            mode: ContainerMode::Archive,
            index_crypto_id: 0,
            checksum_algo_id: 3,
            path_hash_algo_id: 0,
            index_offset: 48,
            index_length: 128,
            data_offset: 176,
            data_length: 4096,
        };
        let mut buf = vec![];
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), FileHeader::SIZE);
        let mut cursor = Cursor::new(buf);
        let decoded = FileHeader::read(&mut cursor, DEFAULT_MAGIC).unwrap();
        assert_eq!(decoded.index_offset, 48);
        assert_eq!(decoded.mode, ContainerMode::Archive);
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        let header = FileHeader {
            magic: *b"NOPE",
            format_version: FORMAT_VERSION,
            mode: ContainerMode::Manifest,
            index_crypto_id: 0,
            checksum_algo_id: 0,
            path_hash_algo_id: 0,
            index_offset: 0,
            index_length: 0,
            data_offset: 0,
            data_length: 0,
        };
        let mut buf = vec![];
        header.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            FileHeader::read(&mut cursor, DEFAULT_MAGIC),
            Err(Error::BadMagic { .. })
        ));
    }

    #[test]
    fn file_header_detects_corruption() {
        let header = FileHeader {
            magic: DEFAULT_MAGIC,
            format_version: FORMAT_VERSION,
            mode: ContainerMode::Manifest,
            index_crypto_id: 0,
            checksum_algo_id: 0,
            path_hash_algo_id: 0,
            index_offset: 0,
            index_length: 0,
            data_offset: 0,
            data_length: 0,
        };
        let mut buf = vec![];
        header.write(&mut buf).unwrap();
        buf[10] ^= 0xff;
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            FileHeader::read(&mut cursor, DEFAULT_MAGIC),
            Err(Error::HeaderCorrupt(_))
        ));
    }

    #[test]
    fn index_header_round_trips() {
        let header = IndexHeader {
            entry_count: 3,
            checksum_size: 20,
            dir_table_length: 10,
            name_table_length: 20,
            ext_table_length: 5,
            entry_record_size: 64,
        };
        let mut buf = vec![];
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), IndexHeader::SIZE);
        let mut cursor = Cursor::new(buf);
        let decoded = IndexHeader::read(&mut cursor).unwrap();
        assert_eq!(decoded.entry_count, 3);
        assert_eq!(decoded.checksum_size, 20);
    }
}
