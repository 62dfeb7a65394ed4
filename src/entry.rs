//! EntryTable records and the three string tables (§3).

use crate::codec::{ReadExt, WriteExt};
use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

/// One on-disk entry record, sorted ascending by `path_hash` in the table.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub path_hash: u64,
    pub dir_id: u32,
    pub name_id: u32,
    pub ext_id: u32,
    pub raw_size: u64,
    pub packed_size: u64,
    pub data_offset: u64,
    pub algo_id: u16,
    pub flags: u16,
    /// Exactly `checksum_size` bytes, 0-padded if the active hook is shorter.
    pub checksum: Vec<u8>,
}

impl EntryRecord {
    pub fn write<W: Write>(&self, writer: &mut W, checksum_size: u16) -> Result<()> {
        writer.write_u64::<LE>(self.path_hash)?;
        writer.write_u32::<LE>(self.dir_id)?;
        writer.write_u32::<LE>(self.name_id)?;
        writer.write_u32::<LE>(self.ext_id)?;
        writer.write_u64::<LE>(self.raw_size)?;
        writer.write_u64::<LE>(self.packed_size)?;
        writer.write_u64::<LE>(self.data_offset)?;
        writer.write_u16::<LE>(self.algo_id)?;
        writer.write_u16::<LE>(self.flags)?;
        debug_assert_eq!(self.checksum.len(), checksum_size as usize);
        writer.write_all(&self.checksum)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, checksum_size: u16) -> Result<Self> {
        let path_hash = reader.read_u64::<LE>()?;
        let dir_id = reader.read_u32::<LE>()?;
        let name_id = reader.read_u32::<LE>()?;
        let ext_id = reader.read_u32::<LE>()?;
        let raw_size = reader.read_u64::<LE>()?;
        let packed_size = reader.read_u64::<LE>()?;
        let data_offset = reader.read_u64::<LE>()?;
        let algo_id = reader.read_u16::<LE>()?;
        let flags = reader.read_u16::<LE>()?;
        let checksum = reader.read_len(checksum_size as usize)?;
        Ok(EntryRecord {
            path_hash,
            dir_id,
            name_id,
            ext_id,
            raw_size,
            packed_size,
            data_offset,
            algo_id,
            flags,
            checksum,
        })
    }

    /// Fixed size of one serialized record for a given checksum size (§3 EntryTable).
    pub fn serialized_size(checksum_size: u16) -> u16 {
        // path_hash(8) + dir_id(4) + name_id(4) + ext_id(4) + raw_size(8)
        // + packed_size(8) + data_offset(8) + algo_id(2) + flags(2) + checksum
        8 + 4 + 4 + 4 + 8 + 8 + 8 + 2 + 2 + checksum_size
    }
}

/// An immutable entry descriptor handed to callers (§4.6 `get_entry`).
#[derive(Clone)]
pub struct EntryDescriptor {
    pub vfs_path: String,
    pub raw_size: u64,
    pub packed_size: u64,
    pub algo_id: u16,
    pub checksum: Vec<u8>,
    pub data_offset: u64,
}

impl std::fmt::Debug for EntryDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryDescriptor")
            .field("vfs_path", &self.vfs_path)
            .field("raw_size", &self.raw_size)
            .field("packed_size", &self.packed_size)
            .field("algo_id", &self.algo_id)
            .field("checksum", &hex::encode(&self.checksum))
            .field("data_offset", &self.data_offset)
            .finish()
    }
}

/// Serialize a string table: repeated `(u16 length, bytes)` in the given order.
pub fn write_string_table<W: Write>(writer: &mut W, strings: &[String]) -> Result<u32> {
    let mut len = 0u32;
    for s in strings {
        writer.write_table_string(s)?;
        len += 2 + s.as_bytes().len() as u32;
    }
    Ok(len)
}

/// Parse a string table occupying exactly `table_length` bytes.
pub fn read_string_table<R: Read>(reader: &mut R, table_length: u32) -> Result<Vec<String>> {
    let mut remaining = table_length as i64;
    let mut strings = vec![];
    while remaining > 0 {
        let before = remaining;
        let s = reader.read_table_string()?;
        remaining -= 2 + s.as_bytes().len() as i64;
        strings.push(s);
        if remaining == before {
            return Err(Error::HeaderCorrupt("string table made no progress".into()));
        }
    }
    if remaining != 0 {
        return Err(Error::HeaderCorrupt(
            "string table length does not align with entries".into(),
        ));
    }
    Ok(strings)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn entry_record_round_trips() {
        let record = EntryRecord {
            path_hash: 0xdead_beef_0000_0001,
            dir_id: 1,
            name_id: 2,
            ext_id: 3,
            raw_size: 1024,
            packed_size: 512,
            data_offset: 0,
            algo_id: 1,
            flags: 0,
            checksum: vec![9u8; 20],
        };
        let mut buf = vec![];
        record.write(&mut buf, 20).unwrap();
        assert_eq!(buf.len(), EntryRecord::serialized_size(20) as usize);
        let mut cursor = Cursor::new(buf);
        let decoded = EntryRecord::read(&mut cursor, 20).unwrap();
        assert_eq!(decoded.path_hash, record.path_hash);
        assert_eq!(decoded.checksum, record.checksum);
    }

    #[test]
    fn string_table_round_trips() {
        let strings = vec!["/a/".to_string(), "b".to_string(), "".to_string()];
        let mut buf = vec![];
        let len = write_string_table(&mut buf, &strings).unwrap();
        assert_eq!(len as usize, buf.len());
        let mut cursor = Cursor::new(buf);
        let decoded = read_string_table(&mut cursor, len).unwrap();
        assert_eq!(decoded, strings);
    }

    #[test]
    fn empty_string_table_round_trips() {
        let mut buf = vec![];
        let len = write_string_table(&mut buf, &[]).unwrap();
        assert_eq!(len, 0);
        let mut cursor = Cursor::new(buf);
        let decoded = read_string_table(&mut cursor, 0).unwrap();
        assert!(decoded.is_empty());
    }
}
