//! Reader (§4.6): opens a container, parses its index, and resolves entries
//! by path or hash. Archive-mode payload access comes from an mmap when the
//! `mmap` feature is enabled, falling back to positional reads otherwise.

use crate::codec::read_at;
use crate::entry::{read_string_table, EntryDescriptor, EntryRecord};
use crate::error::{Error, Result};
use crate::header::{ContainerMode, DataHeader, FileHeader, IndexHeader, DEFAULT_MAGIC};
use crate::hooks::HookRegistry;
use crate::path::{restore_path, VfsPath};
use crate::pipeline;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub magic: [u8; 4],
    /// Verify the stored checksum against decompressed bytes on every read.
    pub verify_on_read: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            magic: DEFAULT_MAGIC,
            verify_on_read: true,
        }
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Default)]
pub struct ReaderBuilder {
    config: ReaderConfig,
    hooks: HookRegistry,
}

impl ReaderBuilder {
    pub fn new() -> Self {
        ReaderBuilder {
            config: ReaderConfig::new(),
            hooks: HookRegistry::new(),
        }
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.config.magic = magic;
        self
    }

    pub fn verify_on_read(mut self, verify: bool) -> Self {
        self.config.verify_on_read = verify;
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn open(self, path: &Path) -> Result<Reader> {
        let file = File::open(path).map_err(|source| Error::LocalIoError {
            path: path.to_path_buf(),
            source,
        })?;
        Reader::from_file(file, self.config, self.hooks)
    }
}

enum Backing {
    #[cfg(feature = "mmap")]
    Mmap(memmap2::Mmap),
    File(std::sync::Mutex<File>),
}

/// The decoded dir/name/ext string tables. Absent when the index is
/// encrypted and no matching [`crate::hooks::IndexCryptoHook`] was supplied.
struct StringTables {
    dirs: Vec<String>,
    names: Vec<String>,
    exts: Vec<String>,
}

/// `path_hash`, offsets and checksums are never encrypted (only the string
/// tables are, see [`decode_index`]), so `records`/`by_hash` are always
/// available; only path-string reconstruction requires `strings`.
struct ParsedIndex {
    strings: Option<StringTables>,
    records: Vec<EntryRecord>,
    by_hash: HashMap<u64, Vec<usize>>,
}

pub struct Reader {
    header: FileHeader,
    config: ReaderConfig,
    hooks: HookRegistry,
    backing: Backing,
    index: ParsedIndex,
}

impl Reader {
    fn from_file(mut file: File, config: ReaderConfig, hooks: HookRegistry) -> Result<Self> {
        file.seek(std::io::SeekFrom::Start(0))?;
        let header = FileHeader::read(&mut file, config.magic)?;

        let mut index_bytes = vec![0u8; header.index_length as usize];
        file.seek(std::io::SeekFrom::Start(header.index_offset))?;
        file.read_exact(&mut index_bytes)?;

        let index = decode_index(&index_bytes, &hooks, header.index_crypto_id)?;

        #[cfg(feature = "mmap")]
        let backing = if header.mode == ContainerMode::Archive {
            match unsafe { memmap2::Mmap::map(&file) } {
                Ok(mmap) => Backing::Mmap(mmap),
                Err(_) => Backing::File(std::sync::Mutex::new(file)),
            }
        } else {
            Backing::File(std::sync::Mutex::new(file))
        };
        #[cfg(not(feature = "mmap"))]
        let backing = Backing::File(std::sync::Mutex::new(file));

        Ok(Reader {
            header,
            config,
            hooks,
            backing,
            index,
        })
    }

    pub fn mode(&self) -> ContainerMode {
        self.header.mode
    }

    fn require_archive(&self) -> Result<()> {
        if self.header.mode != ContainerMode::Archive {
            return Err(Error::ModeMismatch {
                expected: "Archive",
                actual: self.header.mode.name(),
            });
        }
        Ok(())
    }

    /// Resolve a vfs-path to its entry index. Entries that don't collide on
    /// `path_hash` resolve without needing the (possibly encrypted) string
    /// tables; collisions are disambiguated by reconstructing each
    /// candidate's full path, which requires a decrypted index (§4.6).
    fn resolve(&self, canonical: &str, hash: u64) -> Result<usize> {
        let candidates = self
            .index
            .by_hash
            .get(&hash)
            .ok_or_else(|| Error::NotFound(canonical.to_string()))?;
        if let [only] = candidates[..] {
            return Ok(only);
        }
        let strings = self
            .index
            .strings
            .as_ref()
            .ok_or(Error::IndexNotDecryptedError)?;
        candidates
            .iter()
            .copied()
            .find(|&idx| path_for(strings, &self.index.records[idx]) == canonical)
            .ok_or_else(|| Error::NotFound(canonical.to_string()))
    }

    pub fn exists(&self, vfs_path: &str) -> bool {
        let canonical = VfsPath::canonicalize(vfs_path);
        let hash = self.hooks.hash_path(canonical.as_str());
        self.resolve(canonical.as_str(), hash).is_ok()
    }

    /// All path hashes present, regardless of whether the index is decrypted
    /// (path_hash/offset/checksum framing is never encrypted, only the
    /// string tables are — see [`decode_index`]).
    pub fn list_hashes(&self) -> Vec<u64> {
        self.index.records.iter().map(|r| r.path_hash).collect()
    }

    /// Every entry's full descriptor. Errs if the index hasn't been decrypted.
    pub fn list_all(&self) -> Result<Vec<EntryDescriptor>> {
        let strings = self
            .index
            .strings
            .as_ref()
            .ok_or(Error::IndexNotDecryptedError)?;
        Ok(self
            .index
            .records
            .iter()
            .map(|r| descriptor_for(strings, r))
            .collect())
    }

    pub fn get_entry(&self, vfs_path: &str) -> Result<EntryDescriptor> {
        let canonical = VfsPath::canonicalize(vfs_path);
        let hash = self.hooks.hash_path(canonical.as_str());
        let idx = self.resolve(canonical.as_str(), hash)?;
        let record = &self.index.records[idx];
        Ok(EntryDescriptor {
            vfs_path: canonical.as_str().to_string(),
            raw_size: record.raw_size,
            packed_size: record.packed_size,
            algo_id: record.algo_id,
            checksum: record.checksum.clone(),
            data_offset: record.data_offset,
        })
    }

    /// Read and (by default) checksum-verify one entry's full content.
    /// Archive mode only: a Manifest carries no payload to read (§4.1).
    pub fn read(&self, vfs_path: &str) -> Result<Vec<u8>> {
        self.require_archive()?;
        let canonical = VfsPath::canonicalize(vfs_path);
        let hash = self.hooks.hash_path(canonical.as_str());
        let idx = self.resolve(canonical.as_str(), hash)?;
        let record = &self.index.records[idx];

        let data_start = self.header.data_offset + DataHeader::SIZE as u64 + record.data_offset;
        let packed = self.read_data_range(data_start, record.packed_size)?;

        pipeline::read_entry(
            &self.hooks,
            canonical.as_str(),
            &packed,
            record.raw_size,
            record.algo_id,
            &record.checksum,
            self.config.verify_on_read,
        )
    }

    fn read_data_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        match &self.backing {
            #[cfg(feature = "mmap")]
            Backing::Mmap(mmap) => {
                let start = offset as usize;
                let end = start + len as usize;
                if end > mmap.len() {
                    return Err(Error::HeaderCorrupt("entry range past end of file".into()));
                }
                Ok(mmap[start..end].to_vec())
            }
            Backing::File(file) => {
                let mut guard = file.lock().expect("reader file mutex poisoned");
                read_at(&mut *guard, offset, len)
            }
        }
    }

    /// Manifest mode only: compare a local file's checksum against the
    /// stored one without touching any payload (there is none to compare).
    pub fn verify_file(&self, vfs_path: &str, local_path: &Path) -> Result<bool> {
        if self.header.mode != ContainerMode::Manifest {
            return Err(Error::ModeMismatch {
                expected: "Manifest",
                actual: self.header.mode.name(),
            });
        }
        let descriptor = self.get_entry(vfs_path)?;
        let hook = self
            .hooks
            .checksum(self.header.checksum_algo_id)
            .ok_or(Error::UnknownAlgoId(self.header.checksum_algo_id))?;
        let local_checksum = hook.compute_file(local_path)?;
        Ok(local_checksum == descriptor.checksum)
    }

    /// Archive mode only: extract every entry under `output_dir`.
    pub fn extract_all(
        &self,
        output_dir: &Path,
        on_error: crate::batch::OnError,
        cancel: Option<&dyn Fn() -> bool>,
        progress: Option<&mut dyn FnMut(crate::batch::ProgressInfo)>,
    ) -> Result<crate::batch::BatchResult> {
        self.require_archive()?;
        let entries = self.list_all()?;
        crate::batch::run_batch(
            &entries,
            on_error,
            cancel,
            progress,
            |e| e.vfs_path.clone(),
            |entry| {
                let data = self.read(&entry.vfs_path)?;
                let dest = join_output(output_dir, &entry.vfs_path);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| Error::LocalIoError {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                std::fs::write(&dest, &data).map_err(|source| Error::LocalIoError {
                    path: dest.clone(),
                    source,
                })?;
                Ok(entry.raw_size)
            },
        )
    }
}

fn join_output(output_dir: &Path, vfs_path: &str) -> std::path::PathBuf {
    output_dir.join(vfs_path.trim_start_matches('/'))
}

fn path_for(strings: &StringTables, record: &EntryRecord) -> String {
    restore_path(
        &strings.dirs,
        &strings.names,
        &strings.exts,
        record.dir_id,
        record.name_id,
        record.ext_id,
    )
}

fn descriptor_for(strings: &StringTables, record: &EntryRecord) -> EntryDescriptor {
    EntryDescriptor {
        vfs_path: path_for(strings, record),
        raw_size: record.raw_size,
        packed_size: record.packed_size,
        algo_id: record.algo_id,
        checksum: record.checksum.clone(),
        data_offset: record.data_offset,
    }
}

/// Parses the index region written by [`crate::writer::Writer::build`]:
/// `IndexHeader || StringTables || EntryTable`. Only the `StringTables`
/// segment is ever encrypted (§4.6 redesign, see DESIGN.md) — `IndexHeader`
/// and `EntryTable` (which carries `path_hash`, offsets and checksums) are
/// always readable, so hash-keyed lookups work even without the matching
/// [`crate::hooks::IndexCryptoHook`].
fn decode_index(index_bytes: &[u8], hooks: &HookRegistry, index_crypto_id: u16) -> Result<ParsedIndex> {
    let mut header_cursor = std::io::Cursor::new(index_bytes);
    let index_header = IndexHeader::read(&mut header_cursor)?;

    let entry_record_size = index_header.entry_record_size as usize;
    let entry_table_size = entry_record_size * index_header.entry_count as usize;
    if index_bytes.len() < IndexHeader::SIZE + entry_table_size {
        return Err(Error::HeaderCorrupt(
            "index region shorter than its entry table".into(),
        ));
    }
    let string_region_end = index_bytes.len() - entry_table_size;
    let string_region = &index_bytes[IndexHeader::SIZE..string_region_end];
    let entry_region = &index_bytes[string_region_end..];

    let mut entry_cursor = std::io::Cursor::new(entry_region);
    let mut records = Vec::with_capacity(index_header.entry_count as usize);
    for _ in 0..index_header.entry_count {
        records.push(EntryRecord::read(&mut entry_cursor, index_header.checksum_size)?);
    }

    let mut by_hash: HashMap<u64, Vec<usize>> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        by_hash.entry(record.path_hash).or_default().push(i);
    }

    let plaintext_strings = if index_crypto_id != 0 {
        match hooks.index_crypto() {
            Some(hook) if hook.algo_id() == index_crypto_id => Some(hook.decrypt(string_region)?),
            _ => None,
        }
    } else {
        Some(string_region.to_vec())
    };

    let strings = match plaintext_strings {
        Some(plain) => {
            let mut cursor = std::io::Cursor::new(&plain);
            let dirs = read_string_table(&mut cursor, index_header.dir_table_length)?;
            let names = read_string_table(&mut cursor, index_header.name_table_length)?;
            let exts = read_string_table(&mut cursor, index_header.ext_table_length)?;
            Some(StringTables { dirs, names, exts })
        }
        None => None,
    };

    Ok(ParsedIndex {
        strings,
        records,
        by_hash,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::ContainerMode;
    use crate::hooks::{compression_id, Crc32Checksum, HookRegistry};
    use crate::writer::WriterBuilder;
    use std::io::Cursor;

    fn registry() -> HookRegistry {
        HookRegistry::new().with_checksum(Box::new(Crc32Checksum)).unwrap()
    }

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WriterBuilder::new(ContainerMode::Archive)
            .hooks(registry())
            .build();
        for (i, (vfs_path, content)) in files.iter().enumerate() {
            let local = dir.path().join(format!("f{i}"));
            std::fs::write(&local, content).unwrap();
            writer.add_file(&local, vfs_path, 0).unwrap();
        }
        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn reads_back_staged_content() {
        let bytes = build_archive(&[("/a.txt", b"hello"), ("/b/c.bin", b"world!!")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &bytes).unwrap();

        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();
        assert!(reader.exists("/a.txt"));
        assert_eq!(reader.read("/a.txt").unwrap(), b"hello");
        assert_eq!(reader.read("/b/c.bin").unwrap(), b"world!!");
        assert!(!reader.exists("/missing"));
    }

    #[test]
    fn get_entry_returns_descriptor() {
        let bytes = build_archive(&[("/a.txt", b"hello")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &bytes).unwrap();

        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();
        let entry = reader.get_entry("/a.txt").unwrap();
        assert_eq!(entry.vfs_path, "/a.txt");
        assert_eq!(entry.raw_size, 5);
    }

    #[test]
    fn manifest_verify_file_matches_local_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"same bytes").unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        writer.add_file(&local, "/a.txt", 0).unwrap();
        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), buf.into_inner()).unwrap();
        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();
        assert!(reader.verify_file("/a.txt", &local).unwrap());

        std::fs::write(&local, b"different").unwrap();
        assert!(!reader.verify_file("/a.txt", &local).unwrap());
    }

    #[test]
    fn read_rejects_on_manifest_mode() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"hello").unwrap();
        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        writer.add_file(&local, "/a.txt", 0).unwrap();
        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), buf.into_inner()).unwrap();
        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();
        assert!(matches!(reader.read("/a.txt"), Err(Error::ModeMismatch { .. })));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn reads_back_compressed_content() {
        use crate::hooks::ZlibCompression;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.bin");
        let content = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(20);
        std::fs::write(&local, &content).unwrap();

        let hooks = registry().with_compression(Box::new(ZlibCompression)).unwrap();
        let mut writer = WriterBuilder::new(ContainerMode::Archive).hooks(hooks).build();
        writer.add_file(&local, "/a.bin", compression_id::ZLIB).unwrap();
        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), buf.into_inner()).unwrap();
        let hooks = registry().with_compression(Box::new(ZlibCompression)).unwrap();
        let reader = ReaderBuilder::new().hooks(hooks).open(tmp.path()).unwrap();
        assert_eq!(reader.read("/a.bin").unwrap(), content);
    }

    #[test]
    fn extract_all_writes_every_entry_to_disk() {
        let bytes = build_archive(&[("/a.txt", b"hello"), ("/nested/b.txt", b"world")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &bytes).unwrap();
        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let result = reader
            .extract_all(out_dir.path(), crate::batch::OnError::Raise, None, None)
            .unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(
            std::fs::read(out_dir.path().join("a.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(
            std::fs::read(out_dir.path().join("nested/b.txt")).unwrap(),
            b"world"
        );
    }
}
