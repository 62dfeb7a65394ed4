//! Writer (§4.5): stages entries in memory, then emits a two-pass,
//! seekable output — a placeholder header, index region, data region, then a
//! back-patched header once every offset is known.

use crate::codec::crc32;
use crate::entry::{write_string_table, EntryRecord};
use crate::error::{Error, Result};
use crate::header::{ContainerMode, DataHeader, FileHeader, IndexHeader, DEFAULT_MAGIC, FORMAT_VERSION};
use crate::hooks::HookRegistry;
use crate::path::{StringInterner, VfsPath};
use crate::pipeline;
use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub magic: [u8; 4],
    pub mode: ContainerMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            magic: DEFAULT_MAGIC,
            mode: ContainerMode::Manifest,
        }
    }
}

#[derive(Default)]
pub struct WriterBuilder {
    config: WriterConfig,
    hooks: HookRegistry,
}

impl WriterBuilder {
    pub fn new(mode: ContainerMode) -> Self {
        WriterBuilder {
            config: WriterConfig {
                mode,
                ..WriterConfig::default()
            },
            hooks: HookRegistry::new(),
        }
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.config.magic = magic;
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Writer {
        Writer {
            config: self.config,
            hooks: self.hooks,
            dir_interner: StringInterner::new(),
            name_interner: StringInterner::new(),
            ext_interner: StringInterner::new(),
            entries: vec![],
            staged_paths: HashSet::new(),
        }
    }
}

struct StagedEntry {
    vfs_path: String,
    path_hash: u64,
    dir_id: u32,
    name_id: u32,
    ext_id: u32,
    raw_size: u64,
    packed_size: u64,
    algo_id: u16,
    checksum: Vec<u8>,
    /// `None` in Manifest mode; the packed payload bytes in Archive mode.
    packed_data: Option<Vec<u8>>,
}

/// Accumulates staged entries in memory; nothing touches the output sink
/// until [`Writer::build`] (§4.5: "the writer requires a seekable sink").
pub struct Writer {
    config: WriterConfig,
    hooks: HookRegistry,
    dir_interner: StringInterner,
    name_interner: StringInterner,
    ext_interner: StringInterner,
    entries: Vec<StagedEntry>,
    staged_paths: HashSet<String>,
}

impl Writer {
    pub fn mode(&self) -> ContainerMode {
        self.config.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn staged_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.vfs_path.as_str())
    }

    /// Stage a single local file under `vfs_path`. `algo_id` selects a
    /// compression hook for Archive mode; ignored (stored as 0) in Manifest
    /// mode, since a Manifest carries no payload to compress (§4.1 invariant).
    pub fn add_file(&mut self, local_path: &Path, vfs_path: &str, algo_id: u16) -> Result<()> {
        let raw = std::fs::read(local_path).map_err(|source| Error::LocalIoError {
            path: local_path.to_path_buf(),
            source,
        })?;
        self.add_bytes(vfs_path, raw, algo_id)
    }

    /// Stage already-in-memory bytes under `vfs_path`, bypassing local disk
    /// I/O entirely — used by the cross-mode converter.
    pub fn add_bytes(&mut self, vfs_path: &str, raw: Vec<u8>, algo_id: u16) -> Result<()> {
        self.add_bytes_with_checksum(vfs_path, raw, algo_id, None)
    }

    /// Like [`Writer::add_bytes`], but accepts a precomputed checksum instead
    /// of running the registered hook — the seam a [`crate::hooks::BatchDigestProvider`]
    /// staging path uses to skip redundant per-file hashing.
    pub fn add_bytes_with_checksum(
        &mut self,
        vfs_path: &str,
        raw: Vec<u8>,
        algo_id: u16,
        precomputed_checksum: Option<Vec<u8>>,
    ) -> Result<()> {
        let canonical = VfsPath::canonicalize(vfs_path);
        let key = canonical.as_str().to_string();
        if self.staged_paths.contains(&key) {
            return Err(Error::DuplicatePath(key));
        }

        self.stage_raw(canonical, raw, algo_id, precomputed_checksum)?;
        self.staged_paths.insert(key);
        Ok(())
    }

    fn stage_raw(
        &mut self,
        canonical: VfsPath,
        raw: Vec<u8>,
        algo_id: u16,
        precomputed_checksum: Option<Vec<u8>>,
    ) -> Result<()> {
        let path_hash = self.hooks.hash_path(canonical.as_str());
        let (dir, name, ext) = canonical.split();
        let dir_id = self.dir_interner.intern(&dir);
        let name_id = self.name_interner.intern(&name);
        let ext_id = self.ext_interner.intern(&ext);

        let entry = match self.config.mode {
            ContainerMode::Manifest => {
                let checksum = match precomputed_checksum {
                    Some(c) => c,
                    None => match self.hooks.active_checksum() {
                        Some(hook) => hook.compute(&raw),
                        None => Vec::new(),
                    },
                };
                StagedEntry {
                    vfs_path: canonical.as_str().to_string(),
                    path_hash,
                    dir_id,
                    name_id,
                    ext_id,
                    raw_size: raw.len() as u64,
                    packed_size: raw.len() as u64,
                    algo_id: 0,
                    checksum,
                    packed_data: None,
                }
            }
            ContainerMode::Archive => {
                let mut written = pipeline::write_entry(&self.hooks, &raw, algo_id)?;
                if let Some(checksum) = precomputed_checksum {
                    written.checksum = checksum;
                }
                StagedEntry {
                    vfs_path: canonical.as_str().to_string(),
                    path_hash,
                    dir_id,
                    name_id,
                    ext_id,
                    raw_size: written.raw_size,
                    packed_size: written.packed.len() as u64,
                    algo_id: written.algo_id,
                    checksum: written.checksum,
                    packed_data: Some(written.packed),
                }
            }
        };

        self.entries.push(entry);
        Ok(())
    }

    /// Stage every file under `local_dir`, mounted under `mount_point`.
    pub fn add_dir(&mut self, local_dir: &Path, mount_point: &str, algo_id: u16) -> Result<()> {
        for path in crate::batch::walk_files(local_dir, &[])? {
            let rel = path.strip_prefix(local_dir).unwrap_or(&path);
            let vfs_path = join_mount(mount_point, rel);
            self.add_file(&path, &vfs_path, algo_id)?;
        }
        Ok(())
    }

    /// Stage a caller-provided batch of `(local_path, vfs_path, algo_id)`
    /// under the given per-file error policy (§4.7).
    pub fn add_files_batch(
        &mut self,
        items: &[(std::path::PathBuf, String, u16)],
        on_error: crate::batch::OnError,
        cancel: Option<&dyn Fn() -> bool>,
        progress: Option<&mut dyn FnMut(crate::batch::ProgressInfo)>,
    ) -> Result<crate::batch::BatchResult> {
        crate::batch::run_batch(
            items,
            on_error,
            cancel,
            progress,
            |(_, vfs_path, _)| vfs_path.clone(),
            |(local, vfs_path, algo_id)| {
                let len_before = self.entries.len();
                self.add_file(local, vfs_path, *algo_id)?;
                let added = &self.entries[len_before];
                Ok(added.raw_size)
            },
        )
    }

    /// Recursively stage `local_dir` under `mount_point` using the same
    /// batch accounting and error policy as [`Writer::add_files_batch`].
    pub fn add_dir_batch(
        &mut self,
        local_dir: &Path,
        mount_point: &str,
        algo_id: u16,
        exclude: &[String],
        on_error: crate::batch::OnError,
        cancel: Option<&dyn Fn() -> bool>,
        progress: Option<&mut dyn FnMut(crate::batch::ProgressInfo)>,
    ) -> Result<crate::batch::BatchResult> {
        let files = crate::batch::walk_files(local_dir, exclude)?;
        let items: Vec<_> = files
            .into_iter()
            .map(|path| {
                let rel = path.strip_prefix(local_dir).unwrap_or(&path).to_path_buf();
                let vfs_path = join_mount(mount_point, &rel);
                (path, vfs_path, algo_id)
            })
            .collect();
        self.add_files_batch(&items, on_error, cancel, progress)
    }

    /// Like [`Writer::add_dir_batch`], but consults `provider` for a
    /// batch-computed checksum before falling back to per-file hashing
    /// (§9 Open Question: provider ids are conventionally 100+, but the
    /// core never inspects the id — it trusts whatever bytes come back).
    pub fn add_dir_batch_with_provider(
        &mut self,
        local_dir: &Path,
        mount_point: &str,
        algo_id: u16,
        exclude: &[String],
        provider: Option<&dyn crate::hooks::BatchDigestProvider>,
        on_error: crate::batch::OnError,
        cancel: Option<&dyn Fn() -> bool>,
        progress: Option<&mut dyn FnMut(crate::batch::ProgressInfo)>,
    ) -> Result<crate::batch::BatchResult> {
        let files = crate::batch::walk_files(local_dir, exclude)?;
        let precomputed = match provider {
            Some(p) => p.compute_files_batch(&files).unwrap_or_default(),
            None => std::collections::HashMap::new(),
        };
        let items: Vec<_> = files
            .into_iter()
            .map(|path| {
                let rel = path.strip_prefix(local_dir).unwrap_or(&path).to_path_buf();
                let vfs_path = join_mount(mount_point, &rel);
                (path, vfs_path, algo_id)
            })
            .collect();

        crate::batch::run_batch(
            &items,
            on_error,
            cancel,
            progress,
            |(_, vfs_path, _)| vfs_path.clone(),
            |(local, vfs_path, algo_id)| {
                let raw = std::fs::read(local).map_err(|source| Error::LocalIoError {
                    path: local.clone(),
                    source,
                })?;
                let len = raw.len() as u64;
                let checksum = precomputed.get(local).cloned();
                self.add_bytes_with_checksum(vfs_path, raw, *algo_id, checksum)?;
                Ok(len)
            },
        )
    }

    /// Serialize the staged entries and write the container to `sink`.
    /// Entries are sorted ascending by `path_hash`; Rust's stable sort keeps
    /// ties in insertion order, matching §3's EntryTable ordering rule.
    pub fn build<W: Write + Seek>(mut self, mut sink: W) -> Result<()> {
        self.entries.sort_by_key(|e| e.path_hash);

        // Reserve the header region; real contents are back-patched at the end.
        sink.write_all(&[0u8; FileHeader::SIZE])?;

        let checksum_size = self
            .hooks
            .active_checksum()
            .map(|h| h.output_size())
            .unwrap_or(0);
        let entry_record_size = EntryRecord::serialized_size(checksum_size);

        // Data offsets are assigned arithmetically; the data region itself is
        // written only after the index, so no placeholder bytes are needed.
        let mut data_cursor = 0u64;
        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let data_offset = match self.config.mode {
                ContainerMode::Manifest => 0,
                ContainerMode::Archive => {
                    let offset = data_cursor;
                    data_cursor += entry.packed_size;
                    offset
                }
            };
            records.push(EntryRecord {
                path_hash: entry.path_hash,
                dir_id: entry.dir_id,
                name_id: entry.name_id,
                ext_id: entry.ext_id,
                raw_size: entry.raw_size,
                packed_size: entry.packed_size,
                data_offset,
                algo_id: entry.algo_id,
                flags: 0,
                checksum: pad_checksum(&entry.checksum, checksum_size),
            });
        }

        // Only the string tables are subject to index-crypto: the IndexHeader
        // and EntryTable stay in the clear so that `list_hashes`/`read(known_path)`
        // keep working on a container opened without the crypto hook (§4.6,
        // §8 scenario 3), while `list_all` (which needs the path strings)
        // still gates on it. See DESIGN.md for the rationale.
        let mut string_bytes = Vec::new();
        let dir_table_length = write_string_table(&mut string_bytes, self.dir_interner.ordered())?;
        let name_table_length = write_string_table(&mut string_bytes, self.name_interner.ordered())?;
        let ext_table_length = write_string_table(&mut string_bytes, self.ext_interner.ordered())?;

        let string_region = match self.hooks.index_crypto() {
            Some(crypto) => crypto.encrypt(&string_bytes)?,
            None => string_bytes,
        };
        let index_crypto_id = self.hooks.index_crypto().map(|h| h.algo_id()).unwrap_or(0);

        let index_header = IndexHeader {
            entry_count: records.len() as u32,
            checksum_size,
            dir_table_length,
            name_table_length,
            ext_table_length,
            entry_record_size,
        };

        let mut index_bytes = Vec::new();
        index_header.write(&mut index_bytes)?;
        index_bytes.extend_from_slice(&string_region);
        for record in &records {
            record.write(&mut index_bytes, checksum_size)?;
        }

        sink.write_all(&index_bytes)?;

        let (data_offset, data_length) = match self.config.mode {
            ContainerMode::Manifest => (0, 0),
            ContainerMode::Archive => {
                let total_uncompressed: u64 = self.entries.iter().map(|e| e.raw_size).sum();
                let total_packed: u64 = self.entries.iter().map(|e| e.packed_size).sum();
                let data_header = DataHeader {
                    total_uncompressed_size: total_uncompressed,
                    total_packed_size: total_packed,
                };
                let offset = FileHeader::SIZE as u64 + index_bytes.len() as u64;
                let mut written = DataHeader::SIZE as u64;
                data_header.write(&mut sink)?;
                for entry in &self.entries {
                    let packed = entry
                        .packed_data
                        .as_ref()
                        .expect("archive entries always carry packed data");
                    sink.write_all(packed)?;
                    written += packed.len() as u64;
                }
                (offset, written)
            }
        };

        let checksum_algo_id = self.hooks.active_checksum().map(|h| h.algo_id()).unwrap_or(0);
        // index_length tracks the bytes actually written to the sink
        // (ciphertext length if index-crypto is active).
        let header = FileHeader {
            magic: self.config.magic,
            format_version: FORMAT_VERSION,
            mode: self.config.mode,
            index_crypto_id,
            checksum_algo_id,
            path_hash_algo_id: self.hooks.path_hash_id(),
            index_offset: FileHeader::SIZE as u64,
            index_length: index_bytes.len() as u64,
            data_offset,
            data_length,
        };

        sink.seek(SeekFrom::Start(0))?;
        header.write(&mut sink)?;
        sink.flush()?;
        Ok(())
    }

    /// Convenience for the common case: build directly into a new file at
    /// `path`. The partial file is removed if assembly fails partway through.
    pub fn build_to_path(self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|source| Error::LocalIoError {
            path: path.to_path_buf(),
            source,
        })?;
        let result = self.build(file);
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }
}

fn pad_checksum(checksum: &[u8], size: u16) -> Vec<u8> {
    let mut buf = checksum.to_vec();
    buf.resize(size as usize, 0);
    buf
}

fn join_mount(mount_point: &str, rel: &Path) -> String {
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    let mount = mount_point.trim_end_matches('/');
    if mount.is_empty() {
        format!("/{rel_str}")
    } else {
        format!("{mount}/{rel_str}")
    }
}

/// A deterministic CRC32 over staged raw bytes, used by tests that need a
/// cheap stand-in for a full checksum hook without pulling one in.
#[cfg(test)]
fn quick_crc(data: &[u8]) -> u32 {
    crc32(data)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::ContainerMode;
    use crate::hooks::{Crc32Checksum, HookRegistry};
    use std::io::Cursor;

    fn registry() -> HookRegistry {
        HookRegistry::new().with_checksum(Box::new(Crc32Checksum)).unwrap()
    }

    #[test]
    fn rejects_duplicate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        writer.add_file(&file, "/a.txt", 0).unwrap();
        let err = writer.add_file(&file, "/a.txt", 0).unwrap_err();
        assert!(matches!(err, Error::DuplicatePath(_)));
    }

    #[test]
    fn manifest_build_round_trips_through_header() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello manifest").unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        writer.add_file(&file, "/a.txt", 0).unwrap();

        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        buf.set_position(0);
        let header = FileHeader::read(&mut buf, DEFAULT_MAGIC).unwrap();
        assert_eq!(header.mode, ContainerMode::Manifest);
        assert_eq!(header.data_length, 0);
        assert_eq!(header.index_offset, FileHeader::SIZE as u64);
        assert!(quick_crc(b"hello manifest") != 0);
    }

    #[test]
    fn archive_build_lays_out_data_region_after_index() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        std::fs::write(&file, vec![7u8; 64]).unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Archive)
            .hooks(registry())
            .build();
        writer.add_file(&file, "/a.bin", 0).unwrap();

        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        buf.set_position(0);
        let header = FileHeader::read(&mut buf, DEFAULT_MAGIC).unwrap();
        assert_eq!(header.data_offset, header.index_offset + header.index_length);
        assert!(header.data_length > 0);
    }

    struct FixedDigestProvider;
    impl crate::hooks::BatchDigestProvider for FixedDigestProvider {
        fn algo_id(&self) -> u16 {
            100
        }
        fn compute_files_batch(
            &self,
            paths: &[std::path::PathBuf],
        ) -> Result<std::collections::HashMap<std::path::PathBuf, Vec<u8>>> {
            Ok(paths
                .iter()
                .map(|p| (p.clone(), vec![0xAB, 0xCD, 0xEF, 0x01]))
                .collect())
        }
    }

    #[test]
    fn batch_digest_provider_overrides_per_file_hashing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"two").unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        let provider = FixedDigestProvider;
        let result = writer
            .add_dir_batch_with_provider(
                dir.path(),
                "/",
                0,
                &[],
                Some(&provider),
                crate::batch::OnError::Raise,
                None,
                None,
            )
            .unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(writer.len(), 2);
    }
}
