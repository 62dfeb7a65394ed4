//! GrimoireVFS: a self-contained binary container format engine.
//!
//! Two on-disk modes share one binary layout: Manifest containers record
//! path metadata and checksums only, Archive containers additionally embed
//! payloads. Checksum, compression, index-crypto and path-hash behavior are
//! all pluggable through [`hooks::HookRegistry`]; the crate ships concrete
//! implementations for every reserved algo id so it is useful standalone.

mod batch;
mod codec;
mod convert;
mod entry;
mod error;
mod header;
mod hooks;
mod path;
mod pipeline;
mod reader;
mod writer;

pub use batch::{BatchResult, FailedFile, OnError, ProgressInfo};
pub use convert::archive_to_manifest;
pub use entry::EntryDescriptor;
pub use error::{Error, Result};
pub use header::{ContainerMode, DEFAULT_MAGIC, FORMAT_VERSION};
pub use hooks::{
    checksum_id, compression_id, fnv64_path, BatchDigestProvider, ChecksumHook, CompressionHook,
    Crc32Checksum, HookRegistry, IndexCryptoHook, Md5Checksum, PathHashFunc, Sha1Checksum,
    Sha256Checksum,
};
#[cfg(feature = "compression")]
pub use hooks::{ZlibCompression, ZstdCompression};
#[cfg(feature = "encryption")]
pub use hooks::AesIndexCrypto;
pub use path::VfsPath;
pub use reader::{Reader, ReaderBuilder, ReaderConfig};
pub use writer::{Writer, WriterBuilder, WriterConfig};

#[cfg(test)]
mod integration_test {
    use super::*;
    use std::io::Cursor;

    fn registry() -> HookRegistry {
        HookRegistry::new().with_checksum(Box::new(Crc32Checksum)).unwrap()
    }

    #[test]
    fn end_to_end_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("doc.txt");
        std::fs::write(&local, b"manifest body").unwrap();

        let mut writer = WriterBuilder::new(ContainerMode::Manifest)
            .hooks(registry())
            .build();
        writer.add_file(&local, "/doc.txt", 0).unwrap();

        let mut buf = Cursor::new(Vec::new());
        writer.build(&mut buf).unwrap();

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), buf.into_inner()).unwrap();
        let reader = ReaderBuilder::new().hooks(registry()).open(tmp.path()).unwrap();
        assert!(reader.verify_file("/doc.txt", &local).unwrap());
    }
}
