//! Hook interfaces (§4.1): typed capability contracts for checksum,
//! compression and index-crypto, plus a registry that indexes a caller's
//! hook set by `algo_id`, and built-in implementations for the reserved ids
//! in §6 so the engine is exercisable without an external collaborator.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Reserved checksum algo ids (§6).
pub mod checksum_id {
    pub const NONE: u16 = 0;
    pub const CRC32: u16 = 1;
    pub const MD5: u16 = 2;
    pub const SHA1: u16 = 3;
    pub const SHA256: u16 = 4;
}

/// Reserved compression algo ids (§6).
pub mod compression_id {
    pub const STORED: u16 = 0;
    pub const ZLIB: u16 = 1;
    pub const ZSTD: u16 = 2;
}

pub trait ChecksumHook: Send + Sync {
    fn algo_id(&self) -> u16;
    /// Fixed output size in bytes for every call to `compute`.
    fn output_size(&self) -> u16;
    fn compute(&self, data: &[u8]) -> Vec<u8>;

    /// Optional fast path for a file already on disk; default reads it fully.
    fn compute_file(&self, path: &std::path::Path) -> Result<Vec<u8>> {
        let data = std::fs::read(path).map_err(|source| Error::LocalIoError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.compute(&data))
    }
}

pub trait CompressionHook: Send + Sync {
    fn algo_id(&self) -> u16;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    /// Must return exactly `raw_size` bytes or fail.
    fn decompress(&self, data: &[u8], raw_size: u64) -> Result<Vec<u8>>;
}

pub trait IndexCryptoHook: Send + Sync {
    /// Single id recorded in the FileHeader when this hook is active.
    fn algo_id(&self) -> u16;
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

pub trait PathHashFunc: Send + Sync {
    /// Non-zero when this is a custom function; 0 is reserved for the default.
    fn algo_id(&self) -> u16;
    fn hash(&self, path: &str) -> u64;
}

/// Batch digest provider seam (§4.5, §9 Open Question): the core only
/// defines the contract and the id-reservation convention (100+); it ships
/// no concrete provider since external tool discovery is out of scope (§1).
pub trait BatchDigestProvider: Send + Sync {
    fn algo_id(&self) -> u16;
    fn compute_files_batch(
        &self,
        paths: &[std::path::PathBuf],
    ) -> Result<HashMap<std::path::PathBuf, Vec<u8>>>;
}

/// Indexes a caller's hook set by `algo_id`. Construction fails if two hooks
/// of the same kind share an id.
pub struct HookRegistry {
    checksums: HashMap<u16, Box<dyn ChecksumHook>>,
    compressors: HashMap<u16, Box<dyn CompressionHook>>,
    index_crypto: Option<Box<dyn IndexCryptoHook>>,
    path_hash: Option<Box<dyn PathHashFunc>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry {
            checksums: HashMap::new(),
            compressors: HashMap::new(),
            index_crypto: None,
            path_hash: None,
        }
    }

    pub fn with_checksum(mut self, hook: Box<dyn ChecksumHook>) -> Result<Self> {
        let id = hook.algo_id();
        if self.checksums.insert(id, hook).is_some() {
            return Err(Error::DuplicateAlgoId(id));
        }
        Ok(self)
    }

    pub fn with_compression(mut self, hook: Box<dyn CompressionHook>) -> Result<Self> {
        let id = hook.algo_id();
        if self.compressors.insert(id, hook).is_some() {
            return Err(Error::DuplicateAlgoId(id));
        }
        Ok(self)
    }

    pub fn with_index_crypto(mut self, hook: Box<dyn IndexCryptoHook>) -> Self {
        self.index_crypto = Some(hook);
        self
    }

    pub fn with_path_hash(mut self, hook: Box<dyn PathHashFunc>) -> Self {
        self.path_hash = Some(hook);
        self
    }

    pub fn checksum(&self, id: u16) -> Option<&dyn ChecksumHook> {
        self.checksums.get(&id).map(|b| b.as_ref())
    }

    pub fn compression(&self, id: u16) -> Option<&dyn CompressionHook> {
        self.compressors.get(&id).map(|b| b.as_ref())
    }

    pub fn index_crypto(&self) -> Option<&dyn IndexCryptoHook> {
        self.index_crypto.as_deref()
    }

    /// The checksum hook this registry is configured to use for new writes,
    /// if any (the first registered, since a Writer is built for one mode).
    pub fn active_checksum(&self) -> Option<&dyn ChecksumHook> {
        self.checksums.values().next().map(|b| b.as_ref())
    }

    pub fn path_hash_id(&self) -> u16 {
        self.path_hash.as_deref().map_or(0, PathHashFunc::algo_id)
    }

    pub fn hash_path(&self, path: &str) -> u64 {
        match &self.path_hash {
            Some(f) => f.hash(path),
            None => fnv64_path(path),
        }
    }
}

/// Default deterministic path hash: FNV-1a 64 over the canonical UTF-8 bytes (§6).
pub fn fnv64_path(path: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for b in path.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

// ---------------------------------------------------------------------
// Built-in checksum hooks
// ---------------------------------------------------------------------

pub struct Crc32Checksum;
impl ChecksumHook for Crc32Checksum {
    fn algo_id(&self) -> u16 {
        checksum_id::CRC32
    }
    fn output_size(&self) -> u16 {
        4
    }
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        crc32fast::hash(data).to_le_bytes().to_vec()
    }
}

pub struct Md5Checksum;
impl ChecksumHook for Md5Checksum {
    fn algo_id(&self) -> u16 {
        checksum_id::MD5
    }
    fn output_size(&self) -> u16 {
        16
    }
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        use md5::{Digest, Md5};
        Md5::digest(data).to_vec()
    }
}

pub struct Sha1Checksum;
impl ChecksumHook for Sha1Checksum {
    fn algo_id(&self) -> u16 {
        checksum_id::SHA1
    }
    fn output_size(&self) -> u16 {
        20
    }
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        use sha1::{Digest, Sha1};
        Sha1::digest(data).to_vec()
    }
}

pub struct Sha256Checksum;
impl ChecksumHook for Sha256Checksum {
    fn algo_id(&self) -> u16 {
        checksum_id::SHA256
    }
    fn output_size(&self) -> u16 {
        32
    }
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        use sha2::{Digest, Sha256};
        Sha256::digest(data).to_vec()
    }
}

// ---------------------------------------------------------------------
// Built-in compression hooks
// ---------------------------------------------------------------------

#[cfg(feature = "compression")]
pub struct ZlibCompression;
#[cfg(feature = "compression")]
impl CompressionHook for ZlibCompression {
    fn algo_id(&self) -> u16 {
        compression_id::ZLIB
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
    fn decompress(&self, data: &[u8], raw_size: u64) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(raw_size as usize);
        decoder.read_to_end(&mut out)?;
        if out.len() as u64 != raw_size {
            return Err(Error::Other(format!(
                "zlib: expected {raw_size} bytes, got {}",
                out.len()
            )));
        }
        Ok(out)
    }
}

#[cfg(feature = "compression")]
pub struct ZstdCompression;
#[cfg(feature = "compression")]
impl CompressionHook for ZstdCompression {
    fn algo_id(&self) -> u16 {
        compression_id::ZSTD
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::encode_all(data, 0)?)
    }
    fn decompress(&self, data: &[u8], raw_size: u64) -> Result<Vec<u8>> {
        let out = zstd::stream::decode_all(data)?;
        if out.len() as u64 != raw_size {
            return Err(Error::Other(format!(
                "zstd: expected {raw_size} bytes, got {}",
                out.len()
            )));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------
// Built-in index-crypto hook
// ---------------------------------------------------------------------

/// AES-256 block crypto keyed by the caller, applied independently to each
/// 16-byte block (mirroring the teacher's own index-crypto implementation).
/// The plaintext length is framed ahead of the data before block-padding so
/// `decrypt` can strip the padding and return exactly the original bytes.
/// This is a policy example, not a security recommendation — see §1.
#[cfg(feature = "encryption")]
pub struct AesIndexCrypto {
    key: aes::Aes256,
}

#[cfg(feature = "encryption")]
impl AesIndexCrypto {
    pub fn new(key: aes::Aes256) -> Self {
        AesIndexCrypto { key }
    }
}

#[cfg(feature = "encryption")]
impl IndexCryptoHook for AesIndexCrypto {
    fn algo_id(&self) -> u16 {
        1
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        use aes::cipher::BlockEncrypt;
        let mut framed = Vec::with_capacity(8 + data.len());
        framed.extend_from_slice(&(data.len() as u64).to_le_bytes());
        framed.extend_from_slice(data);
        let mut buf = pad_to_block(&framed);
        for chunk in buf.chunks_mut(16) {
            self.key.encrypt_block(aes::Block::from_mut_slice(chunk));
        }
        Ok(buf)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() % 16 != 0 {
            return Err(Error::IndexDecryptError(
                "ciphertext is not a multiple of the block size".into(),
            ));
        }
        use aes::cipher::BlockDecrypt;
        let mut buf = data.to_vec();
        for chunk in buf.chunks_mut(16) {
            self.key.decrypt_block(aes::Block::from_mut_slice(chunk));
        }
        if buf.len() < 8 {
            return Err(Error::IndexDecryptError(
                "decrypted buffer shorter than its length prefix".into(),
            ));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[..8]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        if len > buf.len() - 8 {
            return Err(Error::IndexDecryptError(
                "recorded plaintext length exceeds decrypted buffer".into(),
            ));
        }
        Ok(buf[8..8 + len].to_vec())
    }
}

#[cfg(feature = "encryption")]
fn pad_to_block(data: &[u8]) -> Vec<u8> {
    let pad = (16 - (data.len() % 16)) % 16;
    let mut buf = data.to_vec();
    buf.resize(buf.len() + pad, 0);
    buf
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fnv64_is_deterministic_and_sensitive_to_case() {
        assert_eq!(fnv64_path("/a/b.txt"), fnv64_path("/a/b.txt"));
        assert_ne!(fnv64_path("/a/b.txt"), fnv64_path("/a/B.txt"));
    }

    #[test]
    fn registry_rejects_duplicate_checksum_ids() {
        let registry = HookRegistry::new()
            .with_checksum(Box::new(Crc32Checksum))
            .unwrap();
        assert!(registry.with_checksum(Box::new(Crc32Checksum)).is_err());
    }

    #[test]
    fn checksum_builtins_produce_fixed_size_output() {
        for hook in [
            Box::new(Crc32Checksum) as Box<dyn ChecksumHook>,
            Box::new(Md5Checksum),
            Box::new(Sha1Checksum),
            Box::new(Sha256Checksum),
        ] {
            let digest = hook.compute(b"hello world");
            assert_eq!(digest.len(), hook.output_size() as usize);
        }
    }

    #[cfg(feature = "compression")]
    #[test]
    fn zlib_round_trips() {
        let hook = ZlibCompression;
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbbb".repeat(100);
        let packed = hook.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        let restored = hook.decompress(&packed, data.len() as u64).unwrap();
        assert_eq!(restored, data);
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn aes_index_crypto_round_trips() {
        use aes::cipher::KeyInit;
        let key = aes::Aes256::new(&Default::default());
        let hook = AesIndexCrypto::new(key);
        let data = b"some index bytes that are not block aligned!";
        let ciphertext = hook.encrypt(data).unwrap();
        assert_eq!(ciphertext.len() % 16, 0);
        let plaintext = hook.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, data);
    }
}
