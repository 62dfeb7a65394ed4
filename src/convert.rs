//! Cross-mode converter (§4.8): turns an Archive reader into a Manifest
//! writer covering the same entries, discarding payloads and compression.

use crate::error::{Error, Result};
use crate::header::ContainerMode;
use crate::hooks::HookRegistry;
use crate::reader::Reader;
use crate::writer::{Writer, WriterBuilder};

/// Build a Manifest-mode `Writer` staged with every entry from `reader`,
/// re-checksummed over the decompressed bytes. The reader's hook set is
/// reused so the two containers agree on checksum algo and path hashing.
pub fn archive_to_manifest(reader: &Reader, hooks: HookRegistry) -> Result<Writer> {
    if reader.mode() != ContainerMode::Archive {
        return Err(Error::ModeMismatch {
            expected: "Archive",
            actual: reader.mode().name(),
        });
    }

    let entries = reader.list_all()?;
    let mut writer = WriterBuilder::new(ContainerMode::Manifest).hooks(hooks).build();

    for entry in entries {
        let data = reader.read(&entry.vfs_path)?;
        writer.add_bytes(&entry.vfs_path, data, 0)?;
    }

    Ok(writer)
}
