//! The per-entry write/read pipeline (§4.4): checksum always runs over raw
//! bytes, compression is optional and applied to the packed payload.

use crate::error::{Error, Result};
use crate::hooks::HookRegistry;

pub struct WrittenEntry {
    pub raw_size: u64,
    pub packed: Vec<u8>,
    pub algo_id: u16,
    pub checksum: Vec<u8>,
}

/// Pipeline write step: checksum the raw bytes, optionally compress, and
/// hand back everything the Writer needs to place in the data region.
pub fn write_entry(hooks: &HookRegistry, raw: &[u8], algo_id: u16) -> Result<WrittenEntry> {
    let raw_size = raw.len() as u64;

    let packed = if algo_id != 0 {
        let compressor = hooks
            .compression(algo_id)
            .ok_or(Error::UnknownAlgoId(algo_id))?;
        compressor.compress(raw)?
    } else {
        raw.to_vec()
    };

    let checksum = match hooks.active_checksum() {
        Some(hook) => hook.compute(raw),
        None => Vec::new(),
    };

    Ok(WrittenEntry {
        raw_size,
        packed,
        algo_id,
        checksum,
    })
}

/// Pipeline read step: decompress if needed, then optionally verify the
/// checksum against the decompressed bytes.
pub fn read_entry(
    hooks: &HookRegistry,
    path: &str,
    packed: &[u8],
    raw_size: u64,
    algo_id: u16,
    stored_checksum: &[u8],
    verify: bool,
) -> Result<Vec<u8>> {
    let raw = if algo_id != 0 {
        let compressor = hooks
            .compression(algo_id)
            .ok_or(Error::UnknownAlgoId(algo_id))?;
        compressor.decompress(packed, raw_size).map_err(|e| {
            Error::DecompressError {
                path: path.to_string(),
                detail: e.to_string(),
            }
        })?
    } else {
        packed.to_vec()
    };

    if verify {
        if let Some(hook) = hooks.active_checksum() {
            if !stored_checksum.is_empty() && hook.compute(&raw) != stored_checksum {
                return Err(Error::ChecksumMismatch {
                    path: path.to_string(),
                });
            }
        }
    }

    Ok(raw)
}
