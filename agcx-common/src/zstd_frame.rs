// Sized zstd frames
// Uncompressed sizes come from part metadata, so they are checked against
// the frame itself before any buffer is allocated

use crate::error::{AgcError, Result};

/// Upper bound on the output of one compressed byte (RLE blocks reach 2^15)
const MAX_EXPANSION: u64 = 1 << 16;

/// Reject a claimed uncompressed size that the frame cannot produce
pub fn check_frame_size(packed: &[u8], claimed: u64) -> Result<()> {
    if claimed > (packed.len() as u64).saturating_mul(MAX_EXPANSION) {
        return Err(AgcError::corrupted(format!(
            "{} packed bytes cannot hold {claimed} bytes",
            packed.len()
        )));
    }

    match zstd::zstd_safe::get_frame_content_size(packed) {
        Ok(Some(size)) if size == claimed => Ok(()),
        Ok(Some(size)) => Err(AgcError::corrupted(format!(
            "frame holds {size} bytes, metadata says {claimed}"
        ))),
        // Size not recorded in the header; the expansion bound still applies
        Ok(None) => Ok(()),
        Err(_) => Err(AgcError::corrupted("not a zstd frame")),
    }
}

/// Decompress a frame of exactly `claimed` bytes
pub fn decompress_exact(packed: &[u8], claimed: u64) -> Result<Vec<u8>> {
    check_frame_size(packed, claimed)?;
    let capacity = usize::try_from(claimed)
        .map_err(|_| AgcError::corrupted(format!("size {claimed} does not fit in memory")))?;

    let data = zstd::bulk::decompress(packed, capacity)
        .map_err(|e| AgcError::corrupted(format!("ZSTD decompression failed: {e}")))?;
    if data.len() != capacity {
        return Err(AgcError::corrupted(format!(
            "decompressed {} bytes, expected {capacity}",
            data.len()
        )));
    }
    Ok(data)
}
