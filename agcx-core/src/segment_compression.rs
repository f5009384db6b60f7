// Segment compression
//
// Raw segments choose between tuple packing and plain zstd by how
// repetitive they are; edit-script chunks are always plain zstd.

use crate::tuple_packing::{bytes_to_tuples, tuples_to_bytes};
use crate::zstd_pool;
use agcx_common::{AgcError, Contig, PackedBlock, Result};

/// Default level for edit-script chunks
pub const DELTA_COMPRESSION_LEVEL: i32 = 17;

const REF_TUPLES_COMPRESSION_LEVEL: i32 = 13;
const REF_PLAIN_COMPRESSION_LEVEL: i32 = 19;

const REPETITIVENESS_THRESHOLD: f64 = 0.5;

/// Part metadata marker of a plain zstd segment
pub const MARKER_PLAIN: u64 = 0;
/// Part metadata marker of a tuple-packed segment
pub const MARKER_TUPLES: u64 = 1;

/// Best fraction of positions equal to the base `offset` ahead, for
/// offsets 4..32, counted against unambiguous bases only
fn check_repetitiveness(data: &[u8]) -> f64 {
    let mut best_frac = 0.0;

    for offset in 4..32 {
        if data.len() <= offset {
            break;
        }

        let mut cnt = 0usize;
        let mut cur_size = 0usize;
        for j in 0..data.len() - offset {
            if data[j] == data[j + offset] {
                cnt += 1;
            }
            if data[j] < 4 {
                cur_size += 1;
            }
        }

        let frac = if cur_size > 0 {
            cnt as f64 / cur_size as f64
        } else {
            0.0
        };

        if frac > best_frac {
            best_frac = frac;
            if best_frac >= REPETITIVENESS_THRESHOLD {
                break;
            }
        }
    }

    best_frac
}

/// Compress one raw segment; returns the block and its marker
pub fn compress_reference_segment(data: &[u8]) -> Result<(PackedBlock, u64)> {
    let repetitiveness = check_repetitiveness(data);

    if repetitiveness < REPETITIVENESS_THRESHOLD {
        let tuples = bytes_to_tuples(data);
        let compressed = zstd_pool::compress_pooled(&tuples, REF_TUPLES_COMPRESSION_LEVEL)?;
        log::trace!(
            "raw segment len={} rep={repetitiveness:.3} -> tuples {} bytes",
            data.len(),
            compressed.len()
        );
        Ok((compressed, MARKER_TUPLES))
    } else {
        let compressed = zstd_pool::compress_pooled(data, REF_PLAIN_COMPRESSION_LEVEL)?;
        log::trace!(
            "raw segment len={} rep={repetitiveness:.3} -> plain {} bytes",
            data.len(),
            compressed.len()
        );
        Ok((compressed, MARKER_PLAIN))
    }
}

/// Decompress one raw segment according to its marker
pub fn decompress_segment_with_marker(
    compressed: &[u8],
    marker: u64,
    expected_len: usize,
) -> Result<Contig> {
    let data = match marker {
        MARKER_PLAIN => zstd_pool::decompress_pooled(compressed, expected_len)?,
        MARKER_TUPLES => tuples_to_bytes(&zstd_pool::decompress_all(compressed)?)?,
        other => {
            return Err(AgcError::corrupted(format!(
                "unknown segment marker {other}"
            )))
        }
    };

    if data.len() != expected_len {
        return Err(AgcError::corrupted(format!(
            "segment holds {} bases, expected {expected_len}",
            data.len()
        )));
    }
    Ok(data)
}

/// Compress one encoded edit-script chunk
pub fn compress_delta_chunk(encoded: &[u8], level: i32) -> Result<PackedBlock> {
    zstd_pool::compress_pooled(encoded, level)
}

/// Decompress one encoded edit-script chunk of known length
pub fn decompress_delta_chunk(compressed: &[u8], raw_len: u64) -> Result<Vec<u8>> {
    let raw_len = usize::try_from(raw_len)
        .map_err(|_| AgcError::corrupted(format!("chunk length {raw_len} too large")))?;
    zstd_pool::decompress_pooled(compressed, raw_len)
}
