// ZSTD context pooling
//
// One compression context per thread, reused for every call; the level is a
// per-call argument, so raw segments and delta chunks share the same context.

use agcx_common::zstd_frame::decompress_exact;
use agcx_common::{AgcError, PackedBlock, Result};
use std::cell::RefCell;
use std::io;

thread_local! {
    static ZSTD_CCTX: RefCell<Option<zstd::zstd_safe::CCtx<'static>>> =
        const { RefCell::new(None) };
}

/// Compress with the calling thread's context
pub fn compress_pooled(data: &[u8], level: i32) -> Result<PackedBlock> {
    ZSTD_CCTX.with(|ctx_cell| {
        let mut ctx_opt = ctx_cell.borrow_mut();
        let ctx = ctx_opt.get_or_insert_with(zstd::zstd_safe::CCtx::create);

        let mut compressed = Vec::with_capacity(zstd::zstd_safe::compress_bound(data.len()));
        ctx.compress(&mut compressed, data, level).map_err(|code| {
            AgcError::Io(io::Error::other(format!(
                "ZSTD compression failed: {}",
                zstd::zstd_safe::get_error_name(code)
            )))
        })?;

        Ok(compressed)
    })
}

/// Decompress a block whose uncompressed size is known
///
/// The size is checked against the frame header first, so a bogus size
/// read from part metadata fails instead of allocating.
pub fn decompress_pooled(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    decompress_exact(compressed, expected_size as u64)
}

/// Decompress a block of unknown size
pub fn decompress_all(compressed: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(compressed)
        .map_err(|e| AgcError::corrupted(format!("ZSTD decompression failed: {e}")))
}
