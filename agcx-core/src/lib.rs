//! Compression and random-access extraction for agcx genome archives.
//!
//! An archive holds many samples (genome assemblies), each an ordered list
//! of named contigs. The first sample is the reference and is stored as
//! zstd-compressed segments; contigs of later samples that share a name
//! with a reference contig are stored as edit scripts against it, chunked
//! so that any subrange can be rebuilt without decoding the whole contig.
//!
//! # Examples
//!
//! ## Building an archive
//!
//! ```no_run
//! use agcx_core::{Compressor, CompressorConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut compressor = Compressor::new("genomes.agcx", CompressorConfig::default())?;
//! compressor.add_fasta_file("ref", "ref.fa")?;
//! compressor.add_fasta_file("sample1", "sample1.fa.gz")?;
//! compressor.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Querying
//!
//! ```no_run
//! use agcx_core::{Decompressor, DecompressorConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = Decompressor::open("genomes.agcx", DecompressorConfig::default())?;
//!
//! for sample in archive.list_samples() {
//!     println!("{sample}: {} contigs", archive.n_contigs(&sample)?);
//! }
//!
//! let len = archive.contig_length(Some("sample1"), "chr1")?;
//! let seq = archive.get_sequence(Some("sample1"), "chr1", 0, len.min(60) as i64 - 1)?;
//! println!("{seq}");
//! # Ok(())
//! # }
//! ```

pub mod compressor;
pub mod decompressor;
pub mod edit_script;
pub mod genome_io;
pub mod lz_diff;
pub mod query;
pub mod segment_compression;
pub mod tuple_packing;
pub mod zstd_pool;

pub use compressor::{Compressor, CompressorConfig};
pub use decompressor::{ArchiveParams, ArchiveStats, Decompressor, DecompressorConfig};
pub use edit_script::{reconstruct, reconstruct_range, EditOp, ReferenceSource};
pub use genome_io::{GenomeIO, GenomeWriter};
pub use query::{clamp_range, ContigQuery};

pub use agcx_common::{AgcError, Contig, Result};
