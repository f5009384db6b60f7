// agcx common library
// Container format, collection index and shared types

pub mod archive;
pub mod collection;
pub mod error;
pub mod hash;
pub mod stream_naming;
pub mod types;
pub mod varint;
pub mod zstd_frame;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use collection::{Collection, ContigDesc, ContigStorage, SampleDesc};
pub use error::{AgcError, Result};
pub use hash::murmur64;
pub use stream_naming::{
    contig_delta_stream, contig_raw_stream, int_to_base64, STREAM_COLLECTION_CONTIGS,
    STREAM_COLLECTION_SAMPLES, STREAM_FILE_TYPE_INFO, STREAM_PARAMS,
};
pub use types::{
    agcx_version, codes_to_string, decode_base, encode_base, Contig, PackedBlock,
    AGCX_FILE_MAJOR, AGCX_FILE_MINOR, AGCX_VER_BUILD, AGCX_VER_MAJOR, AGCX_VER_MINOR, N_CODE,
    NO_CODES,
};
