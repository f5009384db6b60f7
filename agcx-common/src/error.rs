// Error taxonomy shared by the reader, the index and the extractor

use std::io;
use thiserror::Error;

/// Result alias used across the agcx library crates
pub type Result<T> = std::result::Result<T, AgcError>;

/// Every failure surfaced by an archive handle
///
/// `OpenFailure` is fatal to the session. The lookup kinds (`SampleNotFound`,
/// `ContigNotFound`, `Ambiguous`, `RangeError`) are recoverable and leave the
/// handle usable.
#[derive(Debug, Error)]
pub enum AgcError {
    #[error("cannot open archive {path}: {reason}")]
    OpenFailure { path: String, reason: String },

    #[error("sample not found: {0}")]
    SampleNotFound(String),

    /// Contig name, qualified as `contig@sample` when a sample was given
    #[error("contig not found: {0}")]
    ContigNotFound(String),

    #[error("contig name {contig} is not unique; present in samples {samples:?}")]
    Ambiguous { contig: String, samples: Vec<String> },

    #[error("invalid range {start}-{end} for contig {contig} of length {length}")]
    RangeError {
        contig: String,
        start: i64,
        end: i64,
        length: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupted archive: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AgcError {
    pub fn corrupted(msg: impl Into<String>) -> Self {
        AgcError::Corrupted(msg.into())
    }

    pub fn contig_not_found(sample: Option<&str>, contig: &str) -> Self {
        match sample {
            Some(s) => AgcError::ContigNotFound(format!("{contig}@{s}")),
            None => AgcError::ContigNotFound(contig.to_string()),
        }
    }

    /// True for both unknown samples and unknown contigs
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AgcError::SampleNotFound(_) | AgcError::ContigNotFound(_)
        )
    }
}
