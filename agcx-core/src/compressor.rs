// agcx Compressor
// Builds an archive sample by sample: the first sample is stored raw and
// becomes the reference, later contigs are edit scripts against it

use crate::edit_script::{encode_chunk, split_into_chunks};
use crate::decompressor::{Decompressor, DecompressorConfig};
use crate::genome_io::GenomeIO;
use crate::lz_diff::{literal_bases, LZDiff};
use crate::segment_compression::{
    compress_delta_chunk, compress_reference_segment, DELTA_COMPRESSION_LEVEL,
};
use agcx_common::varint::encode_string;
use agcx_common::{
    contig_delta_stream, contig_raw_stream, ArchiveWriter, Collection, Contig, ContigStorage,
    PackedBlock, AGCX_FILE_MAJOR, AGCX_FILE_MINOR, AGCX_VER_BUILD, AGCX_VER_MAJOR,
    AGCX_VER_MINOR, STREAM_FILE_TYPE_INFO, STREAM_PARAMS,
};
use ahash::AHashSet;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Accepted minimum match lengths; the hashed k-mer must fit 64 bits
pub const MIN_MATCH_LEN_RANGE: std::ops::RangeInclusive<u32> = 12..=32;

/// Configuration for the compressor
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Bases per stored part, for raw segments and edit-script chunks alike
    pub segment_size: u32,
    pub min_match_len: u32,
    /// zstd level of edit-script chunks
    pub compression_level: i32,
    pub num_threads: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig {
            segment_size: 60_000,
            min_match_len: 20,
            compression_level: DELTA_COMPRESSION_LEVEL,
            num_threads: num_cpus::get(),
        }
    }
}

impl CompressorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            bail!("segment size must be positive");
        }
        if !MIN_MATCH_LEN_RANGE.contains(&self.min_match_len) {
            bail!(
                "minimum match length {} outside {}..={}",
                self.min_match_len,
                MIN_MATCH_LEN_RANGE.start(),
                MIN_MATCH_LEN_RANGE.end()
            );
        }
        if !(1..=22).contains(&self.compression_level) {
            bail!(
                "compression level {} outside 1..=22",
                self.compression_level
            );
        }
        Ok(())
    }
}

/// One contig ready to be written
struct EncodedContig {
    storage: ContigStorage,
    /// (block, metadata) per part
    parts: Vec<(PackedBlock, u64)>,
}

/// agcx Compressor
pub struct Compressor {
    config: CompressorConfig,
    path: PathBuf,
    archive: ArchiveWriter,
    collection: Collection,
    pool: rayon::ThreadPool,

    // Reference sample contigs, with encoders built on first use
    reference_contigs: Vec<Contig>,
    lz_cache: Vec<OnceLock<LZDiff>>,

    total_bases: u64,
    delta_contigs: usize,
}

impl Compressor {
    /// Create a new archive at `path`
    pub fn new<P: AsRef<Path>>(path: P, config: CompressorConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let archive = ArchiveWriter::create(&path)
            .with_context(|| format!("Failed to create archive {}", path.display()))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads.max(1))
            .build()
            .context("Failed to build worker pool")?;

        Ok(Compressor {
            config,
            path,
            archive,
            collection: Collection::new(),
            pool,
            reference_contigs: Vec::new(),
            lz_cache: Vec::new(),
            total_bases: 0,
            delta_contigs: 0,
        })
    }

    /// Start `output` as a copy of the archive at `input`
    ///
    /// Stored streams are carried over without re-encoding and the
    /// parameters of `input` are kept. Samples added afterwards are encoded
    /// against the existing reference. `input` itself is never modified.
    pub fn append<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output: Q,
        num_threads: usize,
    ) -> Result<Self> {
        let (input, output) = (input.as_ref(), output.as_ref());
        if let (Ok(a), Ok(b)) = (input.canonicalize(), output.canonicalize()) {
            if a == b {
                bail!(
                    "cannot append to {} in place; write to a new file",
                    input.display()
                );
            }
        }

        let source = Decompressor::open(input, DecompressorConfig { prefetch: true })?;
        let params = source.params();
        let config = CompressorConfig {
            segment_size: params.segment_size,
            min_match_len: params.min_match_len,
            compression_level: params.compression_level,
            num_threads,
        };

        let mut compressor = Compressor::new(output, config)?;
        compressor
            .copy_archive(&source)
            .with_context(|| format!("Failed to copy {}", input.display()))?;
        info!(
            "appending to {} ({} samples) as {}",
            input.display(),
            source.n_samples(),
            output.display()
        );
        Ok(compressor)
    }

    fn copy_archive(&mut self, source: &Decompressor) -> Result<()> {
        for sample in source.collection().samples() {
            let sample_id = self.collection.add_sample(&sample.name)?;
            for contig in &sample.contigs {
                let id = self.collection.add_contig(
                    sample_id,
                    &contig.name,
                    contig.length,
                    contig.storage,
                )?;
                let stream_name = match contig.storage {
                    ContigStorage::Raw => contig_raw_stream(id),
                    ContigStorage::Delta { .. } => {
                        self.delta_contigs += 1;
                        contig_delta_stream(id)
                    }
                };

                let stream_id = self.archive.register_stream(&stream_name);
                for (block, metadata) in source.stored_parts(contig)? {
                    self.archive.add_part(stream_id, &block, metadata)?;
                }
                self.archive.set_raw_size(stream_id, contig.length);
                self.total_bases += contig.length;
            }
        }

        if let Some(reference) = source.reference_sample() {
            let contigs = source.get_sample(reference)?;
            self.lz_cache = contigs.iter().map(|_| OnceLock::new()).collect();
            self.reference_contigs = contigs.into_iter().map(|(_, c)| c).collect();
        }
        Ok(())
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Add a sample read from a FASTA file (plain or gzipped)
    pub fn add_fasta_file<P: AsRef<Path>>(
        &mut self,
        sample_name: &str,
        fasta_path: P,
    ) -> Result<()> {
        let fasta_path = fasta_path.as_ref();
        let contigs = GenomeIO::open(fasta_path)
            .and_then(|mut reader| reader.read_all())
            .with_context(|| format!("Failed to read FASTA file {}", fasta_path.display()))?;

        debug!(
            "read {} contigs for sample {sample_name} from {}",
            contigs.len(),
            fasta_path.display()
        );
        self.add_sample(sample_name, contigs)
    }

    /// Add a sample given as (contig name, codes) pairs in stored order
    pub fn add_sample(
        &mut self,
        sample_name: &str,
        contigs: Vec<(String, Contig)>,
    ) -> Result<()> {
        let mut seen = AHashSet::with_capacity(contigs.len());
        for (name, _) in &contigs {
            if !seen.insert(name.as_str()) {
                bail!("duplicate contig {name} in sample {sample_name}");
            }
        }

        if self.collection.sample(sample_name).is_ok() {
            bail!("duplicate sample name: {sample_name}");
        }

        let no_contigs = contigs.len();
        let is_reference = self.collection.no_samples() == 0;

        let encoded: Vec<EncodedContig> = self.pool.install(|| {
            contigs
                .par_iter()
                .map(|(name, contig)| {
                    if is_reference {
                        self.encode_raw(contig)
                    } else {
                        self.encode_against_reference(name, contig)
                    }
                })
                .collect::<Result<_>>()
        })?;

        // Registered only once every contig encoded
        let sample_id = self.collection.add_sample(sample_name)?;
        for ((name, contig), enc) in contigs.iter().zip(encoded) {
            let id = self
                .collection
                .add_contig(sample_id, name, contig.len() as u64, enc.storage)?;

            let stream_name = match enc.storage {
                ContigStorage::Raw => contig_raw_stream(id),
                ContigStorage::Delta { .. } => {
                    self.delta_contigs += 1;
                    contig_delta_stream(id)
                }
            };
            let stream_id = self.archive.register_stream(&stream_name);
            for (block, metadata) in &enc.parts {
                self.archive.add_part(stream_id, block, *metadata)?;
            }
            self.archive.set_raw_size(stream_id, contig.len() as u64);
            self.total_bases += contig.len() as u64;
        }

        if is_reference {
            self.lz_cache = contigs.iter().map(|_| OnceLock::new()).collect();
            self.reference_contigs = contigs.into_iter().map(|(_, c)| c).collect();
        }

        debug!(
            "sample {sample_name} stored ({no_contigs} contigs{})",
            if is_reference { ", reference" } else { "" }
        );
        Ok(())
    }

    fn encode_raw(&self, contig: &[u8]) -> Result<EncodedContig> {
        let parts = contig
            .chunks(self.config.segment_size as usize)
            .map(compress_reference_segment)
            .collect::<agcx_common::Result<Vec<_>>>()?;

        Ok(EncodedContig {
            storage: ContigStorage::Raw,
            parts,
        })
    }

    /// Delta-encode against the reference contig of the same name; raw when
    /// there is none or when the script would be mostly literals
    fn encode_against_reference(&self, name: &str, contig: &[u8]) -> Result<EncodedContig> {
        let ref_idx = match self
            .collection
            .reference()
            .and_then(|r| r.contig_index(name))
        {
            Some(idx) => idx,
            None => return self.encode_raw(contig),
        };

        let lz = self.lz_cache[ref_idx].get_or_init(|| {
            LZDiff::new(
                self.reference_contigs[ref_idx].clone(),
                self.config.min_match_len,
            )
        });

        let ops = lz.encode(contig);
        if literal_bases(&ops) * 2 > contig.len() as u64 {
            debug!("contig {name} differs too much from the reference, storing raw");
            return self.encode_raw(contig);
        }

        let segment_size = self.config.segment_size as u64;
        let parts = split_into_chunks(&ops, segment_size)
            .iter()
            .enumerate()
            .map(|(k, chunk)| {
                let text = encode_chunk(chunk, k as u64 * segment_size);
                let block = compress_delta_chunk(&text, self.config.compression_level)?;
                Ok((block, text.len() as u64))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EncodedContig {
            storage: ContigStorage::Delta {
                ref_contig: ref_idx as u32,
            },
            parts,
        })
    }

    fn store_file_type_info(&mut self) -> Result<()> {
        let pairs = [
            ("producer", "agcx".to_string()),
            ("producer_version_major", AGCX_VER_MAJOR.to_string()),
            ("producer_version_minor", AGCX_VER_MINOR.to_string()),
            ("producer_version_build", AGCX_VER_BUILD.to_string()),
            ("file_version_major", AGCX_FILE_MAJOR.to_string()),
            ("file_version_minor", AGCX_FILE_MINOR.to_string()),
            (
                "comment",
                format!("agcx v.{AGCX_VER_MAJOR}.{AGCX_VER_MINOR}"),
            ),
        ];

        let mut data = Vec::new();
        for (key, value) in &pairs {
            encode_string(&mut data, key);
            encode_string(&mut data, value);
        }

        let stream_id = self.archive.register_stream(STREAM_FILE_TYPE_INFO);
        // metadata = number of key/value pairs
        self.archive.add_part(stream_id, &data, pairs.len() as u64)?;
        Ok(())
    }

    fn store_params(&mut self) -> Result<()> {
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&self.config.segment_size.to_le_bytes());
        data.extend_from_slice(&self.config.min_match_len.to_le_bytes());
        data.extend_from_slice(&(self.config.compression_level as u32).to_le_bytes());

        let stream_id = self.archive.register_stream(STREAM_PARAMS);
        self.archive.add_part(stream_id, &data, 0)?;
        Ok(())
    }

    /// Write metadata streams and the container footer
    pub fn finalize(mut self) -> Result<()> {
        self.store_params()?;
        self.collection.store(&mut self.archive)?;
        self.store_file_type_info()?;
        self.archive
            .finish()
            .with_context(|| format!("Failed to finish archive {}", self.path.display()))?;

        info!(
            "archive {} written: {} samples, {} contigs ({} delta), {} bases",
            self.path.display(),
            self.collection.no_samples(),
            self.collection.no_contigs_total(),
            self.delta_contigs,
            self.total_bases
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agcx_common::ArchiveReader;
    use tempfile::tempdir;

    fn test_config() -> CompressorConfig {
        CompressorConfig {
            segment_size: 100,
            num_threads: 2,
            ..CompressorConfig::default()
        }
    }

    fn random_contig(len: usize, seed: u64) -> Contig {
        let mut x = seed | 1;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x >> 33) as u8 & 3
            })
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(CompressorConfig::default().validate().is_ok());
        let bad = [
            CompressorConfig {
                segment_size: 0,
                ..test_config()
            },
            CompressorConfig {
                min_match_len: 8,
                ..test_config()
            },
            CompressorConfig {
                compression_level: 40,
                ..test_config()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_streams_and_storage_choice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.agcx");

        let chr1 = random_contig(450, 1);
        let mut chr1_b = chr1.clone();
        chr1_b[200] = (chr1_b[200] + 1) % 4;

        let mut compressor = Compressor::new(&path, test_config()).unwrap();
        compressor
            .add_sample("ref", vec![("chr1".into(), chr1.clone())])
            .unwrap();
        compressor
            .add_sample(
                "alt",
                vec![
                    ("chr1".into(), chr1_b),
                    ("chrX".into(), random_contig(150, 9)),
                    ("empty".into(), Vec::new()),
                ],
            )
            .unwrap();
        compressor.finalize().unwrap();

        let reader = ArchiveReader::open(&path, true).unwrap();
        for name in [STREAM_FILE_TYPE_INFO, STREAM_PARAMS, "collection-samples"] {
            assert!(reader.stream_id(name).is_some(), "{name}");
        }
        // ref chr1 = id 0, alt chr1 = id 1 (delta), chrX = id 2, empty = id 3
        let raw = reader.stream_id(&contig_raw_stream(0)).unwrap();
        assert_eq!(reader.num_parts(raw), 5);
        let delta = reader.stream_id(&contig_delta_stream(1)).unwrap();
        assert_eq!(reader.num_parts(delta), 5);
        let unrelated = reader.stream_id(&contig_raw_stream(2)).unwrap();
        assert_eq!(reader.num_parts(unrelated), 2);
        let empty = reader.stream_id(&contig_raw_stream(3)).unwrap();
        assert_eq!(reader.num_parts(empty), 0);

        let collection = Collection::load(&reader).unwrap();
        let (_, desc) = collection.resolve(Some("alt"), "chr1").unwrap();
        assert_eq!(desc.storage, ContigStorage::Delta { ref_contig: 0 });
    }

    #[test]
    fn test_duplicates_rejected() {
        let dir = tempdir().unwrap();
        let mut compressor = Compressor::new(dir.path().join("d.agcx"), test_config()).unwrap();

        let err = compressor
            .add_sample("s", vec![("c".into(), vec![0]), ("c".into(), vec![1])])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate contig"));

        compressor.add_sample("s", vec![("c".into(), vec![0])]).unwrap();
        assert!(compressor.add_sample("s", vec![]).is_err());
    }

    #[test]
    fn test_rejected_sample_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.agcx");
        let mut compressor = Compressor::new(&path, test_config()).unwrap();

        assert!(compressor
            .add_sample("bad", vec![("c".into(), vec![0]), ("c".into(), vec![1])])
            .is_err());
        compressor
            .add_sample("ref", vec![("c".into(), random_contig(120, 3))])
            .unwrap();
        assert!(compressor.add_sample("ref", vec![]).is_err());
        compressor
            .add_sample("bad", vec![("c".into(), random_contig(120, 3))])
            .unwrap();
        compressor.finalize().unwrap();

        let reader = ArchiveReader::open(&path, true).unwrap();
        let collection = Collection::load(&reader).unwrap();
        assert_eq!(collection.sample_names(), vec!["ref", "bad"]);
        assert_eq!(collection.reference_name(), Some("ref"));
        assert_eq!(collection.no_contigs_total(), 2);
    }
}
