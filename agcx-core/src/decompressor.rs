// agcx Decompressor
// Opens an archive and answers sample, contig and subsequence queries

use crate::edit_script::{decode_chunk, reconstruct_range, target_len, ReferenceSource};
use crate::genome_io::GenomeWriter;
use crate::query::ContigQuery;
use crate::segment_compression::{decompress_delta_chunk, decompress_segment_with_marker};
use agcx_common::varint::decode_string;
use agcx_common::{
    codes_to_string, contig_delta_stream, contig_raw_stream, AgcError, ArchiveReader, Collection,
    Contig, ContigDesc, ContigStorage, Result, AGCX_FILE_MAJOR, STREAM_FILE_TYPE_INFO,
    STREAM_PARAMS,
};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::BTreeMap;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Configuration for the decompressor
#[derive(Debug, Clone)]
pub struct DecompressorConfig {
    /// Load the whole archive into memory at open time
    pub prefetch: bool,
}

impl Default for DecompressorConfig {
    fn default() -> Self {
        DecompressorConfig { prefetch: true }
    }
}

/// Parameters the archive was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveParams {
    pub segment_size: u32,
    pub min_match_len: u32,
    pub compression_level: i32,
}

/// Size summary of an open archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub n_samples: usize,
    pub n_contigs: usize,
    pub raw_contigs: usize,
    pub delta_contigs: usize,
    pub total_bases: u64,
    pub packed_bytes: u64,
}

/// Read-only archive handle
///
/// Every query takes `&self`; one handle can be shared between threads.
pub struct Decompressor {
    path: PathBuf,
    archive: ArchiveReader,
    collection: Collection,
    params: ArchiveParams,
    file_type_info: BTreeMap<String, String>,
    // contig id -> data stream id
    contig_streams: Vec<usize>,
}

/// Empty sample names mean "any sample"
fn normalize_sample(sample: Option<&str>) -> Option<&str> {
    sample.filter(|s| !s.is_empty())
}

impl Decompressor {
    /// Open an existing archive
    ///
    /// Any problem with the file, its layout or its version is reported as
    /// `OpenFailure`.
    pub fn open<P: AsRef<Path>>(path: P, config: DecompressorConfig) -> Result<Self> {
        let path = path.as_ref();
        Self::open_impl(path, &config).map_err(|e| AgcError::OpenFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn open_impl(path: &Path, config: &DecompressorConfig) -> Result<Self> {
        let archive = ArchiveReader::open(path, config.prefetch)?;

        let file_type_info = Self::load_file_type_info(&archive)?;
        let params = Self::load_params(&archive)?;
        debug!("loaded params: {params:?}");

        let collection = Collection::load(&archive)?;
        let contig_streams =
            Self::locate_contig_streams(&archive, &collection, params.segment_size)?;

        info!(
            "opened {}: {} samples, {} contigs, prefetch={}",
            path.display(),
            collection.no_samples(),
            collection.no_contigs_total(),
            config.prefetch
        );

        Ok(Decompressor {
            path: path.to_path_buf(),
            archive,
            collection,
            params,
            file_type_info,
            contig_streams,
        })
    }

    fn load_file_type_info(archive: &ArchiveReader) -> Result<BTreeMap<String, String>> {
        let (data, no_pairs) = archive.get_single_part(STREAM_FILE_TYPE_INFO)?;

        let mut info = BTreeMap::new();
        let mut ptr = data.as_slice();
        for _ in 0..no_pairs {
            let key = decode_string(&mut ptr)?;
            let value = decode_string(&mut ptr)?;
            info.insert(key, value);
        }

        let major = info
            .get("file_version_major")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| AgcError::corrupted("file_type_info lacks file_version_major"))?;
        if major != AGCX_FILE_MAJOR {
            return Err(AgcError::InvalidInput(format!(
                "unsupported archive version {major}.x (expected {AGCX_FILE_MAJOR}.x)"
            )));
        }

        Ok(info)
    }

    fn load_params(archive: &ArchiveReader) -> Result<ArchiveParams> {
        let (data, _) = archive.get_single_part(STREAM_PARAMS)?;
        if data.len() != 12 {
            return Err(AgcError::corrupted(format!(
                "params stream has {} bytes, expected 12",
                data.len()
            )));
        }

        let word = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let params = ArchiveParams {
            segment_size: word(0),
            min_match_len: word(4),
            compression_level: word(8) as i32,
        };
        if params.segment_size == 0 {
            return Err(AgcError::corrupted("segment size of 0 in params"));
        }
        Ok(params)
    }

    /// Check that every contig has its data stream with the right number of parts
    fn locate_contig_streams(
        archive: &ArchiveReader,
        collection: &Collection,
        segment_size: u32,
    ) -> Result<Vec<usize>> {
        let mut streams = vec![usize::MAX; collection.no_contigs_total() as usize];

        for sample in collection.samples() {
            for contig in &sample.contigs {
                let name = match contig.storage {
                    ContigStorage::Raw => contig_raw_stream(contig.id),
                    ContigStorage::Delta { .. } => contig_delta_stream(contig.id),
                };
                let stream_id = archive.stream_id(&name).ok_or_else(|| {
                    AgcError::corrupted(format!(
                        "missing stream {name} for contig {}@{}",
                        contig.name, sample.name
                    ))
                })?;

                let expected = contig.length.div_ceil(segment_size as u64);
                let found = archive.num_parts(stream_id) as u64;
                if found != expected {
                    return Err(AgcError::corrupted(format!(
                        "stream {name} has {found} parts, expected {expected}"
                    )));
                }

                streams[contig.id as usize] = stream_id;
            }
        }

        Ok(streams)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_type_info(&self) -> &BTreeMap<String, String> {
        &self.file_type_info
    }

    pub fn params(&self) -> ArchiveParams {
        self.params
    }

    pub fn n_samples(&self) -> usize {
        self.collection.no_samples()
    }

    /// Sample names in stored order; the first one is the reference
    pub fn list_samples(&self) -> Vec<String> {
        self.collection.sample_names()
    }

    pub fn reference_sample(&self) -> Option<&str> {
        self.collection.reference_name()
    }

    pub fn n_contigs(&self, sample: &str) -> Result<usize> {
        self.collection.no_contigs(sample)
    }

    pub fn list_contigs(&self, sample: &str) -> Result<Vec<String>> {
        self.collection.contig_names(sample)
    }

    /// Samples holding a contig of this name
    pub fn samples_for_contig(&self, contig: &str) -> Vec<String> {
        self.collection
            .samples_for_contig(contig)
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Length of a contig; without a sample the name must be unique
    pub fn contig_length(&self, sample: Option<&str>, contig: &str) -> Result<u64> {
        let (_, desc) = self.collection.resolve(normalize_sample(sample), contig)?;
        Ok(desc.length)
    }

    /// Bases `start..=end` (0-based) of a contig as upper-case text
    pub fn get_sequence(
        &self,
        sample: Option<&str>,
        contig: &str,
        start: i64,
        end: i64,
    ) -> Result<String> {
        let codes = self.get_contig_range(sample, contig, start, end)?;
        Ok(codes_to_string(&codes))
    }

    /// Bases `start..=end` (0-based) of a contig as nucleotide codes
    pub fn get_contig_range(
        &self,
        sample: Option<&str>,
        contig: &str,
        start: i64,
        end: i64,
    ) -> Result<Contig> {
        let (_, desc) = self.collection.resolve(normalize_sample(sample), contig)?;

        if start < 0 || start > end || end as u64 >= desc.length {
            return Err(AgcError::RangeError {
                contig: contig.to_string(),
                start,
                end,
                length: desc.length,
            });
        }

        self.extract(desc, start as u64, end as u64 + 1)
    }

    /// A whole contig as nucleotide codes
    pub fn get_contig(&self, sample: Option<&str>, contig: &str) -> Result<Contig> {
        let (_, desc) = self.collection.resolve(normalize_sample(sample), contig)?;
        self.extract(desc, 0, desc.length)
    }

    /// Contig or contig range described by a parsed query
    pub fn get_query(&self, query: &ContigQuery) -> Result<Contig> {
        match query.range {
            Some((from, to)) => self.get_contig_range(
                query.sample.as_deref(),
                &query.contig,
                from as i64,
                to as i64,
            ),
            None => self.get_contig(query.sample.as_deref(), &query.contig),
        }
    }

    /// All contigs of a sample in stored order
    pub fn get_sample(&self, sample: &str) -> Result<Vec<(String, Contig)>> {
        let desc = self.collection.sample(sample)?;
        desc.contigs
            .iter()
            .map(|c| Ok((c.name.clone(), self.extract(c, 0, c.length)?)))
            .collect()
    }

    /// Write a sample as FASTA, wrapping lines at `line_length` (0 = no wrap)
    pub fn write_sample_fasta<W: Write>(
        &self,
        sample: &str,
        writer: W,
        line_length: usize,
    ) -> Result<()> {
        let desc = self.collection.sample(sample)?;
        let mut out = GenomeWriter::new(writer, line_length);
        for contig in &desc.contigs {
            let codes = self.extract(contig, 0, contig.length)?;
            out.save_contig(&contig.name, &codes)?;
        }
        out.flush()
    }

    /// Write every sample to `<out_dir>/<sample>.fa`, creating the directory
    /// if needed; returns the files written in sample order
    pub fn save_collection<P: AsRef<Path>>(
        &self,
        out_dir: P,
        line_length: usize,
    ) -> Result<Vec<PathBuf>> {
        let out_dir = out_dir.as_ref();
        fs::create_dir_all(out_dir)?;

        self.collection
            .samples()
            .par_iter()
            .map(|sample| -> Result<PathBuf> {
                let path = out_dir.join(format!("{}.fa", sample.name.replace('/', "_")));
                let file = BufWriter::new(File::create(&path)?);
                self.write_sample_fasta(&sample.name, file, line_length)?;
                debug!("sample {} written to {}", sample.name, path.display());
                Ok(path)
            })
            .collect()
    }

    pub fn stats(&self) -> ArchiveStats {
        let mut stats = ArchiveStats {
            n_samples: self.collection.no_samples(),
            ..ArchiveStats::default()
        };

        for sample in self.collection.samples() {
            for contig in &sample.contigs {
                stats.n_contigs += 1;
                stats.total_bases += contig.length;
                match contig.storage {
                    ContigStorage::Raw => stats.raw_contigs += 1,
                    ContigStorage::Delta { .. } => stats.delta_contigs += 1,
                }
            }
        }
        stats.packed_bytes = (0..self.archive.num_streams())
            .map(|id| self.archive.packed_size(id))
            .sum();
        stats
    }

    pub(crate) fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Parts of a contig's data stream as stored, `(data, metadata)`
    pub(crate) fn stored_parts(&self, contig: &ContigDesc) -> Result<Vec<(Vec<u8>, u64)>> {
        let stream_id = self.contig_streams[contig.id as usize];
        (0..self.archive.num_parts(stream_id))
            .map(|part| self.archive.get_part(stream_id, part))
            .collect()
    }

    /// Codes `[start, end)` of a contig
    fn extract(&self, contig: &ContigDesc, start: u64, end: u64) -> Result<Contig> {
        if start >= end {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity((end - start) as usize);

        match contig.storage {
            ContigStorage::Raw => {
                self.raw_source(contig).fetch(start, end, &mut out)?;
            }
            ContigStorage::Delta { ref_contig } => {
                let ref_desc = self
                    .collection
                    .reference()
                    .and_then(|r| r.contigs.get(ref_contig as usize))
                    .ok_or_else(|| {
                        AgcError::corrupted(format!("no reference contig {ref_contig}"))
                    })?;
                let source = self.raw_source(ref_desc);
                self.extract_delta(contig, &source, start, end, &mut out)?;
            }
        }

        debug!(
            "extracted {}..{} of {} ({} bases)",
            start,
            end,
            contig.name,
            out.len()
        );
        Ok(out)
    }

    /// Decode only the chunks overlapping `[start, end)`
    fn extract_delta(
        &self,
        contig: &ContigDesc,
        source: &RawContigSource<'_>,
        start: u64,
        end: u64,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let segment_size = self.params.segment_size as u64;
        let stream_id = self.contig_streams[contig.id as usize];

        for k in start / segment_size..=(end - 1) / segment_size {
            let chunk_start = k * segment_size;
            let chunk_end = (chunk_start + segment_size).min(contig.length);

            let (data, raw_len) = self.archive.get_part(stream_id, k as usize)?;
            let text = decompress_delta_chunk(&data, raw_len)?;
            let ops = decode_chunk(&text, chunk_start)?;
            if target_len(&ops) != chunk_end - chunk_start {
                return Err(AgcError::corrupted(format!(
                    "chunk {k} of {} covers {} bases, expected {}",
                    contig.name,
                    target_len(&ops),
                    chunk_end - chunk_start
                )));
            }

            reconstruct_range(
                source,
                &ops,
                chunk_start,
                start.max(chunk_start),
                end.min(chunk_end),
                out,
            )?;
        }
        Ok(())
    }

    fn raw_source<'a>(&'a self, contig: &'a ContigDesc) -> RawContigSource<'a> {
        RawContigSource {
            archive: &self.archive,
            stream_id: self.contig_streams[contig.id as usize],
            length: contig.length,
            segment_size: self.params.segment_size as u64,
            cache: RefCell::new(None),
        }
    }
}

/// Raw-stored contig read segment by segment
///
/// Keeps the last decoded segment, since consecutive matches tend to hit
/// the same one.
struct RawContigSource<'a> {
    archive: &'a ArchiveReader,
    stream_id: usize,
    length: u64,
    segment_size: u64,
    cache: RefCell<Option<(u64, Contig)>>,
}

impl RawContigSource<'_> {
    fn load_segment(&self, k: u64) -> Result<Contig> {
        let (data, marker) = self.archive.get_part(self.stream_id, k as usize)?;
        let seg_start = k * self.segment_size;
        let expected = (self.length - seg_start).min(self.segment_size) as usize;
        decompress_segment_with_marker(&data, marker, expected)
    }
}

impl ReferenceSource for RawContigSource<'_> {
    fn ref_len(&self) -> u64 {
        self.length
    }

    fn fetch(&self, start: u64, end: u64, out: &mut Vec<u8>) -> Result<()> {
        if end > self.length || start > end {
            return Err(AgcError::corrupted(format!(
                "range {start}..{end} outside contig of length {}",
                self.length
            )));
        }

        let mut pos = start;
        while pos < end {
            let k = pos / self.segment_size;
            let seg_start = k * self.segment_size;

            let mut cache = self.cache.borrow_mut();
            if !matches!(cache.as_ref(), Some((cached, _)) if *cached == k) {
                *cache = Some((k, self.load_segment(k)?));
            }
            let Some((_, segment)) = cache.as_ref() else {
                return Err(AgcError::corrupted("segment cache is empty"));
            };

            let from = (pos - seg_start) as usize;
            let to = ((end - seg_start) as usize).min(segment.len());
            out.extend_from_slice(&segment[from..to]);
            pos = seg_start + to as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Compressor, CompressorConfig};
    use tempfile::tempdir;

    fn build_archive(path: &Path) {
        let config = CompressorConfig {
            segment_size: 16,
            num_threads: 1,
            ..CompressorConfig::default()
        };
        let reference: Contig = (0..100u32).map(|i| ((i * 7 + i / 5) % 4) as u8).collect();
        let mut variant = reference.clone();
        variant[40] = (variant[40] + 1) % 4;
        variant.splice(70..70, [4u8; 10]);

        let mut compressor = Compressor::new(path, config).unwrap();
        compressor
            .add_sample(
                "ref",
                vec![("chr1".into(), reference), ("chrM".into(), vec![1, 2, 3])],
            )
            .unwrap();
        compressor
            .add_sample("alt", vec![("chr1".into(), variant)])
            .unwrap();
        compressor.finalize().unwrap();
    }

    #[test]
    fn test_metadata_queries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.agcx");
        build_archive(&path);

        let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();
        assert_eq!(dec.n_samples(), 2);
        assert_eq!(dec.list_samples(), vec!["ref", "alt"]);
        assert_eq!(dec.reference_sample(), Some("ref"));
        assert_eq!(dec.list_contigs("ref").unwrap(), vec!["chr1", "chrM"]);
        assert_eq!(dec.n_contigs("alt").unwrap(), 1);
        assert_eq!(dec.contig_length(Some("alt"), "chr1").unwrap(), 110);
        assert_eq!(dec.contig_length(None, "chrM").unwrap(), 3);
        assert_eq!(dec.contig_length(Some(""), "chrM").unwrap(), 3);
        assert_eq!(dec.params().segment_size, 16);
        assert_eq!(
            dec.file_type_info().get("producer").map(String::as_str),
            Some("agcx")
        );

        let stats = dec.stats();
        assert_eq!(stats.n_contigs, 3);
        assert_eq!(stats.delta_contigs, 1);
        assert_eq!(stats.total_bases, 213);
    }

    #[test]
    fn test_delta_ranges_match_full_contig() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.agcx");
        build_archive(&path);

        let dec = Decompressor::open(&path, DecompressorConfig { prefetch: false }).unwrap();
        let full = dec.get_contig(Some("alt"), "chr1").unwrap();
        assert_eq!(full.len(), 110);
        assert_eq!(&full[70..80], &[4u8; 10]);

        for start in (0..110).step_by(7) {
            for end in (start..110).step_by(5) {
                let part = dec
                    .get_contig_range(Some("alt"), "chr1", start as i64, end as i64)
                    .unwrap();
                assert_eq!(part, &full[start..=end]);
            }
        }
    }

    #[test]
    fn test_range_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.agcx");
        build_archive(&path);
        let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();

        for (start, end) in [(-1, 2), (2, 1), (0, 3), (3, 3)] {
            assert!(matches!(
                dec.get_sequence(Some("ref"), "chrM", start, end),
                Err(AgcError::RangeError { .. })
            ));
        }
        assert_eq!(dec.get_sequence(None, "chrM", 0, 2).unwrap(), "CGT");
        assert!(dec.get_sequence(None, "chr1", 0, 2).is_err());
    }

    #[test]
    fn test_open_failures() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.agcx");
        assert!(matches!(
            Decompressor::open(&missing, DecompressorConfig::default()),
            Err(AgcError::OpenFailure { .. })
        ));

        let garbage = dir.path().join("garbage.agcx");
        std::fs::write(&garbage, b"definitely not an archive").unwrap();
        assert!(matches!(
            Decompressor::open(&garbage, DecompressorConfig { prefetch: false }),
            Err(AgcError::OpenFailure { .. })
        ));
    }
}
