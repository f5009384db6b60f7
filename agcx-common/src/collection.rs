// Collection metadata
// Sample names, their ordered contigs, and how each contig is stored

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{AgcError, Result};
use crate::stream_naming::{STREAM_COLLECTION_CONTIGS, STREAM_COLLECTION_SAMPLES};
use crate::varint::{
    decode_prefix_u32, decode_string, decode_varint, encode_prefix_u32, encode_string,
    encode_varint,
};
use crate::zstd_frame::decompress_exact;
use ahash::AHashMap;

const COLLECTION_COMPRESSION_LEVEL: i32 = 19;

const STORAGE_RAW: u8 = 0;
const STORAGE_DELTA: u8 = 1;

/// How the bases of a contig are kept in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContigStorage {
    /// Segments of plain bases
    Raw,
    /// Edit-script chunks against contig `ref_contig` of the reference sample
    Delta { ref_contig: u32 },
}

/// A contig with its length and storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigDesc {
    pub name: String,
    pub length: u64,
    pub storage: ContigStorage,
    /// Archive-wide sequence number; names the contig's data stream
    pub id: u32,
}

/// A sample with its contigs in stored order
#[derive(Debug, Clone)]
pub struct SampleDesc {
    pub name: String,
    pub contigs: Vec<ContigDesc>,
    contig_ids: AHashMap<String, usize>,
}

impl SampleDesc {
    fn new(name: String) -> Self {
        SampleDesc {
            name,
            contigs: Vec::new(),
            contig_ids: AHashMap::new(),
        }
    }

    pub fn contig(&self, name: &str) -> Option<&ContigDesc> {
        self.contig_ids.get(name).map(|&i| &self.contigs[i])
    }

    /// Position of a contig within the sample
    pub fn contig_index(&self, name: &str) -> Option<usize> {
        self.contig_ids.get(name).copied()
    }
}

/// Sample/contig index of an archive
///
/// The first sample is the reference. Besides the per-sample contig maps the
/// collection keeps a contig-name -> owning-samples multimap, which resolves
/// queries that omit the sample.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    samples: Vec<SampleDesc>,
    sample_ids: AHashMap<String, usize>,
    contig_owners: AHashMap<String, Vec<usize>>,
    no_contigs: u32,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new sample and return its index
    pub fn add_sample(&mut self, name: &str) -> Result<usize> {
        if self.sample_ids.contains_key(name) {
            return Err(AgcError::InvalidInput(format!("duplicate sample name: {name}")));
        }

        let id = self.samples.len();
        self.samples.push(SampleDesc::new(name.to_string()));
        self.sample_ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Append a contig to a sample, assigning the next archive-wide id
    pub fn add_contig(
        &mut self,
        sample_id: usize,
        name: &str,
        length: u64,
        storage: ContigStorage,
    ) -> Result<u32> {
        let no_samples = self.samples.len();
        let sample = self.samples.get_mut(sample_id).ok_or_else(|| {
            AgcError::InvalidInput(format!(
                "sample index {sample_id} out of range ({no_samples} samples)"
            ))
        })?;

        if sample.contig_ids.contains_key(name) {
            return Err(AgcError::InvalidInput(format!(
                "duplicate contig {name} in sample {}",
                sample.name
            )));
        }

        let id = self.no_contigs;
        self.no_contigs += 1;

        sample.contig_ids.insert(name.to_string(), sample.contigs.len());
        sample.contigs.push(ContigDesc {
            name: name.to_string(),
            length,
            storage,
            id,
        });
        self.contig_owners
            .entry(name.to_string())
            .or_default()
            .push(sample_id);

        Ok(id)
    }

    pub fn no_samples(&self) -> usize {
        self.samples.len()
    }

    /// Total number of contigs over all samples
    pub fn no_contigs_total(&self) -> u32 {
        self.no_contigs
    }

    /// Sample names in stored order
    pub fn sample_names(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.name.clone()).collect()
    }

    pub fn samples(&self) -> &[SampleDesc] {
        &self.samples
    }

    /// Name of the reference (first) sample
    pub fn reference_name(&self) -> Option<&str> {
        self.samples.first().map(|s| s.name.as_str())
    }

    pub fn reference(&self) -> Option<&SampleDesc> {
        self.samples.first()
    }

    pub fn sample(&self, name: &str) -> Result<&SampleDesc> {
        self.sample_ids
            .get(name)
            .map(|&id| &self.samples[id])
            .ok_or_else(|| AgcError::SampleNotFound(name.to_string()))
    }

    pub fn no_contigs(&self, sample: &str) -> Result<usize> {
        Ok(self.sample(sample)?.contigs.len())
    }

    /// Contig names of a sample in stored order
    pub fn contig_names(&self, sample: &str) -> Result<Vec<String>> {
        Ok(self
            .sample(sample)?
            .contigs
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    /// Samples holding a contig of the given name, in stored order
    pub fn samples_for_contig(&self, contig: &str) -> Vec<&str> {
        self.contig_owners
            .get(contig)
            .map(|ids| ids.iter().map(|&i| self.samples[i].name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Find a contig, optionally qualified by sample
    ///
    /// Without a sample the name must be held by exactly one sample;
    /// a shared name fails with `Ambiguous`.
    pub fn resolve(
        &self,
        sample: Option<&str>,
        contig: &str,
    ) -> Result<(&SampleDesc, &ContigDesc)> {
        let sample_desc = match sample {
            Some(name) => self.sample(name)?,
            None => match self.contig_owners.get(contig).map(Vec::as_slice) {
                None | Some([]) => return Err(AgcError::contig_not_found(None, contig)),
                Some([only]) => &self.samples[*only],
                Some(_) => {
                    return Err(AgcError::Ambiguous {
                        contig: contig.to_string(),
                        samples: self
                            .samples_for_contig(contig)
                            .into_iter()
                            .map(String::from)
                            .collect(),
                    })
                }
            },
        };

        let contig_desc = sample_desc
            .contig(contig)
            .ok_or_else(|| AgcError::contig_not_found(sample, contig))?;
        Ok((sample_desc, contig_desc))
    }

    fn serialize_samples(&self) -> Vec<u8> {
        let mut data = Vec::new();
        encode_prefix_u32(&mut data, self.samples.len() as u32);
        for sample in &self.samples {
            encode_string(&mut data, &sample.name);
        }
        data
    }

    fn serialize_contigs(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for sample in &self.samples {
            encode_prefix_u32(&mut data, sample.contigs.len() as u32);
            for contig in &sample.contigs {
                encode_string(&mut data, &contig.name);
                encode_varint(&mut data, contig.length);
                match contig.storage {
                    ContigStorage::Raw => data.push(STORAGE_RAW),
                    ContigStorage::Delta { ref_contig } => {
                        data.push(STORAGE_DELTA);
                        encode_prefix_u32(&mut data, ref_contig);
                    }
                }
            }
        }
        data
    }

    fn deserialize(samples_data: &[u8], contigs_data: &[u8]) -> Result<Self> {
        let mut collection = Collection::new();

        let mut ptr = samples_data;
        let no_samples = decode_prefix_u32(&mut ptr)?;
        for _ in 0..no_samples {
            let name = decode_string(&mut ptr)?;
            collection
                .add_sample(&name)
                .map_err(|e| AgcError::corrupted(e.to_string()))?;
        }

        let mut ptr = contigs_data;
        for sample_id in 0..no_samples as usize {
            let no_contigs = decode_prefix_u32(&mut ptr)?;
            for _ in 0..no_contigs {
                let name = decode_string(&mut ptr)?;
                let length = decode_varint(&mut ptr)?;
                let (&tag, rest) = ptr
                    .split_first()
                    .ok_or_else(|| AgcError::corrupted("truncated contig storage tag"))?;
                ptr = rest;

                let storage = match tag {
                    STORAGE_RAW => ContigStorage::Raw,
                    STORAGE_DELTA => ContigStorage::Delta {
                        ref_contig: decode_prefix_u32(&mut ptr)?,
                    },
                    other => {
                        return Err(AgcError::corrupted(format!(
                            "unknown storage tag {other} for contig {name}"
                        )))
                    }
                };

                collection
                    .add_contig(sample_id, &name, length, storage)
                    .map_err(|e| AgcError::corrupted(e.to_string()))?;
            }
        }

        if !ptr.is_empty() {
            return Err(AgcError::corrupted("trailing bytes in contig metadata"));
        }

        collection.validate_delta_links()?;
        Ok(collection)
    }

    /// Every delta contig must point at an existing reference contig
    fn validate_delta_links(&self) -> Result<()> {
        let no_ref_contigs = self.samples.first().map_or(0, |s| s.contigs.len());

        for (sample_id, sample) in self.samples.iter().enumerate() {
            for contig in &sample.contigs {
                if let ContigStorage::Delta { ref_contig } = contig.storage {
                    if sample_id == 0 || ref_contig as usize >= no_ref_contigs {
                        return Err(AgcError::corrupted(format!(
                            "contig {}@{} has an invalid reference link",
                            contig.name, sample.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the collection streams
    pub fn store(&self, archive: &mut ArchiveWriter) -> Result<()> {
        for (stream_name, data) in [
            (STREAM_COLLECTION_SAMPLES, self.serialize_samples()),
            (STREAM_COLLECTION_CONTIGS, self.serialize_contigs()),
        ] {
            let packed = zstd::bulk::compress(&data, COLLECTION_COMPRESSION_LEVEL)?;
            let stream_id = archive.register_stream(stream_name);
            archive.add_part(stream_id, &packed, data.len() as u64)?;
            archive.set_raw_size(stream_id, data.len() as u64);
        }
        Ok(())
    }

    /// Read the collection streams and build the lookup maps
    pub fn load(archive: &ArchiveReader) -> Result<Self> {
        let samples_data = Self::load_stream(archive, STREAM_COLLECTION_SAMPLES)?;
        let contigs_data = Self::load_stream(archive, STREAM_COLLECTION_CONTIGS)?;
        Self::deserialize(&samples_data, &contigs_data)
    }

    fn load_stream(archive: &ArchiveReader, name: &str) -> Result<Vec<u8>> {
        let (packed, raw_size) = archive.get_single_part(name)?;
        decompress_exact(&packed, raw_size).map_err(|e| match e {
            AgcError::Corrupted(msg) => AgcError::corrupted(format!("{name}: {msg}")),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn two_sample_collection() -> Collection {
        let mut c = Collection::new();
        let a = c.add_sample("sampleA").unwrap();
        let b = c.add_sample("sampleB").unwrap();
        c.add_contig(a, "chr1", 20, ContigStorage::Raw).unwrap();
        c.add_contig(a, "chr2", 30, ContigStorage::Raw).unwrap();
        c.add_contig(b, "chr2", 31, ContigStorage::Delta { ref_contig: 1 })
            .unwrap();
        c.add_contig(b, "plasmid", 5, ContigStorage::Raw).unwrap();
        c
    }

    #[test]
    fn test_listing_keeps_stored_order() {
        let mut c = Collection::new();
        for name in ["zeta", "alpha", "mid"] {
            c.add_sample(name).unwrap();
        }
        assert_eq!(c.sample_names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(c.reference_name(), Some("zeta"));

        let c = two_sample_collection();
        assert_eq!(c.contig_names("sampleA").unwrap(), vec!["chr1", "chr2"]);
        assert_eq!(c.no_contigs("sampleB").unwrap(), 2);
        assert_eq!(c.no_contigs_total(), 4);
    }

    #[test]
    fn test_unknown_sample() {
        let c = two_sample_collection();
        assert!(matches!(c.no_contigs("nope"), Err(AgcError::SampleNotFound(_))));
        assert!(matches!(c.contig_names("nope"), Err(AgcError::SampleNotFound(_))));
        assert!(matches!(
            c.resolve(Some("nope"), "chr1"),
            Err(AgcError::SampleNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_qualified_and_unqualified() {
        let c = two_sample_collection();

        let (s, ctg) = c.resolve(None, "chr1").unwrap();
        assert_eq!(s.name, "sampleA");
        assert_eq!(ctg.length, 20);

        let (s, ctg) = c.resolve(None, "plasmid").unwrap();
        assert_eq!(s.name, "sampleB");
        assert_eq!(ctg.id, 3);

        let (_, ctg) = c.resolve(Some("sampleB"), "chr2").unwrap();
        assert_eq!(ctg.length, 31);
        assert_eq!(ctg.storage, ContigStorage::Delta { ref_contig: 1 });

        match c.resolve(None, "chr2") {
            Err(AgcError::Ambiguous { samples, .. }) => {
                assert_eq!(samples, vec!["sampleA", "sampleB"])
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }

        assert!(matches!(
            c.resolve(None, "chrX"),
            Err(AgcError::ContigNotFound(_))
        ));
        assert!(matches!(
            c.resolve(Some("sampleB"), "chr1"),
            Err(AgcError::ContigNotFound(_))
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut c = two_sample_collection();
        assert!(c.add_sample("sampleA").is_err());
        assert!(c.add_contig(0, "chr1", 1, ContigStorage::Raw).is_err());
        assert!(c.add_contig(9, "chr9", 1, ContigStorage::Raw).is_err());
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collection.agcx");
        let original = two_sample_collection();

        let mut writer = ArchiveWriter::create(&path).unwrap();
        original.store(&mut writer).unwrap();
        writer.finish().unwrap();

        let reader = ArchiveReader::open(&path, true).unwrap();
        let loaded = Collection::load(&reader).unwrap();

        assert_eq!(loaded.sample_names(), original.sample_names());
        for sample in original.samples() {
            assert_eq!(loaded.sample(&sample.name).unwrap().contigs, sample.contigs);
        }
        assert_eq!(loaded.samples_for_contig("chr2"), vec!["sampleA", "sampleB"]);
    }

    #[test]
    fn test_invalid_delta_link_is_corruption() {
        let mut c = Collection::new();
        let a = c.add_sample("a").unwrap();
        c.add_contig(a, "chr1", 10, ContigStorage::Raw).unwrap();
        let b = c.add_sample("b").unwrap();
        c.add_contig(b, "chr1", 10, ContigStorage::Delta { ref_contig: 5 })
            .unwrap();

        let samples = c.serialize_samples();
        let contigs = c.serialize_contigs();
        assert!(matches!(
            Collection::deserialize(&samples, &contigs),
            Err(AgcError::Corrupted(_))
        ));
    }
}
