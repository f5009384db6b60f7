// Subsequence extraction and lookup rules
// Exercises contig_length() and get_sequence() against known contents

use agcx_core::{
    clamp_range, AgcError, Compressor, CompressorConfig, Decompressor, DecompressorConfig,
};
use std::path::Path;
use tempfile::tempdir;

fn create_test_archive(path: &Path, samples: Vec<(&str, Vec<(&str, Vec<u8>)>)>) {
    let config = CompressorConfig {
        segment_size: 64,
        num_threads: 1,
        ..CompressorConfig::default()
    };
    let mut compressor = Compressor::new(path, config).expect("Failed to create compressor");
    for (sample, contigs) in samples {
        let contigs = contigs
            .into_iter()
            .map(|(name, seq)| (name.to_string(), seq))
            .collect();
        compressor
            .add_sample(sample, contigs)
            .expect("Failed to add sample");
    }
    compressor.finalize().expect("Failed to finalize");
}

fn pattern(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (x >> 62) as u8
        })
        .collect()
}

fn to_ascii(codes: &[u8]) -> String {
    codes.iter().map(|&c| b"ACGTN"[c as usize] as char).collect()
}

/// sampleA: chr1 (20 bases), chr2 (300); sampleB: chr2 edited, chr3
fn scenario_archive(path: &Path) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let chr1 = pattern(20, 5);
    let chr2 = pattern(300, 6);
    let mut chr2_b = chr2.clone();
    chr2_b[150] = (chr2_b[150] + 1) % 4;
    chr2_b.splice(200..200, [4u8; 6]);

    create_test_archive(
        path,
        vec![
            (
                "sampleA",
                vec![("chr1", chr1.clone()), ("chr2", chr2.clone())],
            ),
            (
                "sampleB",
                vec![("chr2", chr2_b.clone()), ("chr3", pattern(130, 7))],
            ),
        ],
    );
    (chr1, chr2, chr2_b)
}

#[test]
fn test_unique_contig_scenario() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.agcx");
    let (chr1, _, _) = scenario_archive(&path);

    let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();
    assert_eq!(dec.list_samples(), vec!["sampleA", "sampleB"]);
    assert_eq!(dec.contig_length(None, "chr1").unwrap(), 20);

    let unqualified = dec.get_sequence(None, "chr1", 8, 12).unwrap();
    let qualified = dec.get_sequence(Some("sampleA"), "chr1", 8, 12).unwrap();
    assert_eq!(unqualified.len(), 5);
    assert_eq!(unqualified, qualified);
    assert_eq!(unqualified, to_ascii(&chr1[8..=12]));
}

#[test]
fn test_clamping_scenario() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clamp.agcx");
    let (chr1, _, _) = scenario_archive(&path);
    let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();

    let err = dec.get_sequence(Some("sampleA"), "chr1", 18, 25).unwrap_err();
    match err {
        AgcError::RangeError {
            start, end, length, ..
        } => assert_eq!((start, end, length), (18, 25, 20)),
        other => panic!("expected RangeError, got {other:?}"),
    }

    let len = dec.contig_length(Some("sampleA"), "chr1").unwrap();
    let (start, end) = clamp_range(18, 25 - 18 + 1, len).unwrap();
    assert_eq!((start, end), (12, 19));
    let (start, end) = clamp_range(18, 5, len).unwrap();
    assert_eq!((start, end), (15, 19));
    let seq = dec
        .get_sequence(Some("sampleA"), "chr1", start as i64, end as i64)
        .unwrap();
    assert_eq!(seq, to_ascii(&chr1[15..20]));
}

#[test]
fn test_shared_names_are_ambiguous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ambiguous.agcx");
    scenario_archive(&path);
    let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();

    match dec.contig_length(None, "chr2") {
        Err(AgcError::Ambiguous { contig, samples }) => {
            assert_eq!(contig, "chr2");
            assert_eq!(samples, vec!["sampleA", "sampleB"]);
        }
        other => panic!("expected Ambiguous, got {other:?}"),
    }
    assert!(matches!(
        dec.get_sequence(None, "chr2", 0, 1),
        Err(AgcError::Ambiguous { .. })
    ));
    assert!(matches!(
        dec.get_sequence(Some(""), "chr2", 0, 1),
        Err(AgcError::Ambiguous { .. })
    ));

    assert_eq!(dec.contig_length(Some("sampleB"), "chr2").unwrap(), 306);
}

#[test]
fn test_not_found_kinds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.agcx");
    scenario_archive(&path);
    let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();

    assert!(matches!(
        dec.n_contigs("sampleC"),
        Err(AgcError::SampleNotFound(_))
    ));
    assert!(matches!(
        dec.list_contigs("sampleC"),
        Err(AgcError::SampleNotFound(_))
    ));
    assert!(matches!(
        dec.contig_length(Some("sampleA"), "chr3"),
        Err(AgcError::ContigNotFound(_))
    ));
    assert!(matches!(
        dec.contig_length(None, "chrZ"),
        Err(AgcError::ContigNotFound(_))
    ));
    assert!(matches!(
        dec.get_sequence(Some("sampleC"), "chr1", 0, 1),
        Err(AgcError::SampleNotFound(_))
    ));
    // Lookup failures leave the handle usable
    assert_eq!(dec.n_contigs("sampleB").unwrap(), 2);
}

#[test]
fn test_every_range_of_delta_contig() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranges.agcx");
    let (_, chr2, chr2_b) = scenario_archive(&path);
    let dec = Decompressor::open(&path, DecompressorConfig { prefetch: false }).unwrap();

    let expected = to_ascii(&chr2_b);
    let len = dec.contig_length(Some("sampleB"), "chr2").unwrap() as i64;
    assert_eq!(len as usize, expected.len());

    for start in 0..len {
        for end in (start..len).step_by(11) {
            let seq = dec.get_sequence(Some("sampleB"), "chr2", start, end).unwrap();
            assert_eq!(seq.len() as i64, end - start + 1);
            assert_eq!(seq, expected[start as usize..=end as usize]);
        }
    }

    let whole = dec
        .get_sequence(Some("sampleA"), "chr2", 0, chr2.len() as i64 - 1)
        .unwrap();
    assert_eq!(whole, to_ascii(&chr2));
}

#[test]
fn test_length_extraction_agreement_and_idempotence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("props.agcx");
    scenario_archive(&path);
    let dec = Decompressor::open(&path, DecompressorConfig::default()).unwrap();

    for sample in dec.list_samples() {
        for contig in dec.list_contigs(&sample).unwrap() {
            let len = dec.contig_length(Some(&sample), &contig).unwrap();
            let full = dec
                .get_sequence(Some(&sample), &contig, 0, len as i64 - 1)
                .unwrap();
            assert_eq!(full.len() as u64, len);
            assert_eq!(
                full,
                dec.get_sequence(Some(&sample), &contig, 0, len as i64 - 1)
                    .unwrap()
            );
            assert!(matches!(
                dec.get_sequence(Some(&sample), &contig, 0, len as i64),
                Err(AgcError::RangeError { .. })
            ));
        }
    }

    // chr3 is unique to sampleB
    assert_eq!(
        dec.get_sequence(None, "chr3", 100, 129).unwrap(),
        dec.get_sequence(Some("sampleB"), "chr3", 100, 129).unwrap()
    );
}
