// Query walkthrough
//
// Opens an archive, lists its samples and the contigs of the first one,
// then fetches a 5-base window of the first contig, qualified and
// unqualified.

use agcx_core::{clamp_range, AgcError, Decompressor, DecompressorConfig};
use anyhow::Result;

const WINDOW_START: u64 = 8;
const WINDOW_LEN: u64 = 5;

fn main() -> Result<()> {
    let archive_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data.agcx".to_string());

    let archive = match Decompressor::open(&archive_path, DecompressorConfig::default()) {
        Ok(archive) => archive,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let samples = archive.list_samples();
    println!("{} samples", archive.n_samples());
    for sample in &samples {
        println!("  {sample}: {} contigs", archive.n_contigs(sample)?);
    }

    let Some(first) = archive.reference_sample() else {
        println!("archive is empty");
        return Ok(());
    };

    let contigs = archive.list_contigs(first)?;
    println!("\ncontigs of {first}:");
    for contig in &contigs {
        println!("  {contig}\t{}", archive.contig_length(Some(first), contig)?);
    }

    let Some(contig) = contigs.first() else {
        return Ok(());
    };
    let len = archive.contig_length(Some(first), contig)?;
    let Some((start, end)) = clamp_range(WINDOW_START, WINDOW_LEN, len) else {
        println!("{contig} is empty");
        return Ok(());
    };

    let qualified = archive.get_sequence(Some(first), contig, start as i64, end as i64)?;
    println!("\n{contig}@{first}:{start}-{end}\t{qualified}");

    match archive.get_sequence(None, contig, start as i64, end as i64) {
        Ok(seq) => println!("{contig}:{start}-{end}\t{seq}"),
        Err(AgcError::Ambiguous { samples, .. }) => {
            println!("{contig} is held by {} samples; qualify the name", samples.len())
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
