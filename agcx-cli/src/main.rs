// agcx command-line tool

use agcx_core::{
    Compressor, CompressorConfig, ContigQuery, Decompressor, DecompressorConfig, GenomeWriter,
};
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{info, LevelFilter};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "agcx")]
#[command(version, about = "Assembled genomes archive", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); AGCX_LOG overrides
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Archive to read and how to access it
#[derive(Args, Debug)]
struct ReadArgs {
    /// Input archive file path
    archive: PathBuf,

    /// Read parts from the file on demand instead of loading it into memory
    #[arg(long)]
    no_prefetch: bool,
}

impl ReadArgs {
    fn open(&self) -> Result<Decompressor> {
        let config = DecompressorConfig {
            prefetch: !self.no_prefetch,
        };
        Ok(Decompressor::open(&self.archive, config)?)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new archive from FASTA files; the first file is the reference
    Create {
        /// Output archive file path
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Input FASTA files, plain or gzipped, one sample each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Bases per stored segment
        #[arg(short = 's', long, default_value_t = 60000)]
        segment_size: u32,

        /// Minimum match length for delta encoding
        #[arg(short = 'l', long, default_value_t = 20)]
        min_match_len: u32,

        /// ZSTD compression level of delta chunks (1-22)
        #[arg(short = 'c', long, default_value_t = 17)]
        compression_level: i32,

        /// Worker threads (default: all cores)
        #[arg(short = 't', long)]
        threads: Option<usize>,
    },

    /// Write a new archive holding an existing one plus more FASTA files
    Append {
        /// Existing archive; left unchanged
        input: PathBuf,

        /// Input FASTA files to add, one sample each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output archive file path
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Worker threads (default: all cores)
        #[arg(short = 't', long)]
        threads: Option<usize>,
    },

    /// Extract every sample to <output>/<sample>.fa
    Getcol {
        #[command(flatten)]
        read: ReadArgs,

        /// FASTA line length (0 = no wrapping)
        #[arg(short = 'l', long, default_value_t = 80)]
        line_length: usize,

        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,
    },

    /// Extract whole samples as FASTA
    Getset {
        #[command(flatten)]
        read: ReadArgs,

        /// Sample name(s) to extract
        #[arg(required = true)]
        samples: Vec<String>,

        /// FASTA line length (0 = no wrapping)
        #[arg(short = 'l', long, default_value_t = 80)]
        line_length: usize,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Extract contigs or contig ranges as FASTA
    ///
    /// Queries: contig, contig@sample, contig:from-to, contig@sample:from-to
    /// (0-based, inclusive).
    Getctg {
        #[command(flatten)]
        read: ReadArgs,

        #[arg(required = true)]
        queries: Vec<String>,

        /// FASTA line length (0 = no wrapping)
        #[arg(short = 'l', long, default_value_t = 80)]
        line_length: usize,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// List sample names in stored order
    Listset {
        #[command(flatten)]
        read: ReadArgs,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// List contigs and their lengths for sample(s)
    Listctg {
        #[command(flatten)]
        read: ReadArgs,

        /// Sample name(s) to list contigs for
        #[arg(required = true)]
        samples: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the reference sample name
    Listref {
        #[command(flatten)]
        read: ReadArgs,
    },

    /// Display information about an archive
    Info {
        #[command(flatten)]
        read: ReadArgs,
    },
}

/// Sample name from a file path with genomic extensions stripped
///   scerevisiae8.fa.gz -> scerevisiae8
///   genome.fasta       -> genome
fn extract_sample_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    let extensions = [".fa.gz", ".fasta.gz", ".fna.gz", ".fa", ".fasta", ".fna", ".gz"];
    extensions
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
        .to_string()
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(env_logger::Env::new().filter("AGCX_LOG"))
        .format_timestamp(None)
        .init();
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Create {
            output,
            inputs,
            segment_size,
            min_match_len,
            compression_level,
            threads,
        } => {
            let mut config = CompressorConfig {
                segment_size,
                min_match_len,
                compression_level,
                ..CompressorConfig::default()
            };
            if let Some(threads) = threads {
                config.num_threads = threads;
            }
            create_command(&output, &inputs, config)?
        }

        Commands::Append {
            input,
            inputs,
            output,
            threads,
        } => {
            let threads = threads.unwrap_or_else(|| CompressorConfig::default().num_threads);
            append_command(&input, &inputs, &output, threads)?
        }

        Commands::Getcol {
            read,
            line_length,
            output,
        } => {
            let archive = read.open()?;
            let files = archive.save_collection(&output, line_length)?;
            info!("{} samples written to {}", files.len(), output.display());
        }

        Commands::Getset {
            read,
            samples,
            line_length,
            output,
        } => getset_command(&read, &samples, line_length, output.as_deref())?,

        Commands::Getctg {
            read,
            queries,
            line_length,
            output,
        } => getctg_command(&read, &queries, line_length, output.as_deref())?,

        Commands::Listset { read, output } => listset_command(&read, output.as_deref())?,

        Commands::Listctg {
            read,
            samples,
            output,
        } => listctg_command(&read, &samples, output.as_deref())?,

        Commands::Listref { read } => {
            let archive = read.open()?;
            if let Some(reference) = archive.reference_sample() {
                println!("{reference}");
            }
        }

        Commands::Info { read } => info_command(&read)?,
    }

    Ok(())
}

fn create_command(output: &Path, inputs: &[PathBuf], config: CompressorConfig) -> Result<()> {
    info!(
        "creating {} from {} file(s), segment size {}, min match {}",
        output.display(),
        inputs.len(),
        config.segment_size,
        config.min_match_len
    );

    let compressor = Compressor::new(output, config)?;
    add_fasta_files(compressor, inputs)
}

fn append_command(
    archive: &Path,
    inputs: &[PathBuf],
    output: &Path,
    threads: usize,
) -> Result<()> {
    info!(
        "appending {} file(s) to {} as {}",
        inputs.len(),
        archive.display(),
        output.display()
    );
    let compressor = Compressor::append(archive, output, threads)?;
    add_fasta_files(compressor, inputs)
}

fn add_fasta_files(mut compressor: Compressor, inputs: &[PathBuf]) -> Result<()> {
    for input in inputs {
        let sample_name = extract_sample_name(input);
        info!("adding sample {sample_name} from {}", input.display());
        compressor
            .add_fasta_file(&sample_name, input)
            .with_context(|| format!("Failed to add sample {sample_name}"))?;
    }
    compressor.finalize()
}

fn getset_command(
    read: &ReadArgs,
    samples: &[String],
    line_length: usize,
    output: Option<&Path>,
) -> Result<()> {
    let archive = read.open()?;
    let mut out = open_output(output)?;
    for sample in samples {
        archive.write_sample_fasta(sample, &mut out, line_length)?;
    }
    out.flush()?;
    Ok(())
}

fn getctg_command(
    read: &ReadArgs,
    queries: &[String],
    line_length: usize,
    output: Option<&Path>,
) -> Result<()> {
    let archive = read.open()?;

    // Parse everything first so a typo fails before any output
    let queries = queries
        .iter()
        .map(|q| q.parse::<ContigQuery>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = GenomeWriter::new(open_output(output)?, line_length);
    for query in &queries {
        let contig = archive.get_query(query)?;
        writer.save_contig(&query.to_string(), &contig)?;
    }
    writer.flush()?;
    Ok(())
}

fn listset_command(read: &ReadArgs, output: Option<&Path>) -> Result<()> {
    let archive = read.open()?;
    let mut out = open_output(output)?;
    for sample in archive.list_samples() {
        writeln!(out, "{sample}")?;
    }
    out.flush()?;
    Ok(())
}

fn listctg_command(read: &ReadArgs, samples: &[String], output: Option<&Path>) -> Result<()> {
    let archive = read.open()?;
    let mut out = open_output(output)?;
    for sample in samples {
        for contig in archive.list_contigs(sample)? {
            let len = archive.contig_length(Some(sample), &contig)?;
            writeln!(out, "{sample}\t{contig}\t{len}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn info_command(read: &ReadArgs) -> Result<()> {
    let archive = read.open()?;
    let params = archive.params();
    let stats = archive.stats();

    println!("Archive: {}", archive.path().display());
    for (key, value) in archive.file_type_info() {
        println!("  {key}: {value}");
    }
    println!("Parameters:");
    println!("  segment size: {}", params.segment_size);
    println!("  min match length: {}", params.min_match_len);
    println!("  compression level: {}", params.compression_level);
    println!("Contents:");
    println!("  samples: {}", stats.n_samples);
    println!(
        "  reference: {}",
        archive.reference_sample().unwrap_or("(none)")
    );
    println!(
        "  contigs: {} ({} raw, {} delta)",
        stats.n_contigs, stats.raw_contigs, stats.delta_contigs
    );
    println!("  bases: {}", stats.total_bases);
    println!("  packed bytes: {}", stats.packed_bytes);
    if stats.total_bases > 0 {
        println!(
            "  ratio: {:.2}",
            stats.total_bases as f64 / stats.packed_bytes.max(1) as f64
        );
    }
    Ok(())
}
