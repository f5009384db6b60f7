// FASTA genome I/O

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use agcx_common::{decode_base, encode_base, AgcError, Contig, Result};
use flate2::read::MultiGzDecoder;

/// Contig name of a FASTA header line: the text after `>` up to the
/// first whitespace
pub fn contig_name_from_header(line: &[u8]) -> String {
    let line = line.strip_prefix(b">").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    text.split_whitespace().next().unwrap_or_default().to_string()
}

/// FASTA reader yielding contigs as nucleotide codes
pub struct GenomeIO<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    next_header: Option<Vec<u8>>,
    finished: bool,
}

impl<R: Read> GenomeIO<R> {
    pub fn new(reader: R) -> Self {
        GenomeIO {
            reader: BufReader::with_capacity(1 << 20, reader),
            buffer: Vec::with_capacity(1 << 16),
            next_header: None,
            finished: false,
        }
    }

    /// Read the next contig; `None` at end of input
    ///
    /// Line breaks and other non-letters are dropped, letters outside the
    /// nucleotide alphabet become `N`.
    pub fn read_contig(&mut self) -> Result<Option<(String, Contig)>> {
        if self.finished {
            return Ok(None);
        }

        let header = match self.next_header.take() {
            Some(h) => h,
            None => loop {
                self.buffer.clear();
                if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                    self.finished = true;
                    return Ok(None);
                }
                if self.buffer.starts_with(b">") {
                    break self.buffer.clone();
                }
                if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(AgcError::InvalidInput(
                        "FASTA data does not start with a '>' header".to_string(),
                    ));
                }
            },
        };

        let name = contig_name_from_header(&header);
        if name.is_empty() {
            return Err(AgcError::InvalidInput(format!(
                "FASTA header without a name: {:?}",
                String::from_utf8_lossy(&header).trim_end()
            )));
        }

        let mut contig = Contig::new();
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                self.finished = true;
                break;
            }
            if self.buffer.starts_with(b">") {
                self.next_header = Some(self.buffer.clone());
                break;
            }
            contig.extend(self.buffer.iter().filter_map(|&c| encode_base(c)));
        }

        Ok(Some((name, contig)))
    }

    /// Read all remaining contigs
    pub fn read_all(&mut self) -> Result<Vec<(String, Contig)>> {
        let mut contigs = Vec::new();
        while let Some(entry) = self.read_contig()? {
            contigs.push(entry);
        }
        Ok(contigs)
    }
}

impl GenomeIO<Box<dyn Read>> {
    /// Open a FASTA file; `.gz` files are decompressed on the fly
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let reader: Box<dyn Read> = if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            // bgzip files are multi-member
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Ok(GenomeIO::new(reader))
    }
}

/// FASTA writer for code-encoded contigs
pub struct GenomeWriter<W> {
    writer: W,
    line_length: usize,
}

impl<W: Write> GenomeWriter<W> {
    /// `line_length == 0` writes every sequence on a single line
    pub fn new(writer: W, line_length: usize) -> Self {
        GenomeWriter {
            writer,
            line_length,
        }
    }

    pub fn save_contig(&mut self, name: &str, contig: &[u8]) -> Result<()> {
        writeln!(self.writer, ">{name}")?;

        let ascii: Vec<u8> = contig.iter().map(|&c| decode_base(c)).collect();
        if self.line_length == 0 {
            if ascii.is_empty() {
                return Ok(());
            }
            self.writer.write_all(&ascii)?;
            writeln!(self.writer)?;
        } else {
            for line in ascii.chunks(self.line_length) {
                self.writer.write_all(line)?;
                writeln!(self.writer)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
