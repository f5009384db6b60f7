// Container I/O
// Named streams of parts; a footer at the end of the file indexes every part

use crate::error::{AgcError, Result};
use crate::varint::{
    decode_string, decode_varint, encode_string, encode_varint, read_varint, write_varint,
};
use ahash::AHashMap;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Size of the fixed trailer holding the footer length
const TRAILER_SIZE: u64 = 8;

/// A part within a stream; `size` covers the data only, not the metadata varint
#[derive(Debug, Clone, Copy)]
struct Part {
    offset: u64,
    size: u64,
}

#[derive(Debug)]
struct Stream {
    name: String,
    raw_size: u64,
    parts: Vec<Part>,
}

impl Stream {
    fn new(name: String) -> Self {
        Stream {
            name,
            raw_size: 0,
            parts: Vec::new(),
        }
    }
}

/// Write side of the container
///
/// Parts are appended as `varint(metadata) ++ data`; `finish` writes the footer.
pub struct ArchiveWriter {
    writer: BufWriter<File>,
    offset: u64,
    streams: Vec<Stream>,
    stream_map: AHashMap<String, usize>,
}

impl ArchiveWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(ArchiveWriter {
            writer: BufWriter::new(file),
            offset: 0,
            streams: Vec::new(),
            stream_map: AHashMap::new(),
        })
    }

    /// Register a stream (idempotent) and return its id
    pub fn register_stream(&mut self, name: &str) -> usize {
        if let Some(&id) = self.stream_map.get(name) {
            return id;
        }

        let id = self.streams.len();
        self.streams.push(Stream::new(name.to_string()));
        self.stream_map.insert(name.to_string(), id);
        id
    }

    pub fn add_part(&mut self, stream_id: usize, data: &[u8], metadata: u64) -> Result<()> {
        let stream = self.streams.get_mut(stream_id).ok_or_else(|| {
            AgcError::InvalidInput(format!("invalid stream id: {stream_id}"))
        })?;

        let part_offset = self.offset;
        let meta_len = write_varint(&mut self.writer, metadata)?;
        self.writer.write_all(data)?;
        self.offset += (meta_len + data.len()) as u64;

        stream.parts.push(Part {
            offset: part_offset,
            size: data.len() as u64,
        });
        Ok(())
    }

    /// Record the uncompressed size of a stream's content
    pub fn set_raw_size(&mut self, stream_id: usize, raw_size: u64) {
        if let Some(stream) = self.streams.get_mut(stream_id) {
            stream.raw_size = raw_size;
        }
    }

    /// Write the footer and flush the file
    pub fn finish(mut self) -> Result<()> {
        let mut footer = Vec::new();
        encode_varint(&mut footer, self.streams.len() as u64);

        for stream in &self.streams {
            encode_string(&mut footer, &stream.name);
            encode_varint(&mut footer, stream.parts.len() as u64);
            encode_varint(&mut footer, stream.raw_size);
            for part in &stream.parts {
                encode_varint(&mut footer, part.offset);
                encode_varint(&mut footer, part.size);
            }
        }

        self.writer.write_all(&footer)?;
        self.writer.write_all(&(footer.len() as u64).to_le_bytes())?;
        self.writer.flush()?;

        debug!(
            "container closed: {} streams, {} data bytes, {} footer bytes",
            self.streams.len(),
            self.offset,
            footer.len()
        );
        Ok(())
    }
}

/// Where part bytes come from once the footer has been parsed
enum PartSource {
    /// Whole file loaded at open time
    Memory(Vec<u8>),
    /// Positioned reads; the lock is held for one part read
    File(Mutex<File>),
}

/// Read side of the container
///
/// Immutable after `open`, so one reader can be shared across threads.
pub struct ArchiveReader {
    source: PartSource,
    streams: Vec<Stream>,
    stream_map: AHashMap<String, usize>,
}

impl ArchiveReader {
    /// Open a container and parse its footer
    ///
    /// With `prefetch` the whole file is read into memory; otherwise parts
    /// are read from the file on demand.
    pub fn open<P: AsRef<Path>>(path: P, prefetch: bool) -> Result<Self> {
        let path = path.as_ref();

        let (source, footer) = if prefetch {
            let bytes = std::fs::read(path)?;
            let footer = Self::locate_footer(bytes.len() as u64, |offset, len| {
                let start = offset as usize;
                Ok(bytes[start..start + len].to_vec())
            })?;
            (PartSource::Memory(bytes), footer)
        } else {
            let mut file = File::open(path)?;
            let file_size = file.metadata()?.len();
            let footer = Self::locate_footer(file_size, |offset, len| {
                let mut buf = vec![0u8; len];
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf)?;
                Ok(buf)
            })?;
            (PartSource::File(Mutex::new(file)), footer)
        };

        let (footer_start, footer) = footer;
        let streams = Self::parse_footer(&footer, footer_start)?;

        let mut stream_map = AHashMap::with_capacity(streams.len());
        for (id, stream) in streams.iter().enumerate() {
            if stream_map.insert(stream.name.clone(), id).is_some() {
                return Err(AgcError::corrupted(format!(
                    "duplicate stream name: {}",
                    stream.name
                )));
            }
        }

        debug!(
            "container opened: {} streams, prefetch={}",
            streams.len(),
            prefetch
        );

        Ok(ArchiveReader {
            source,
            streams,
            stream_map,
        })
    }

    /// Read the trailer and return `(footer_start, footer_bytes)`
    fn locate_footer<F>(file_size: u64, mut read_at: F) -> Result<(u64, Vec<u8>)>
    where
        F: FnMut(u64, usize) -> Result<Vec<u8>>,
    {
        if file_size < TRAILER_SIZE {
            return Err(AgcError::corrupted(format!(
                "file too short for a container ({file_size} bytes)"
            )));
        }

        let trailer = read_at(file_size - TRAILER_SIZE, TRAILER_SIZE as usize)?;
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&trailer);
        let footer_size = u64::from_le_bytes(size_bytes);

        if footer_size > file_size - TRAILER_SIZE {
            return Err(AgcError::corrupted(format!(
                "footer size {footer_size} exceeds file size {file_size}"
            )));
        }

        let footer_start = file_size - TRAILER_SIZE - footer_size;
        let footer = read_at(footer_start, footer_size as usize)?;
        Ok((footer_start, footer))
    }

    fn parse_footer(footer: &[u8], data_end: u64) -> Result<Vec<Stream>> {
        let mut ptr = footer;
        let no_streams = decode_varint(&mut ptr)?;

        let mut streams = Vec::new();
        for _ in 0..no_streams {
            let mut stream = Stream::new(decode_string(&mut ptr)?);
            let no_parts = decode_varint(&mut ptr)?;
            stream.raw_size = decode_varint(&mut ptr)?;

            for _ in 0..no_parts {
                let offset = decode_varint(&mut ptr)?;
                let size = decode_varint(&mut ptr)?;
                if offset.checked_add(size).is_none_or(|end| end > data_end) {
                    return Err(AgcError::corrupted(format!(
                        "part of stream {} lies outside the data area",
                        stream.name
                    )));
                }
                stream.parts.push(Part { offset, size });
            }

            streams.push(stream);
        }

        if !ptr.is_empty() {
            return Err(AgcError::corrupted("trailing bytes after footer"));
        }

        Ok(streams)
    }

    pub fn stream_id(&self, name: &str) -> Option<usize> {
        self.stream_map.get(name).copied()
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.name.clone()).collect()
    }

    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn num_parts(&self, stream_id: usize) -> usize {
        self.streams.get(stream_id).map_or(0, |s| s.parts.len())
    }

    pub fn raw_size(&self, stream_id: usize) -> u64 {
        self.streams.get(stream_id).map_or(0, |s| s.raw_size)
    }

    /// Sum of stored data sizes of a stream's parts
    pub fn packed_size(&self, stream_id: usize) -> u64 {
        self.streams
            .get(stream_id)
            .map_or(0, |s| s.parts.iter().map(|p| p.size).sum())
    }

    /// Random access to one part, returning `(data, metadata)`
    pub fn get_part(&self, stream_id: usize, part_id: usize) -> Result<(Vec<u8>, u64)> {
        let stream = self
            .streams
            .get(stream_id)
            .ok_or_else(|| AgcError::corrupted(format!("invalid stream id: {stream_id}")))?;
        let part = *stream.parts.get(part_id).ok_or_else(|| {
            AgcError::corrupted(format!(
                "stream {} has no part {part_id}",
                stream.name
            ))
        })?;

        match &self.source {
            PartSource::Memory(bytes) => {
                let mut cursor = Cursor::new(bytes.as_slice());
                cursor.set_position(part.offset);
                Self::read_part(&mut cursor, part.size)
            }
            PartSource::File(file) => {
                let mut file = file
                    .lock()
                    .map_err(|_| AgcError::corrupted("archive file lock poisoned"))?;
                file.seek(SeekFrom::Start(part.offset))?;
                Self::read_part(&mut *file, part.size)
            }
        }
    }

    /// Fetch the single part of a one-part stream by name
    pub fn get_single_part(&self, name: &str) -> Result<(Vec<u8>, u64)> {
        let stream_id = self
            .stream_id(name)
            .ok_or_else(|| AgcError::corrupted(format!("{name} stream not found")))?;
        let no_parts = self.num_parts(stream_id);
        if no_parts != 1 {
            return Err(AgcError::corrupted(format!(
                "expected 1 part in {name} stream, found {no_parts}"
            )));
        }
        self.get_part(stream_id, 0)
    }

    fn read_part<R: Read>(reader: &mut R, size: u64) -> Result<(Vec<u8>, u64)> {
        let metadata = read_varint(reader)
            .map_err(|e| AgcError::corrupted(format!("cannot read part metadata: {e}")))?;
        let mut data = vec![0u8; size as usize];
        reader
            .read_exact(&mut data)
            .map_err(|e| AgcError::corrupted(format!("cannot read part data: {e}")))?;
        Ok((data, metadata))
    }
}
