use crate::err::{EvtxError, Result};
use crate::evtx_chunk::EvtxChunk;
use crate::evtx_file_header::EvtxFileHeader;
use crate::evtx_record::EvtxRecord;
use crate::EVTX_CHUNK_SIZE;
use log::warn;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Parser configuration.
///
/// `num_threads` only matters for [`EvtxParser::records_parallel`]; zero
/// means "let the thread pool decide".
#[derive(Debug, Clone, Default)]
pub struct ParserSettings {
    num_threads: usize,
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

/// Reads EVTX containers: validates the file header, walks the chunk table,
/// and streams expanded event records.
pub struct EvtxParser<T: ReadSeek> {
    stream: T,
    header: EvtxFileHeader,
    settings: ParserSettings,
}

impl EvtxParser<File> {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EvtxError::FailedToOpenFile {
            source: e,
            path: path.to_path_buf(),
        })?;
        Self::from_read_seek(file)
    }
}

impl EvtxParser<Cursor<Vec<u8>>> {
    pub fn from_buffer(buffer: Vec<u8>) -> Result<Self> {
        Self::from_read_seek(Cursor::new(buffer))
    }
}

impl<T: ReadSeek> EvtxParser<T> {
    /// Validate the file header; refuses non-EVTX streams and unsupported
    /// versions up front.
    pub fn from_read_seek(mut stream: T) -> Result<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let header = EvtxFileHeader::from_stream(&mut stream)?;

        if !header.is_supported_version() {
            return Err(EvtxError::UnsupportedVersion {
                major: header.major_version,
                minor: header.minor_version,
            });
        }

        Ok(EvtxParser {
            stream,
            header,
            settings: ParserSettings::default(),
        })
    }

    pub fn with_configuration(mut self, settings: ParserSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn header(&self) -> &EvtxFileHeader {
        &self.header
    }

    /// Walk the chunk table at the fixed 64 KiB stride, skipping strides
    /// that do not hold a chunk (bad magic) and sparse tail chunks. Stops at
    /// end of stream.
    pub fn chunks(&mut self) -> Result<Vec<EvtxChunk>> {
        let mut chunks = Vec::new();
        let mut offset = u64::from(self.header.header_block_size);

        loop {
            match EvtxChunk::from_stream(&mut self.stream, offset) {
                Ok(chunk) => {
                    if !chunk.header.is_sparse() {
                        chunks.push(chunk);
                    }
                }
                Err(EvtxError::IO { .. }) => break,
                Err(_) => {}
            }
            offset += EVTX_CHUNK_SIZE as u64;
        }

        Ok(chunks)
    }

    /// Decode one chunk previously returned by [`EvtxParser::chunks`].
    pub fn parse_chunk(&mut self, chunk: &EvtxChunk, start_record_id: u64) -> Result<Vec<EvtxRecord>> {
        chunk.parse(&mut self.stream, start_record_id)
    }

    /// Pull-style stream over every record in the file, in on-disk chunk
    /// order. Dropping the iterator cancels any remaining work.
    pub fn records(&mut self) -> RecordsIter<'_, T> {
        self.records_from(0)
    }

    /// Like [`EvtxParser::records`], but drops records whose id is below
    /// `start_record_id` (they are still decoded for their templates).
    pub fn records_from(&mut self, start_record_id: u64) -> RecordsIter<'_, T> {
        RecordsIter {
            parser: self,
            chunks: Vec::new().into_iter(),
            current: Vec::new().into_iter(),
            start_record_id,
            state: IterState::Fresh,
        }
    }

    /// Decode whole chunks on a worker pool. Chunk buffers are read
    /// sequentially; record order matches [`EvtxParser::records`].
    #[cfg(feature = "multithreading")]
    pub fn records_parallel(&mut self, start_record_id: u64) -> Result<Vec<EvtxRecord>> {
        use rayon::prelude::*;

        let chunks = self.chunks()?;
        let mut buffers = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            self.stream.seek(SeekFrom::Start(chunk.offset))?;
            let mut data = vec![0_u8; EVTX_CHUNK_SIZE];
            match self.stream.read_exact(&mut data) {
                Ok(()) => buffers.push((chunk, data)),
                Err(_) => warn!("skipping truncated chunk at {:#x}", chunk.offset),
            }
        }

        let decode = |buffers: &[(EvtxChunk, Vec<u8>)]| -> Result<Vec<EvtxRecord>> {
            let nested: Vec<Result<Vec<EvtxRecord>>> = buffers
                .par_iter()
                .map(|(chunk, data)| chunk.parse_data(data, start_record_id))
                .collect();

            let mut records = Vec::new();
            for chunk_records in nested {
                records.extend(chunk_records?);
            }
            Ok(records)
        };

        if self.settings.num_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.num_threads)
                .build()
            {
                Ok(pool) => pool.install(|| decode(&buffers)),
                Err(err) => {
                    warn!("failed to build thread pool ({err}), using the global one");
                    decode(&buffers)
                }
            }
        } else {
            decode(&buffers)
        }
    }
}

#[derive(PartialEq)]
enum IterState {
    Fresh,
    Running,
    Done,
}

/// Lazy record stream; see [`EvtxParser::records`].
pub struct RecordsIter<'p, T: ReadSeek> {
    parser: &'p mut EvtxParser<T>,
    chunks: std::vec::IntoIter<EvtxChunk>,
    current: std::vec::IntoIter<EvtxRecord>,
    start_record_id: u64,
    state: IterState,
}

impl<T: ReadSeek> Iterator for RecordsIter<'_, T> {
    type Item = Result<EvtxRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(Ok(record));
            }

            match self.state {
                IterState::Done => return None,
                IterState::Fresh => {
                    self.state = IterState::Running;
                    match self.parser.chunks() {
                        Ok(chunks) => self.chunks = chunks.into_iter(),
                        Err(err) => {
                            self.state = IterState::Done;
                            return Some(Err(err));
                        }
                    }
                }
                IterState::Running => {
                    let chunk = self.chunks.next()?;
                    match chunk.parse(&mut self.parser.stream, self.start_record_id) {
                        Ok(records) => self.current = records.into_iter(),
                        // A broken chunk is reported once; the walk moves on.
                        Err(err) => return Some(Err(err)),
                    }
                }
            }
        }
    }
}

