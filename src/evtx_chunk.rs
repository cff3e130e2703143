use crate::binxml::ParseContext;
use crate::err::{EvtxError, Result};
use crate::evtx_chunk_header::EvtxChunkHeader;
use crate::evtx_parser::ReadSeek;
use crate::evtx_record::{EvtxRecord, EvtxRecordHeader};
use crate::{EVTX_CHUNK_HEADER_SIZE, EVTX_CHUNK_SIZE};
use log::warn;
use serde_json::Value;
use std::io::SeekFrom;

/// One 64 KiB chunk: a validated header plus its absolute file offset. The
/// body is loaded lazily when the chunk is parsed.
#[derive(Debug)]
pub struct EvtxChunk {
    pub header: EvtxChunkHeader,
    pub offset: u64,
}

impl EvtxChunk {
    pub fn from_stream<T: ReadSeek>(stream: &mut T, offset: u64) -> Result<EvtxChunk> {
        stream.seek(SeekFrom::Start(offset))?;
        let header = EvtxChunkHeader::from_stream(stream)?;
        Ok(EvtxChunk { header, offset })
    }

    /// Load the chunk body and decode its records. Records whose id is below
    /// `start_record_id` are decoded but not returned; later records may
    /// reuse templates they define.
    pub fn parse<T: ReadSeek>(
        &self,
        stream: &mut T,
        start_record_id: u64,
    ) -> Result<Vec<EvtxRecord>> {
        stream.seek(SeekFrom::Start(self.offset))?;
        let mut data = vec![0_u8; EVTX_CHUNK_SIZE];
        stream
            .read_exact(&mut data)
            .map_err(|_| EvtxError::IncompleteChunk {
                offset: self.offset,
            })?;

        self.parse_data(&data, start_record_id)
    }

    /// Decode records from an already-loaded chunk body.
    pub fn parse_data(&self, data: &[u8], start_record_id: u64) -> Result<Vec<EvtxRecord>> {
        self.verify_events_checksum(data);

        let mut records = Vec::new();
        let mut ctx = ParseContext::new(data, EVTX_CHUNK_HEADER_SIZE);

        for _ in self.header.first_event_record_number..=self.header.last_event_record_number {
            let start_of_record = ctx.pos();

            let record_header = match EvtxRecordHeader::read(ctx.cursor_mut()) {
                Ok(header) => header,
                // A bad record magic ends this chunk; whatever was collected
                // so far is still good.
                Err(err) => {
                    warn!(
                        "chunk at {:#x}: stopping record walk at {start_of_record:#x}: {err}",
                        self.offset
                    );
                    return Ok(records);
                }
            };

            // Even filtered-out records are decoded, so that the templates
            // they define land in the chunk dictionary.
            let template = ctx.new_template(0);
            ctx.parse();
            let event = template.borrow().expand(None).unwrap_or(Value::Null);

            if record_header.record_id >= start_record_id {
                records.push(EvtxRecord {
                    event_record_id: record_header.record_id,
                    timestamp: record_header.timestamp,
                    event,
                });
            }

            ctx.set_pos(start_of_record + record_header.size as usize);
        }

        Ok(records)
    }

    fn verify_events_checksum(&self, data: &[u8]) {
        let free_space_offset = self.header.free_space_offset as usize;
        if free_space_offset < EVTX_CHUNK_HEADER_SIZE || free_space_offset > data.len() {
            return;
        }

        let computed = crc32fast::hash(&data[EVTX_CHUNK_HEADER_SIZE..free_space_offset]);
        if computed != self.header.events_checksum {
            warn!(
                "chunk at {:#x}: event data checksum mismatch: computed {computed:#x}, stored {:#x}",
                self.offset, self.header.events_checksum
            );
        }
    }
}
