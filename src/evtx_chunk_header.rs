use crate::err::{EvtxError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use serde::Serialize;
use std::io::{Cursor, Read};

pub const EVTX_CHUNK_HEADER_MAGIC: &[u8; 8] = b"ElfChnk\x00";

/// The fixed 512-byte chunk prelude.
///
/// Record *numbers* are sequence positions within the chunk; record *ids*
/// are monotonic across the whole file. A sparse tail chunk carries the
/// `0xffffffffffffffff` sentinel in `last_event_record_id`.
#[derive(Debug, PartialEq, Serialize)]
pub struct EvtxChunkHeader {
    pub first_event_record_number: u64,
    pub last_event_record_number: u64,
    pub first_event_record_id: u64,
    pub last_event_record_id: u64,
    pub header_size: u32,
    pub last_event_record_data_offset: u32,
    pub free_space_offset: u32,
    pub events_checksum: u32,
    pub header_chunk_checksum: u32,
}

impl EvtxChunkHeader {
    /// Read and validate one 512-byte chunk header. EOF surfaces as an
    /// `IO` error so the container walk can tell "end of file" apart from
    /// "not a chunk".
    pub fn from_stream<T: Read>(stream: &mut T) -> Result<EvtxChunkHeader> {
        let mut header_bytes = [0_u8; 512];
        stream.read_exact(&mut header_bytes)?;

        let mut input = Cursor::new(header_bytes.as_slice());

        let mut magic = [0_u8; 8];
        input.read_exact(&mut magic)?;
        if &magic != EVTX_CHUNK_HEADER_MAGIC {
            return Err(EvtxError::InvalidEvtxChunkMagic { magic });
        }

        let first_event_record_number = input.read_u64::<LittleEndian>()?;
        let last_event_record_number = input.read_u64::<LittleEndian>()?;
        let first_event_record_id = input.read_u64::<LittleEndian>()?;
        let last_event_record_id = input.read_u64::<LittleEndian>()?;

        let header_size = input.read_u32::<LittleEndian>()?;
        let last_event_record_data_offset = input.read_u32::<LittleEndian>()?;
        let free_space_offset = input.read_u32::<LittleEndian>()?;
        let events_checksum = input.read_u32::<LittleEndian>()?;

        // 64 reserved bytes, then 4 bytes of flags.
        let header_chunk_checksum =
            u32::from_le_bytes(header_bytes[124..128].try_into().expect("4 bytes"));

        let header = EvtxChunkHeader {
            first_event_record_number,
            last_event_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_event_record_data_offset,
            free_space_offset,
            events_checksum,
            header_chunk_checksum,
        };

        // The checksum skips its own slot (bytes 120..128). Dirty files are
        // common; a mismatch is logged and decoding continues.
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes[..120]);
        hasher.update(&header_bytes[128..]);
        let computed = hasher.finalize();
        if computed != header.header_chunk_checksum {
            warn!(
                "chunk header checksum mismatch: computed {computed:#x}, stored {:#x}",
                header.header_chunk_checksum
            );
        }

        Ok(header)
    }

    /// Sparse tail chunks are allocated but never written.
    pub fn is_sparse(&self) -> bool {
        self.last_event_record_id == u64::MAX
    }
}
