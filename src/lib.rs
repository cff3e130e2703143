pub mod err;

mod binxml;
mod evtx_chunk;
mod evtx_chunk_header;
mod evtx_file_header;
mod evtx_parser;
mod evtx_record;
mod guid;
mod messages;
mod normalize;
mod ntsid;
mod template;
mod utils;

#[cfg(test)]
mod tests;

pub use evtx_chunk::EvtxChunk;
pub use evtx_chunk_header::{EVTX_CHUNK_HEADER_MAGIC, EvtxChunkHeader};
pub use evtx_file_header::{EVTX_FILE_HEADER_MAGIC, EvtxFileHeader};
pub use evtx_parser::{EvtxParser, ParserSettings, ReadSeek, RecordsIter};
pub use evtx_record::{
    EVTX_RECORD_HEADER_MAGIC, EVTX_RECORD_HEADER_SIZE, EvtxRecord, EvtxRecordHeader,
};
pub use guid::Guid;
pub use messages::{MessageResolver, NullResolver, expand_message};
pub use normalize::normalize_event_data;
pub use ntsid::Sid;

/// Chunks are laid out at this fixed stride.
pub const EVTX_CHUNK_SIZE: usize = 0x10000;
/// Record data starts past the 512-byte chunk header.
pub const EVTX_CHUNK_HEADER_SIZE: usize = 0x200;

// For tests, we only initialize logging once.
#[cfg(test)]
pub(crate) fn ensure_env_logger_initialized() {
    use std::sync::Once;
    static LOGGER_INIT: Once = Once::new();
    LOGGER_INIT.call_once(env_logger::init);
}
