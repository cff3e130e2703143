use crate::err::{EvtxError, Result};
use crate::utils::{ByteCursor, timestamp_from_filetime};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

pub const EVTX_RECORD_HEADER_MAGIC: &[u8; 4] = b"\x2a\x2a\x00\x00";
pub const EVTX_RECORD_HEADER_SIZE: usize = 24;

/// The 24-byte record prelude. `size` covers the whole record including this
/// header and is what chains records within a chunk.
#[derive(Debug, PartialEq)]
pub struct EvtxRecordHeader {
    pub size: u32,
    pub record_id: u64,
    pub timestamp: Timestamp,
}

impl EvtxRecordHeader {
    pub(crate) fn read(cursor: &mut ByteCursor<'_>) -> Result<EvtxRecordHeader> {
        let magic_bytes = cursor.take_bytes(4);
        let mut magic = [0_u8; 4];
        magic.copy_from_slice(&magic_bytes);

        if &magic != EVTX_RECORD_HEADER_MAGIC {
            return Err(EvtxError::InvalidEvtxRecordHeaderMagic { magic });
        }

        let size = cursor.u32();
        let record_id = cursor.u64();
        let timestamp = timestamp_from_filetime(cursor.u64());

        Ok(EvtxRecordHeader {
            size,
            record_id,
            timestamp,
        })
    }
}

/// One fully-expanded event record.
///
/// `event` is the ordered key/value tree; records whose BinXML expands to
/// nothing carry `Value::Null` and are typically skipped by consumers.
#[derive(Debug, Serialize)]
pub struct EvtxRecord {
    pub event_record_id: u64,
    pub timestamp: Timestamp,
    pub event: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_record_header() {
        let mut data = Vec::new();
        data.extend_from_slice(EVTX_RECORD_HEADER_MAGIC);
        data.extend_from_slice(&1234_u32.to_le_bytes());
        data.extend_from_slice(&42_u64.to_le_bytes());
        data.extend_from_slice(&131_127_223_716_816_401_u64.to_le_bytes());

        let mut cursor = ByteCursor::new(&data);
        let header = EvtxRecordHeader::read(&mut cursor).unwrap();

        assert_eq!(header.size, 1234);
        assert_eq!(header.record_id, 42);
        assert_eq!(header.timestamp.to_string(), "2016-07-08T18:12:51.6816401Z");
        assert_eq!(cursor.pos(), EVTX_RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let data = [0_u8; 24];
        let mut cursor = ByteCursor::new(&data);

        assert!(matches!(
            EvtxRecordHeader::read(&mut cursor),
            Err(EvtxError::InvalidEvtxRecordHeaderMagic { magic: [0, 0, 0, 0] })
        ));
    }

    #[test]
    fn test_zero_filled_tail_reads_as_bad_magic() {
        // Past the end of the chunk the cursor serves zeroes, which must
        // terminate the record walk rather than loop.
        let data: [u8; 0] = [];
        let mut cursor = ByteCursor::new(&data);
        assert!(EvtxRecordHeader::read(&mut cursor).is_err());
    }
}
