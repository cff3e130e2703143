use crate::err::{EvtxError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};

pub const EVTX_FILE_HEADER_MAGIC: &[u8; 8] = b"ElfFile\x00";

/// The fixed 128-byte file prelude. Chunks start at `header_block_size`.
#[derive(Debug, PartialEq, Serialize)]
pub struct EvtxFileHeader {
    pub first_chunk_number: u64,
    pub last_chunk_number: u64,
    pub next_record_id: u64,
    pub header_size: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub header_block_size: u16,
    pub chunk_count: u16,
    pub flags: u32,
    // Checksum is of the first 120 bytes of the header.
    pub checksum: u32,
}

impl EvtxFileHeader {
    pub fn from_stream<T: Read + Seek>(stream: &mut T) -> Result<EvtxFileHeader> {
        let mut magic = [0_u8; 8];
        stream.read_exact(&mut magic)?;

        if &magic != EVTX_FILE_HEADER_MAGIC {
            return Err(EvtxError::InvalidEvtxFileHeaderMagic { magic });
        }

        let first_chunk_number = stream.read_u64::<LittleEndian>()?;
        let last_chunk_number = stream.read_u64::<LittleEndian>()?;
        let next_record_id = stream.read_u64::<LittleEndian>()?;
        let header_size = stream.read_u32::<LittleEndian>()?;
        let minor_version = stream.read_u16::<LittleEndian>()?;
        let major_version = stream.read_u16::<LittleEndian>()?;
        let header_block_size = stream.read_u16::<LittleEndian>()?;
        let chunk_count = stream.read_u16::<LittleEndian>()?;

        // Reserved
        stream.seek(SeekFrom::Current(76))?;
        let flags = stream.read_u32::<LittleEndian>()?;
        let checksum = stream.read_u32::<LittleEndian>()?;

        Ok(EvtxFileHeader {
            first_chunk_number,
            last_chunk_number,
            next_record_id,
            header_size,
            minor_version,
            major_version,
            header_block_size,
            chunk_count,
            flags,
            checksum,
        })
    }

    pub fn is_supported_version(&self) -> bool {
        self.major_version == 3 && matches!(self.minor_version, 0 | 1 | 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    pub(crate) fn header_image(major: u16, minor: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(EVTX_FILE_HEADER_MAGIC);
        buf.extend_from_slice(&0_u64.to_le_bytes()); // first chunk
        buf.extend_from_slice(&25_u64.to_le_bytes()); // last chunk
        buf.extend_from_slice(&2226_u64.to_le_bytes()); // next record id
        buf.extend_from_slice(&128_u32.to_le_bytes()); // header size
        buf.extend_from_slice(&minor.to_le_bytes());
        buf.extend_from_slice(&major.to_le_bytes());
        buf.extend_from_slice(&4096_u16.to_le_bytes()); // header block size
        buf.extend_from_slice(&26_u16.to_le_bytes()); // chunk count
        buf.resize(120, 0);
        buf.extend_from_slice(&1_u32.to_le_bytes()); // flags (dirty)
        buf.extend_from_slice(&crc32fast::hash(&buf[..120]).to_le_bytes());
        buf
    }

    #[test]
    fn test_parses_file_header() {
        let image = header_image(3, 1);
        let mut reader = Cursor::new(image.as_slice());
        let header = EvtxFileHeader::from_stream(&mut reader).unwrap();

        assert_eq!(
            header,
            EvtxFileHeader {
                first_chunk_number: 0,
                last_chunk_number: 25,
                next_record_id: 2226,
                header_size: 128,
                minor_version: 1,
                major_version: 3,
                header_block_size: 4096,
                chunk_count: 26,
                flags: 1,
                checksum: crc32fast::hash(&image[..120]),
            }
        );
        assert!(header.is_supported_version());
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut image = header_image(3, 1);
        image[0] = b'X';
        let mut reader = Cursor::new(image.as_slice());

        assert!(matches!(
            EvtxFileHeader::from_stream(&mut reader),
            Err(EvtxError::InvalidEvtxFileHeaderMagic { .. })
        ));
    }

    #[test]
    fn test_version_gate() {
        for (major, minor, supported) in
            [(3, 0, true), (3, 1, true), (3, 2, true), (3, 3, false), (4, 1, false)]
        {
            let image = header_image(major, minor);
            let mut reader = Cursor::new(image.as_slice());
            let header = EvtxFileHeader::from_stream(&mut reader).unwrap();
            assert_eq!(header.is_supported_version(), supported);
        }
    }
}
