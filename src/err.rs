use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtxError>;

#[derive(Debug, Error)]
pub enum EvtxError {
    #[error("An I/O error has occurred")]
    IO {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to open file {}", path.display())]
    FailedToOpenFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[error("Invalid EVTX file header magic, expected `ElfFile0`, found `{magic:02x?}`")]
    InvalidEvtxFileHeaderMagic { magic: [u8; 8] },

    #[error("Unsupported EVTX version {major}.{minor}, supported versions are 3.0-3.2")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid EVTX chunk header magic, expected `ElfChnk0`, found `{magic:02x?}`")]
    InvalidEvtxChunkMagic { magic: [u8; 8] },

    #[error("Invalid EVTX record header magic, expected `2a2a0000`, found `{magic:02x?}`")]
    InvalidEvtxRecordHeaderMagic { magic: [u8; 4] },

    #[error("Reached EOF while reading the chunk at offset {offset}")]
    IncompleteChunk { offset: u64 },
}
