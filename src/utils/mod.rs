mod byte_cursor;
mod time;
mod utf16;

pub use byte_cursor::ByteCursor;
pub use time::{filetime_to_unix_secs, timestamp_from_filetime};
pub use utf16::utf16le_to_utf8;
