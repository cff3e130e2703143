use crate::utils::ByteCursor;
use std::fmt;
use std::fmt::{Debug, Display};

/// A Windows security identifier (NT SID).
///
/// The on-disk sub-authority count byte is not trusted; the number of
/// sub-authorities comes from the length of the value, `(len - 8) / 4`.
#[derive(PartialOrd, PartialEq, Clone)]
pub struct Sid {
    revision: u8,
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    pub fn from_bytes(data: &[u8]) -> Sid {
        let mut cursor = ByteCursor::new(data);
        let revision = cursor.u8();
        let _sub_authority_count = cursor.u8();

        // The identifier authority is kept in big-endian order.
        let mut authority = 0_u64;
        for byte in cursor.take_bytes(6).iter() {
            authority = (authority << 8) | u64::from(*byte);
        }

        let count = data.len().saturating_sub(8) / 4;
        let sub_authorities = (0..count).map(|_| cursor.u32()).collect();

        Sid {
            revision,
            authority,
            sub_authorities,
        }
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub_authority in &self.sub_authorities {
            write!(f, "-{sub_authority}")?;
        }
        Ok(())
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}
