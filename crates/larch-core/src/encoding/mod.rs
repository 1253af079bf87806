//! Record payload encoding: kind tags and big-endian field codec.

pub mod binary;

use crate::error::EncodingError;

/// The closed set of referent kinds that can be stored in a record.
///
/// Every record payload starts with the kind's tag byte so that a reference
/// of one kind can never silently decode a record written for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A raw value blob.
    Value = 0x01,
    /// A binary-search-tree node.
    Node = 0x02,
}

impl RecordKind {
    pub fn from_u8(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0x01 => Ok(RecordKind::Value),
            0x02 => Ok(RecordKind::Node),
            other => Err(EncodingError::UnknownKind(other)),
        }
    }
}

/// Split a record payload into its kind and body, checking the kind matches
/// `expected`.
pub fn split_kind(payload: &[u8], expected: RecordKind) -> Result<&[u8], EncodingError> {
    let (&tag, body) = payload.split_first().ok_or(EncodingError::Empty)?;
    let actual = RecordKind::from_u8(tag)?;
    if actual != expected {
        return Err(EncodingError::KindMismatch { expected, actual });
    }
    Ok(body)
}
