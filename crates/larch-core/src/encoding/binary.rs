use crate::error::EncodingError;

/// Append a big-endian `u64` to `buf`.
pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append a big-endian `u32` length followed by the bytes themselves.
pub fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Forward-only reader over a record body.
///
/// Every accessor bounds-checks and reports `EncodingError::Truncated`
/// instead of panicking on short input.
pub struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EncodingError> {
        let available = self.data.len() - self.offset;
        if n > available {
            return Err(EncodingError::Truncated {
                offset: self.offset,
                needed: n,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn u64(&mut self) -> Result<u64, EncodingError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn u32(&mut self) -> Result<u32, EncodingError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    /// Read a `u32`-length-prefixed byte string.
    pub fn bytes(&mut self) -> Result<&'a [u8], EncodingError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}
