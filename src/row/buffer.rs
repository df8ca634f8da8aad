//! Growable backing buffer for row construction.

/// An owned, growable byte region that rows point into.
///
/// Growth never relocates already-written bytes relative to the buffer
/// base: `grow` only appends zeroed capacity at the end, so offsets handed
/// out before a grow stay valid after it.
#[derive(Clone, Debug, Default)]
pub struct RowBuffer {
    data: Vec<u8>,
}

impl RowBuffer {
    /// A zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extend the buffer by `additional` zeroed bytes.
    pub fn grow(&mut self, additional: usize) {
        self.data.resize(self.data.len() + additional, 0);
    }

    /// Copy `bytes` into the buffer at `offset`. Bounds are a caller bug.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.data.len(),
            "write of {} bytes at offset {} exceeds buffer of {}",
            bytes.len(),
            offset,
            self.data.len()
        );
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(
            offset + len <= self.data.len(),
            "read of {} bytes at offset {} exceeds buffer of {}",
            len,
            offset,
            self.data.len()
        );
        &self.data[offset..offset + len]
    }

    pub fn write_i64_le(&mut self, offset: usize, value: i64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn read_i64_le(&self, offset: usize) -> i64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.read_bytes(offset, 8));
        i64::from_le_bytes(bytes)
    }

    /// Consume the buffer, yielding the exact backing bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_preserves_written_bytes() {
        let mut buf = RowBuffer::zeroed(8);
        buf.write_i64_le(0, 0x0102_0304_0506_0708);

        buf.grow(16);
        assert_eq!(buf.len(), 24);
        assert_eq!(buf.read_i64_le(0), 0x0102_0304_0506_0708);
        assert_eq!(buf.read_bytes(8, 16), &[0u8; 16]);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut buf = RowBuffer::zeroed(16);
        buf.write_bytes(4, b"hello");
        assert_eq!(buf.read_bytes(4, 5), b"hello");

        buf.write_i64_le(8, -42);
        assert_eq!(buf.read_i64_le(8), -42);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_write_panics() {
        let mut buf = RowBuffer::zeroed(4);
        buf.write_bytes(2, b"toolong");
    }
}
