//! Compact binary row encoding.
//!
//! A row is laid out as `[null bitset][fixed slots][variable region]`:
//! one bit per field (rounded up to 8-byte words), one 8-byte slot per
//! field, then raw payloads for variable-length values. Values that no
//! longer fit their original span spill into an [`ObjectPool`].

pub mod binary;
pub mod buffer;
pub mod pool;
pub mod writer;

pub use binary::BinaryRow;
pub use buffer::RowBuffer;
pub use pool::ObjectPool;
pub use writer::{read_value, RowWriter};

/// Field types supported by the row encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
    Binary,
}

impl FieldType {
    /// Whether values of this type live in the variable region.
    pub const fn is_variable(self) -> bool {
        matches!(self, FieldType::Str | FieldType::Binary)
    }
}

/// A typed field value, used at the encoder boundary and for pool storage.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// The payload bytes for variable-length values, `None` for the rest.
    pub fn variable_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Str(s) => Some(s.as_bytes()),
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// Width in bytes of the null bitset for `num_fields` fields.
///
/// One bit per field, rounded up to a multiple of 8 bytes.
pub(crate) const fn bitset_width(num_fields: usize) -> usize {
    ((num_fields + 63) / 64) * 8
}

/// Byte length of the fixed-size region (bitset plus slots).
pub(crate) const fn fixed_region_len(num_fields: usize) -> usize {
    bitset_width(num_fields) + num_fields * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_width() {
        assert_eq!(bitset_width(0), 0);
        assert_eq!(bitset_width(1), 8);
        assert_eq!(bitset_width(64), 8);
        assert_eq!(bitset_width(65), 16);
        assert_eq!(bitset_width(128), 16);
        assert_eq!(bitset_width(129), 24);
    }

    #[test]
    fn test_fixed_region_len() {
        assert_eq!(fixed_region_len(2), 8 + 16);
        assert_eq!(fixed_region_len(64), 8 + 512);
    }

    #[test]
    fn test_variable_bytes() {
        assert_eq!(
            FieldValue::Str("ab".into()).variable_bytes(),
            Some(b"ab".as_slice())
        );
        assert_eq!(
            FieldValue::Bytes(vec![1, 2, 3]).variable_bytes(),
            Some([1u8, 2, 3].as_slice())
        );
        assert_eq!(FieldValue::Long(7).variable_bytes(), None);
    }
}
