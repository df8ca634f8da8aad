//! Row construction at the encoder boundary.
//!
//! The surrounding query executor computes each field's encoded form and
//! writes it through a [`RowWriter`] into a growable scratch buffer before
//! the row is bound. The writer owns the single forward-moving cursor into
//! the variable region; in-place mutation after `finish` goes through
//! [`BinaryRow::update`].

use super::binary::{pack_descriptor, BinaryRow};
use super::buffer::RowBuffer;
use super::pool::ObjectPool;
use super::{bitset_width, fixed_region_len, FieldType, FieldValue};

/// Builds one row: fixed region first, variable payloads appended
/// contiguously behind it.
pub struct RowWriter {
    buf: RowBuffer,
    num_fields: usize,
    /// Absolute cursor into the buffer; only ever moves forward.
    cursor: usize,
}

impl RowWriter {
    pub fn new(num_fields: usize) -> Self {
        let fixed = fixed_region_len(num_fields);
        Self {
            buf: RowBuffer::zeroed(fixed),
            num_fields,
            cursor: fixed,
        }
    }

    fn check_index(&self, i: usize) {
        assert!(
            i < self.num_fields,
            "field index {} out of bounds for {} fields",
            i,
            self.num_fields
        );
    }

    fn slot_offset(&self, i: usize) -> usize {
        bitset_width(self.num_fields) + i * 8
    }

    pub fn write_null(&mut self, i: usize) {
        self.check_index(i);
        let byte = self.buf.read_bytes(i / 8, 1)[0] | (1 << (i % 8));
        self.buf.write_bytes(i / 8, &[byte]);
        self.buf.write_i64_le(self.slot_offset(i), 0);
    }

    fn write_slot(&mut self, i: usize, value: i64) {
        self.check_index(i);
        let byte = self.buf.read_bytes(i / 8, 1)[0] & !(1 << (i % 8));
        self.buf.write_bytes(i / 8, &[byte]);
        self.buf.write_i64_le(self.slot_offset(i), value);
    }

    pub fn write_bool(&mut self, i: usize, v: bool) {
        self.write_slot(i, v as i64);
    }

    pub fn write_i8(&mut self, i: usize, v: i8) {
        self.write_slot(i, (v as u8) as i64);
    }

    pub fn write_i16(&mut self, i: usize, v: i16) {
        self.write_slot(i, (v as u16) as i64);
    }

    pub fn write_i32(&mut self, i: usize, v: i32) {
        self.write_slot(i, (v as u32) as i64);
    }

    pub fn write_i64(&mut self, i: usize, v: i64) {
        self.write_slot(i, v);
    }

    pub fn write_f32(&mut self, i: usize, v: f32) {
        self.write_slot(i, v.to_bits() as i64);
    }

    pub fn write_f64(&mut self, i: usize, v: f64) {
        self.write_slot(i, v.to_bits() as i64);
    }

    pub fn write_str(&mut self, i: usize, v: &str) {
        self.append_variable(i, v.as_bytes(), true);
    }

    pub fn write_bytes(&mut self, i: usize, v: &[u8]) {
        self.append_variable(i, v, false);
    }

    fn append_variable(&mut self, i: usize, payload: &[u8], is_string: bool) {
        // Offset from the row base. The cursor starts past the fixed region,
        // so the descriptor is nonzero even for an empty payload.
        let offset = self.cursor;
        self.buf.grow(payload.len());
        self.buf.write_bytes(self.cursor, payload);
        self.write_slot(i, pack_descriptor(offset, payload.len(), is_string));
        self.cursor += payload.len();
    }

    /// Write any typed value to field `i`.
    pub fn write_value(&mut self, i: usize, value: &FieldValue) {
        match value {
            FieldValue::Null => self.write_null(i),
            FieldValue::Bool(v) => self.write_bool(i, *v),
            FieldValue::Byte(v) => self.write_i8(i, *v),
            FieldValue::Short(v) => self.write_i16(i, *v),
            FieldValue::Int(v) => self.write_i32(i, *v),
            FieldValue::Long(v) => self.write_i64(i, *v),
            FieldValue::Float(v) => self.write_f32(i, *v),
            FieldValue::Double(v) => self.write_f64(i, *v),
            FieldValue::Str(v) => self.write_str(i, v),
            FieldValue::Bytes(v) => self.write_bytes(i, v),
        }
    }

    /// Finish the construction pass, binding a row to the exact-size buffer.
    pub fn finish(self) -> BinaryRow {
        let mut row = BinaryRow::new();
        row.point_to(self.buf.into_vec(), 0, self.num_fields, ObjectPool::new());
        row
    }

    /// Encode a full row from a value slice, one value per field.
    pub fn from_values(values: &[FieldValue]) -> BinaryRow {
        let mut writer = RowWriter::new(values.len());
        for (i, value) in values.iter().enumerate() {
            writer.write_value(i, value);
        }
        writer.finish()
    }
}

/// Schema-aware decode of field `i`, the collaborator side of the layout
/// contract: the row itself only knows slots, the caller knows types.
pub fn read_value(row: &BinaryRow, i: usize, field_type: FieldType) -> FieldValue {
    if row.is_null_at(i) {
        return FieldValue::Null;
    }
    match field_type {
        FieldType::Bool => FieldValue::Bool(row.get_bool(i)),
        FieldType::Byte => FieldValue::Byte(row.get_i8(i)),
        FieldType::Short => FieldValue::Short(row.get_i16(i)),
        FieldType::Int => FieldValue::Int(row.get_i32(i)),
        FieldType::Long => FieldValue::Long(row.get_i64(i)),
        FieldType::Float => FieldValue::Float(row.get_f32(i)),
        FieldType::Double => FieldValue::Double(row.get_f64(i)),
        FieldType::Str | FieldType::Binary => row.get(i).unwrap_or(FieldValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_roundtrip() {
        let values = vec![
            FieldValue::Long(7),
            FieldValue::Str("abc".into()),
            FieldValue::Null,
            FieldValue::Bytes(vec![9, 8, 7]),
            FieldValue::Double(0.5),
        ];
        let schema = [
            FieldType::Long,
            FieldType::Str,
            FieldType::Int,
            FieldType::Binary,
            FieldType::Double,
        ];
        let row = RowWriter::from_values(&values);

        for (i, (value, field_type)) in values.iter().zip(schema.iter()).enumerate() {
            assert_eq!(&read_value(&row, i, *field_type), value);
        }
    }

    #[test]
    fn test_variable_payloads_are_contiguous() {
        let mut w = RowWriter::new(3);
        w.write_str(0, "aa");
        w.write_str(1, "bbb");
        w.write_i64(2, 1);
        let row = w.finish();

        let fixed = super::super::fixed_region_len(3);
        assert_eq!(row.size_in_bytes(), fixed + 5);
        assert_eq!(&row.as_bytes()[fixed..fixed + 2], b"aa");
        assert_eq!(&row.as_bytes()[fixed + 2..], b"bbb");
    }

    #[test]
    fn test_identical_values_identical_bytes() {
        let values = vec![FieldValue::Str("k".into()), FieldValue::Int(3)];
        let a = RowWriter::from_values(&values);
        let b = RowWriter::from_values(&values);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_row() {
        let row = RowWriter::from_values(&[]);
        assert_eq!(row.num_fields(), 0);
        assert_eq!(row.size_in_bytes(), 0);
    }
}
