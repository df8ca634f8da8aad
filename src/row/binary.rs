//! The binary row view: fixed slots, null bitset, variable region.

use super::pool::ObjectPool;
use super::{bitset_width, fixed_region_len, FieldValue};
use std::hash::{Hash, Hasher};

/// Bit 62 of a fixed slot marks an inline variable-length value as a string.
const STRING_FLAG: i64 = 1 << 62;

/// Bits 31..=61 of a fixed slot: payload byte offset from the row base.
/// Offsets start past the fixed region, so a real descriptor is never zero
/// even for an empty payload.
const OFFSET_SHIFT: u32 = 31;

/// Bits 0..=30 of a fixed slot: payload byte length.
const LENGTH_MASK: i64 = 0x7FFF_FFFF;

pub(crate) fn pack_descriptor(offset: usize, len: usize, is_string: bool) -> i64 {
    debug_assert!(offset as i64 <= LENGTH_MASK && len as i64 <= LENGTH_MASK);
    let mut slot = ((offset as i64) << OFFSET_SHIFT) | (len as i64);
    if is_string {
        slot |= STRING_FLAG;
    }
    slot
}

fn unpack_descriptor(slot: i64) -> (usize, usize, bool) {
    let offset = ((slot >> OFFSET_SHIFT) & LENGTH_MASK) as usize;
    let len = (slot & LENGTH_MASK) as usize;
    (offset, len, slot & STRING_FLAG != 0)
}

/// A mutable view over a row encoded as
/// `[null bitset][fixed slots][variable region]`.
///
/// Exactly one of {null bit set, inline descriptor, pool index} describes a
/// field at any time. Primitive writes never grow the buffer; variable-length
/// updates reuse the field's existing span when the new payload fits, and
/// spill to the [`ObjectPool`] otherwise (encoded as a negated pool index in
/// the slot).
///
/// A freshly constructed row is unbound and unusable until [`point_to`]
/// binds it to a buffer. Field-index bounds violations are programming
/// errors and panic; they are never surfaced as typed errors.
///
/// Equality and hashing are defined purely over the field count and the
/// committed byte span. Pool-resident values live outside the span and do
/// not participate, matching the wire representation: the span bytes are
/// exactly what is persisted, and loading is a byte copy plus a rebind.
///
/// [`point_to`]: BinaryRow::point_to
#[derive(Clone, Debug)]
pub struct BinaryRow {
    data: Vec<u8>,
    base: usize,
    num_fields: usize,
    pool: ObjectPool,
    bound: bool,
}

impl Default for BinaryRow {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryRow {
    /// An unbound row. Using it before `point_to` is a caller bug.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            base: 0,
            num_fields: 0,
            pool: ObjectPool::new(),
            bound: false,
        }
    }

    /// Rebind the view to a buffer.
    ///
    /// The buffer must hold at least the fixed region for `num_fields`
    /// fields past `base_offset`. `num_fields` may change across rebinds;
    /// it is fixed for the lifetime of one binding.
    pub fn point_to(
        &mut self,
        data: Vec<u8>,
        base_offset: usize,
        num_fields: usize,
        pool: ObjectPool,
    ) {
        assert!(
            data.len() >= base_offset + fixed_region_len(num_fields),
            "buffer of {} bytes too small for {} fields at offset {}",
            data.len(),
            num_fields,
            base_offset
        );
        self.data = data;
        self.base = base_offset;
        self.num_fields = num_fields;
        self.pool = pool;
        self.bound = true;
    }

    /// Bind a fresh row to a copied byte span, the load path for persisted
    /// rows: no transcoding, the on-disk bytes are the in-memory layout.
    pub fn from_bytes(bytes: Vec<u8>, num_fields: usize) -> Self {
        let mut row = Self::new();
        row.point_to(bytes, 0, num_fields, ObjectPool::new());
        row
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// The committed byte span this row occupies.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.base..]
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len() - self.base
    }

    pub(crate) fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    fn check_index(&self, i: usize) {
        assert!(self.bound, "row is not bound to a buffer");
        assert!(
            i < self.num_fields,
            "field index {} out of bounds for {} fields",
            i,
            self.num_fields
        );
    }

    fn slot_offset(&self, i: usize) -> usize {
        self.base + bitset_width(self.num_fields) + i * 8
    }

    fn read_slot(&self, i: usize) -> i64 {
        let offset = self.slot_offset(i);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[offset..offset + 8]);
        i64::from_le_bytes(bytes)
    }

    fn write_slot(&mut self, i: usize, value: i64) {
        let offset = self.slot_offset(i);
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    // --- Null bitset ---

    pub fn is_null_at(&self, i: usize) -> bool {
        self.check_index(i);
        let byte = self.data[self.base + i / 8];
        byte & (1 << (i % 8)) != 0
    }

    /// Mark the field null, releasing any pool slot it held and zeroing
    /// the fixed slot so byte-identical logical content stays byte-identical.
    pub fn set_null(&mut self, i: usize) {
        self.check_index(i);
        self.release_pool_ref(i);
        self.data[self.base + i / 8] |= 1 << (i % 8);
        self.write_slot(i, 0);
    }

    pub fn set_not_null(&mut self, i: usize) {
        self.check_index(i);
        self.data[self.base + i / 8] &= !(1 << (i % 8));
    }

    /// Free the pool entry a field references, if any. Overwriting a slot
    /// must never orphan a pool value.
    fn release_pool_ref(&mut self, i: usize) {
        if self.is_null_at(i) {
            return;
        }
        let slot = self.read_slot(i);
        if slot < 0 {
            self.pool.remove((-slot) as usize);
        }
    }

    // --- Primitive setters: direct slot writes, zero-extended, no growth ---

    pub fn set_bool(&mut self, i: usize, v: bool) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, v as i64);
    }

    pub fn set_i8(&mut self, i: usize, v: i8) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, (v as u8) as i64);
    }

    pub fn set_i16(&mut self, i: usize, v: i16) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, (v as u16) as i64);
    }

    pub fn set_i32(&mut self, i: usize, v: i32) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, (v as u32) as i64);
    }

    pub fn set_i64(&mut self, i: usize, v: i64) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, v);
    }

    pub fn set_f32(&mut self, i: usize, v: f32) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, v.to_bits() as i64);
    }

    pub fn set_f64(&mut self, i: usize, v: f64) {
        self.release_pool_ref(i);
        self.set_not_null(i);
        self.write_slot(i, v.to_bits() as i64);
    }

    // --- Primitive getters ---

    pub fn get_bool(&self, i: usize) -> bool {
        self.check_index(i);
        self.read_slot(i) as u8 != 0
    }

    pub fn get_i8(&self, i: usize) -> i8 {
        self.check_index(i);
        self.read_slot(i) as u8 as i8
    }

    pub fn get_i16(&self, i: usize) -> i16 {
        self.check_index(i);
        self.read_slot(i) as u16 as i16
    }

    pub fn get_i32(&self, i: usize) -> i32 {
        self.check_index(i);
        self.read_slot(i) as u32 as i32
    }

    pub fn get_i64(&self, i: usize) -> i64 {
        self.check_index(i);
        self.read_slot(i)
    }

    pub fn get_f32(&self, i: usize) -> f32 {
        self.check_index(i);
        f32::from_bits(self.read_slot(i) as u32)
    }

    pub fn get_f64(&self, i: usize) -> f64 {
        self.check_index(i);
        f64::from_bits(self.read_slot(i) as u64)
    }

    // --- Generic variable-length / object path ---

    /// Update a variable-length or object field in place.
    ///
    /// Reuses the existing inline span when the new payload is no larger,
    /// replaces a pool entry in place, and otherwise allocates a pool slot.
    /// Primitive values delegate to the typed setters.
    pub fn update(&mut self, i: usize, value: FieldValue) {
        self.check_index(i);
        match value {
            FieldValue::Null => self.set_null(i),
            FieldValue::Bool(v) => self.set_bool(i, v),
            FieldValue::Byte(v) => self.set_i8(i, v),
            FieldValue::Short(v) => self.set_i16(i, v),
            FieldValue::Int(v) => self.set_i32(i, v),
            FieldValue::Long(v) => self.set_i64(i, v),
            FieldValue::Float(v) => self.set_f32(i, v),
            FieldValue::Double(v) => self.set_f64(i, v),
            value => self.update_variable(i, value),
        }
    }

    fn update_variable(&mut self, i: usize, value: FieldValue) {
        if self.is_null_at(i) {
            // The construction pass is over; a previously-null field has no
            // span to reuse, so the value goes to the pool.
            self.set_not_null(i);
            let index = self.pool.put(value);
            self.write_slot(i, -(index as i64));
            return;
        }

        let slot = self.read_slot(i);
        if slot < 0 {
            self.pool.replace((-slot) as usize, value);
            return;
        }
        if slot == 0 {
            // A zeroed slot never encodes an inline span (descriptor offsets
            // start past the fixed region), so the value gets a pool slot.
            let index = self.pool.put(value);
            self.write_slot(i, -(index as i64));
            return;
        }

        let (offset, old_len, _) = unpack_descriptor(slot);
        let is_string = matches!(value, FieldValue::Str(_));
        let payload = value
            .variable_bytes()
            .expect("update_variable on non-variable value");
        if payload.len() <= old_len {
            let abs = self.base + offset;
            self.data[abs..abs + payload.len()].copy_from_slice(payload);
            self.write_slot(i, pack_descriptor(offset, payload.len(), is_string));
        } else {
            let index = self.pool.put(value);
            self.write_slot(i, -(index as i64));
        }
    }

    /// Read a variable-length or object field.
    ///
    /// Returns `None` when the null bit is set (or the slot carries no
    /// payload). Primitive fields are read through the typed getters; this
    /// path decodes pool references and inline descriptors only.
    pub fn get(&self, i: usize) -> Option<FieldValue> {
        self.check_index(i);
        if self.is_null_at(i) {
            return None;
        }
        let slot = self.read_slot(i);
        if slot < 0 {
            return self.pool.get((-slot) as usize).cloned();
        }
        if slot == 0 {
            return None;
        }
        let (offset, len, is_string) = unpack_descriptor(slot);
        let abs = self.base + offset;
        let bytes = &self.data[abs..abs + len];
        if is_string {
            Some(FieldValue::Str(
                String::from_utf8_lossy(bytes).into_owned(),
            ))
        } else {
            Some(FieldValue::Bytes(bytes.to_vec()))
        }
    }
}

impl PartialEq for BinaryRow {
    fn eq(&self, other: &Self) -> bool {
        self.num_fields == other.num_fields && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for BinaryRow {}

impl Hash for BinaryRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.num_fields.hash(state);
        self.as_bytes().hash(state);
    }
}
