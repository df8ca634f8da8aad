//! Object pool for spill-over row values.

use super::FieldValue;

/// An indexed arena for values that cannot be encoded inline in a row's
/// fixed 8-byte slot: either the payload outgrew its original span, or the
/// field was written after the construction pass ended.
///
/// Index 0 is reserved as the "no pool use" sentinel; rows encode a pool
/// reference as the negated index in their fixed slot, so only positive
/// indices are ever handed out. Freed indices are recycled.
#[derive(Clone, Debug)]
pub struct ObjectPool {
    slots: Vec<Option<FieldValue>>,
    free: Vec<usize>,
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectPool {
    pub fn new() -> Self {
        Self {
            // Slot 0 is the reserved sentinel and never occupied.
            slots: vec![None],
            free: Vec::new(),
        }
    }

    /// Store a value, returning its index (always >= 1).
    pub fn put(&mut self, value: FieldValue) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    /// Replace the value at `index` in place. The index must be occupied.
    pub fn replace(&mut self, index: usize, value: FieldValue) {
        assert!(
            index != 0 && index < self.slots.len() && self.slots[index].is_some(),
            "replace of unoccupied pool index {}",
            index
        );
        self.slots[index] = Some(value);
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        if index == 0 {
            return None;
        }
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Remove and return the value at `index`, recycling the slot.
    pub fn remove(&mut self, index: usize) -> Option<FieldValue> {
        if index == 0 || index >= self.slots.len() {
            return None;
        }
        let value = self.slots[index].take();
        if value.is_some() {
            self.free.push(index);
        }
        value
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
