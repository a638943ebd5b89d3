use tracing::debug;

use crate::error::TableError;

/// Builder for a fixed-capacity table that must be fully populated.
///
/// `add` appends after the highest assigned slot, `set` overwrites a slot
/// and extends that watermark. `seal` consumes the builder, so a sealed
/// table can no longer change.
#[derive(Debug)]
pub struct TableBuilder<T> {
    slots: Vec<Option<T>>,
    watermark: usize,
}

impl<T> TableBuilder<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            watermark: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// One past the highest assigned slot.
    pub fn len(&self) -> usize {
        self.watermark
    }

    pub fn is_empty(&self) -> bool {
        self.watermark == 0
    }

    /// Append an entry. Returns its index.
    pub fn add(&mut self, item: T) -> Result<usize, TableError> {
        let index = self.watermark;
        if index >= self.slots.len() {
            return Err(TableError::CapacityExceeded {
                capacity: self.slots.len(),
            });
        }
        self.put(index, item);
        Ok(index)
    }

    /// Assign a specific slot. Returns its index.
    pub fn set(&mut self, index: usize, item: T) -> Result<usize, TableError> {
        if index >= self.slots.len() {
            return Err(TableError::IndexOutOfRange {
                index,
                capacity: self.slots.len(),
            });
        }
        self.put(index, item);
        Ok(index)
    }

    fn put(&mut self, index: usize, item: T) {
        self.slots[index] = Some(item);
        self.watermark = self.watermark.max(index + 1);
    }

    /// Assigned entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i, item)))
    }

    /// Require every declared slot to be assigned and return the entries.
    pub fn seal(self) -> Result<Vec<T>, TableError> {
        if self.watermark != self.slots.len() {
            debug!(
                declared = self.slots.len(),
                bound = self.watermark,
                "table sealed before every slot was bound"
            );
            return Err(TableError::SizeMismatch {
                expected: self.slots.len(),
                found: self.watermark,
            });
        }
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    debug!(index, "table sealed with an empty slot");
                    TableError::EmptySlot { index }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_until_full() {
        let mut table = TableBuilder::with_capacity(2);
        assert_eq!(table.add('a').unwrap(), 0);
        assert_eq!(table.add('b').unwrap(), 1);
        assert_eq!(
            table.add('c'),
            Err(TableError::CapacityExceeded { capacity: 2 })
        );
        assert_eq!(table.seal().unwrap(), vec!['a', 'b']);
    }

    #[test]
    fn seal_short_table_fails() {
        let mut table = TableBuilder::with_capacity(3);
        table.add(1).unwrap();
        table.add(2).unwrap();
        assert_eq!(
            table.seal(),
            Err(TableError::SizeMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn set_extends_watermark() {
        let mut table = TableBuilder::with_capacity(3);
        table.set(1, "one").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.add("two").unwrap(), 2);
        // Slot 0 was skipped.
        assert_eq!(table.seal(), Err(TableError::EmptySlot { index: 0 }));
    }

    #[test]
    fn set_overwrites_and_checks_range() {
        let mut table = TableBuilder::with_capacity(1);
        table.add(1).unwrap();
        table.set(0, 5).unwrap();
        assert_eq!(
            table.set(1, 6),
            Err(TableError::IndexOutOfRange {
                index: 1,
                capacity: 1
            })
        );
        assert_eq!(table.seal().unwrap(), vec![5]);
    }

    #[test]
    fn empty_table_seals() {
        let table: TableBuilder<u8> = TableBuilder::with_capacity(0);
        assert!(table.is_empty());
        assert!(table.seal().unwrap().is_empty());
    }
}
