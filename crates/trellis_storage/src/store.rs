//! Column storage for one trait inside one composition.
//!
//! Each field is its own column; row `i` of every column belongs to the
//! entity in slot `i` of the owning composition.

use trellis_foundation::Value;

/// Struct-of-arrays storage for a trait's fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Store {
    columns: Vec<Vec<Value>>,
    len: usize,
}

impl Store {
    /// Creates a store with `field_count` empty columns.
    #[must_use]
    pub fn new(field_count: usize) -> Self {
        Self::with_capacity(field_count, 0)
    }

    /// Creates a store with room for `capacity` rows per column.
    #[must_use]
    pub fn with_capacity(field_count: usize, capacity: usize) -> Self {
        Self {
            columns: (0..field_count)
                .map(|_| Vec::with_capacity(capacity))
                .collect(),
            len: 0,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of columns.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    /// Smallest per-column capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.columns.iter().map(Vec::capacity).min().unwrap_or(0)
    }

    /// Reserves room for `additional` more rows in every column.
    pub fn reserve(&mut self, additional: usize) {
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Appends a row. Missing trailing values are filled with nil.
    pub fn push(&mut self, row: Vec<Value>) {
        debug_assert!(row.len() <= self.columns.len(), "row wider than store");
        let mut values = row.into_iter();
        for column in &mut self.columns {
            column.push(values.next().unwrap_or_default());
        }
        self.len += 1;
    }

    /// Removes `slot`, moving the last row into its place.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of bounds.
    pub fn swap_remove(&mut self, slot: usize) -> Vec<Value> {
        assert!(slot < self.len, "slot {slot} out of bounds ({})", self.len);
        self.len -= 1;
        self.columns
            .iter_mut()
            .map(|column| column.swap_remove(slot))
            .collect()
    }

    /// Reads one field of one row.
    #[must_use]
    pub fn get(&self, slot: usize, field: usize) -> Option<&Value> {
        self.columns.get(field)?.get(slot)
    }

    /// Mutable access to one field of one row.
    pub fn get_mut(&mut self, slot: usize, field: usize) -> Option<&mut Value> {
        self.columns.get_mut(field)?.get_mut(slot)
    }

    /// Clones a full row.
    #[must_use]
    pub fn row(&self, slot: usize) -> Option<Vec<Value>> {
        (slot < self.len).then(|| self.columns.iter().map(|c| c[slot].clone()).collect())
    }

    /// Overwrites the row at `slot`. Returns false if out of bounds.
    pub fn replace_row(&mut self, slot: usize, row: Vec<Value>) -> bool {
        if slot >= self.len {
            return false;
        }
        let mut values = row.into_iter();
        for column in &mut self.columns {
            column[slot] = values.next().unwrap_or_default();
        }
        true
    }

    /// Borrows a whole column.
    #[must_use]
    pub fn column(&self, field: usize) -> Option<&[Value]> {
        self.columns.get(field).map(Vec::as_slice)
    }

    /// Drops every row, keeping allocations.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.len = 0;
    }
}
