use std::sync::Mutex;

use netframe_utils::invariant;

use crate::PoolError;

/// A bounded stack of at most `capacity` reusable records. An op record is
/// either in the pool or in flight, never both: `pop` hands out exclusive
/// ownership, `push` is the only way back in.
pub struct OpPool<T> {
    capacity: usize,
    items: Mutex<Vec<T>>,
}

impl<T> OpPool<T> {
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let items = (0..capacity).map(|_| make()).collect();
        Self { capacity, items: Mutex::new(items) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the top record. Fails with
    /// [`PoolError::Exhausted`] if every record is currently in flight.
    pub fn pop(&self) -> Result<T, PoolError> {
        self.items.lock().unwrap().pop().ok_or(PoolError::Exhausted)
    }

    /// Returns a record to the pool.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        invariant!(items.len() < self.capacity, "op pool returned more records than its capacity");
        items.push(item);
    }
}
