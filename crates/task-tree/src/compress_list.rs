//! Index-stable list with deferred compaction.
//!
//! Branches keep their children in a [`DelayedCompressList`] so that the
//! child collection can be mutated while the branch itself is walking it.
//! Every traversal that may observe mutation is bracketed with
//! [`begin_iter`](DelayedCompressList::begin_iter) /
//! [`end_iter`](DelayedCompressList::end_iter). Inside a bracket, removals only
//! clear the slot, so every live index stays valid until the outermost
//! bracket closes and the list compacts itself once.

use std::fmt;

const NOT_FOUND: usize = usize::MAX;

/// Above this many surviving elements, compaction only filters the removed
/// span instead of the whole list.
const WHOLE_FILTER_LIMIT: usize = 8;

/// Ordered sequence supporting soft removal during reentrant iteration.
pub struct DelayedCompressList<T> {
    items: Vec<Option<T>>,
    recursion_depth: u32,
    first_removed: usize,
    last_removed: usize,
    real_size: usize,
}

impl<T> DelayedCompressList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            recursion_depth: 0,
            first_removed: NOT_FOUND,
            last_removed: NOT_FOUND,
            real_size: 0,
        }
    }

    /// Opens an iteration bracket. Brackets nest.
    pub fn begin_iter(&mut self) {
        self.recursion_depth += 1;
    }

    /// Closes an iteration bracket, compacting the list when the outermost
    /// bracket closes.
    ///
    /// # Panics
    ///
    /// Panics if no bracket is open.
    pub fn end_iter(&mut self) {
        assert!(
            self.recursion_depth > 0,
            "DelayedCompressList::end_iter called without a matching begin_iter"
        );
        self.recursion_depth -= 1;
        if self.recursion_depth == 0 {
            self.compress();
        }
    }

    /// Returns `true` while at least one iteration bracket is open.
    #[inline]
    pub fn is_iterating(&self) -> bool {
        self.recursion_depth > 0
    }

    #[inline]
    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    /// Returns `true` while removed slots are waiting for compaction.
    #[inline]
    pub fn has_pending_removals(&self) -> bool {
        self.first_removed != NOT_FOUND
    }

    /// Number of slots, including slots removed during the current iteration.
    ///
    /// Valid indices are `0..len()`.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Index the slot at `index` will have once pending removals are
    /// compacted.
    pub fn compacted_index(&self, index: usize) -> usize {
        if !self.has_pending_removals() || index <= self.first_removed {
            return index;
        }
        let end = index.min(self.items.len());
        let holes = self.items[self.first_removed..end]
            .iter()
            .filter(|slot| slot.is_none())
            .count();
        index - holes
    }

    /// Number of live elements.
    #[inline]
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    /// Returns `true` if there is no live element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.real_size == 0
    }

    /// Appends an element. Allowed during iteration, since it never moves
    /// existing elements.
    pub fn push(&mut self, item: T) {
        self.items.push(Some(item));
        self.real_size += 1;
    }

    /// Inserts an element, shifting later elements right.
    ///
    /// # Panics
    ///
    /// Panics if called during iteration or if `index > len()`.
    pub fn insert(&mut self, index: usize, item: T) {
        assert!(
            !self.is_iterating(),
            "DelayedCompressList::insert during iteration would shift live indices"
        );
        self.items.insert(index, Some(item));
        self.real_size += 1;
    }

    /// Returns the element at `index`, or `None` if the slot was removed
    /// during the current iteration or is out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index).and_then(Option::as_mut)
    }

    /// Replaces the element at `index`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn set(&mut self, index: usize, item: T) -> Option<T> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .unwrap_or_else(|| panic!("index {index} out of range for list of length {len}"));
        let previous = slot.replace(item);
        if previous.is_none() {
            self.real_size += 1;
        }
        previous
    }

    /// Removes the element at `index`.
    ///
    /// During iteration the slot is only cleared and the pending span widened;
    /// otherwise later elements shift left immediately.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        let len = self.items.len();
        assert!(
            index < len,
            "index {index} out of range for list of length {len}"
        );
        if !self.is_iterating() {
            let removed = self.items.remove(index);
            if removed.is_some() {
                self.real_size -= 1;
            }
            return removed;
        }

        let removed = self.items[index].take();
        if removed.is_some() {
            self.real_size -= 1;
            if self.first_removed == NOT_FOUND {
                self.first_removed = index;
                self.last_removed = index;
            } else {
                self.first_removed = self.first_removed.min(index);
                self.last_removed = self.last_removed.max(index);
            }
        }
        removed
    }

    /// Removes every element, softly during iteration.
    pub fn clear(&mut self) {
        if !self.is_iterating() {
            self.items.clear();
            self.real_size = 0;
            self.first_removed = NOT_FOUND;
            self.last_removed = NOT_FOUND;
            return;
        }
        if self.real_size == 0 {
            return;
        }
        for slot in &mut self.items {
            *slot = None;
        }
        self.real_size = 0;
        self.first_removed = 0;
        self.last_removed = self.items.len() - 1;
    }

    /// Index of the first live element matching `predicate`.
    pub fn position(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut predicate))
    }

    /// Index of the last live element matching `predicate`.
    pub fn rposition(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items
            .iter()
            .rposition(|slot| slot.as_ref().is_some_and(&mut predicate))
    }

    /// Iterates over live elements in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().filter_map(Option::as_ref)
    }

    /// Iterates over live elements together with their current index.
    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|item| (index, item)))
    }

    /// Sorts live elements.
    ///
    /// # Panics
    ///
    /// Panics if called during iteration.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        assert!(
            !self.is_iterating(),
            "DelayedCompressList::sort_by during iteration would move live indices"
        );
        self.items.sort_by(|a, b| match (a, b) {
            (Some(a), Some(b)) => compare(a, b),
            _ => std::cmp::Ordering::Equal,
        });
    }

    fn compress(&mut self) {
        if self.first_removed == NOT_FOUND {
            return;
        }
        // Slots revived by `set` stay inside the span, so the span bounds
        // alone do not locate a hole.
        let removed = self.items.len() - self.real_size;
        if self.real_size == 0 {
            self.items.clear();
        } else if removed == 1 {
            if let Some(hole) =
                (self.first_removed..=self.last_removed).find(|&index| self.items[index].is_none())
            {
                self.items.remove(hole);
            }
        } else if self.real_size <= WHOLE_FILTER_LIMIT {
            self.items.retain(Option::is_some);
        } else {
            let (first, last) = (self.first_removed, self.last_removed);
            let mut write = first;
            for read in first..=last {
                if self.items[read].is_some() {
                    self.items.swap(write, read);
                    write += 1;
                }
            }
            self.items.drain(write..=last);
        }
        self.first_removed = NOT_FOUND;
        self.last_removed = NOT_FOUND;
        debug_assert_eq!(self.items.len(), self.real_size);
    }
}

impl<T: PartialEq> DelayedCompressList<T> {
    /// Index of the first live element equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.position(|candidate| candidate == item)
    }

    /// Index of the last live element equal to `item`.
    pub fn last_index_of(&self, item: &T) -> Option<usize> {
        self.rposition(|candidate| candidate == item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Removes the first live element equal to `item`.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }
}

impl<T> Default for DelayedCompressList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for DelayedCompressList<T> {
    /// Clones the live elements into a compacted list with no open bracket.
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for DelayedCompressList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> From<Vec<T>> for DelayedCompressList<T> {
    fn from(items: Vec<T>) -> Self {
        let real_size = items.len();
        Self {
            items: items.into_iter().map(Some).collect(),
            recursion_depth: 0,
            first_removed: NOT_FOUND,
            last_removed: NOT_FOUND,
            real_size,
        }
    }
}

impl<T> FromIterator<T> for DelayedCompressList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
