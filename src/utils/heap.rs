//! Binary min-heap backed by a contiguous vector.
//!
//! The heap orders elements purely through their [`Ord`] implementation.
//! Elements that compare equal come out in no particular order: the heap is
//! not stable, and callers that need FIFO behaviour among equal keys must
//! fold a sequence number into the key themselves.

use std::slice;

/// A binary min-heap: [`Heap::pop`] always yields the smallest element.
///
/// Besides the usual push/pop, the heap exposes [`Heap::peek_mut`] together
/// with [`Heap::heapify_root`] so that the root can be updated in place
/// (for example a repeating timer whose deadline moved forward) without a
/// pop/push round trip.
///
/// # Example
/// ```
/// use sockloop::utils::heap::Heap;
///
/// let mut heap = Heap::new();
/// heap.push(5);
/// heap.push(1);
/// heap.push(3);
///
/// assert_eq!(heap.pop(), Some(1));
/// assert_eq!(heap.peek(), Some(&3));
/// ```
#[derive(Debug, Clone)]
pub struct Heap<T> {
    storage: Vec<T>,
}

impl<T> Default for Heap<T> {
    fn default() -> Self {
        Self {
            storage: Vec::new(),
        }
    }
}

impl<T: Ord> Heap<T> {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Inserts `value`, sifting it up to its place. O(log n).
    pub fn push(&mut self, value: T) {
        self.storage.push(value);

        let mut index = self.storage.len() - 1;
        while index > 0 {
            let parent = parent(index);
            if self.storage[index] >= self.storage[parent] {
                break;
            }

            self.storage.swap(index, parent);
            index = parent;
        }
    }

    /// Returns the smallest element without removing it. O(1).
    pub fn peek(&self) -> Option<&T> {
        self.storage.first()
    }

    /// Mutable access to the root.
    ///
    /// After changing the root's ordering key, call [`Heap::heapify_root`]
    /// to restore the heap property.
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.storage.first_mut()
    }

    /// Removes and returns the smallest element. O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.storage.is_empty() {
            return None;
        }

        let root = self.storage.swap_remove(0);
        self.sift_down(0);

        Some(root)
    }

    /// Restores the heap property after the root changed in place. O(log n).
    pub fn heapify_root(&mut self) {
        self.sift_down(0);
    }

    /// Drops every element.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Iterates over the elements in storage (not sorted) order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.storage.iter()
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.storage.len();

        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.storage[left] < self.storage[smallest] {
                smallest = left;
            }

            if right < len && self.storage[right] < self.storage[smallest] {
                smallest = right;
            }

            if smallest == index {
                return;
            }

            self.storage.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T> IntoIterator for Heap<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.storage.into_iter()
    }
}

fn parent(index: usize) -> usize {
    (index - 1) / 2
}
