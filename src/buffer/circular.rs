//! Power-of-two ring buffer used as the outbound write queue.

const INITIAL_CAPACITY: usize = 8;

/// FIFO queue over a circular array whose size is always a power of two.
///
/// Head and tail indices are wrapped with `capacity - 1`. An append that
/// makes the tail catch up with the head doubles the storage before anything
/// can be overwritten. Removing from either end clears the vacated slot so
/// the element is dropped right away.
///
/// # Example
/// ```
/// use sockloop::CircularBuffer;
///
/// let mut queue = CircularBuffer::new();
/// for value in 0..20 {
///     queue.push_back(value);
/// }
///
/// assert_eq!(queue.len(), 20);
/// assert_eq!(queue.pop_front(), Some(0));
/// assert_eq!(queue.pop_back(), Some(19));
/// ```
#[derive(Debug)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
}

impl<T> Default for CircularBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CircularBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: empty_slots(INITIAL_CAPACITY),
            head: 0,
            tail: 0,
        }
    }

    /// Size of the circular array, always a power of two.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) & self.mask()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Appends at the tail.
    pub fn push_back(&mut self, value: T) {
        self.slots[self.tail] = Some(value);
        self.tail = (self.tail + 1) & self.mask();

        if self.head == self.tail {
            self.double_capacity();
        }
    }

    /// Removes the element at the head.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let value = self.slots[self.head].take();
        self.head = (self.head + 1) & self.mask();

        value
    }

    /// Removes the element at the tail.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        self.tail = self.tail.wrapping_sub(1) & self.mask();

        self.slots[self.tail].take()
    }

    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// The head element, mutated in place by partial writes.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    pub fn back(&self) -> Option<&T> {
        let len = self.len();
        if len == 0 {
            return None;
        }

        self.get(len - 1)
    }

    /// Element at logical position `index` counted from the head.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }

        self.slots[(self.head + index) & self.mask()].as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len() {
            return None;
        }

        let slot = (self.head + index) & self.mask();
        self.slots[slot].as_mut()
    }

    /// Drops every element, keeping the current capacity.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
    }

    /// Iterates from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    // Only called when head == tail right after an append, i.e. when every
    // slot is occupied.
    fn double_capacity(&mut self) {
        let capacity = self.slots.len();
        let mut slots = empty_slots(capacity * 2);

        for (offset, slot) in slots.iter_mut().take(capacity).enumerate() {
            *slot = self.slots[(self.head + offset) & (capacity - 1)].take();
        }

        self.slots = slots;
        self.head = 0;
        self.tail = capacity;
    }
}

fn empty_slots<T>(capacity: usize) -> Vec<Option<T>> {
    (0..capacity).map(|_| None).collect()
}
