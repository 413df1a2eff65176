/// Fixed-capacity circular slot storage.
///
/// Slots are addressed by their offset from the head, so callers never do
/// their own modulo indexing. `pop_front` clears the head slot and moves the
/// head forward by one.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer needs at least one slot");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    pub fn get(&self, offset: usize) -> Option<&T> {
        if offset >= self.capacity() {
            return None;
        }
        self.slots[self.index(offset)].as_ref()
    }

    pub fn get_mut(&mut self, offset: usize) -> Option<&mut T> {
        if offset >= self.capacity() {
            return None;
        }
        let idx = self.index(offset);
        self.slots[idx].as_mut()
    }

    /// Store `value` at `offset`, returning whatever was there before.
    ///
    /// # Panics
    /// If `offset` is not smaller than the capacity.
    pub fn insert(&mut self, offset: usize, value: T) -> Option<T> {
        assert!(offset < self.capacity(), "offset {offset} outside ring");
        let idx = self.index(offset);
        self.slots[idx].replace(value)
    }

    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Clear the head slot and advance the head.
    pub fn pop_front(&mut self) -> Option<T> {
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        value
    }

    /// Like [`pop_front`](Self::pop_front), but only if the head slot is occupied.
    pub fn take_front(&mut self) -> Option<T> {
        let value = self.slots[self.head].take()?;
        self.head = (self.head + 1) % self.slots.len();
        Some(value)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
    }

    /// Occupied slots in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        (0..self.capacity()).filter_map(move |offset| self.get(offset).map(|v| (offset, v)))
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn offsets_follow_the_head() {
        let mut ring = RingBuffer::new(3);
        ring.insert(0, 'a');
        ring.insert(2, 'c');
        assert_eq!(ring.front(), Some(&'a'));
        assert_eq!(ring.pop_front(), Some('a'));
        // old offset 2 is now offset 1
        assert_eq!(ring.get(1), Some(&'c'));
        ring.insert(2, 'd');
        assert_eq!(ring.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec!['c', 'd']);
    }

    #[test]
    fn out_of_range_offsets_read_as_empty() {
        let ring: RingBuffer<u8> = RingBuffer::new(2);
        assert!(ring.get(2).is_none());
    }

    #[test]
    fn take_front_stops_at_a_gap() {
        let mut ring = RingBuffer::new(4);
        ring.insert(0, 1);
        ring.insert(1, 2);
        ring.insert(3, 4);
        let drained: Vec<_> = std::iter::from_fn(|| ring.take_front()).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(ring.get(1), Some(&4));
    }

    #[test]
    fn clear_resets_head() {
        let mut ring = RingBuffer::new(2);
        ring.insert(0, 1);
        ring.pop_front();
        ring.insert(1, 2);
        ring.clear();
        assert_eq!(ring.occupied(), 0);
        ring.insert(0, 7);
        assert_eq!(ring.front(), Some(&7));
    }
}
