//! Growable append-only storage for decoded event data

/// Capacity of a freshly created buffer.
pub const INITIAL_CAPACITY: usize = 0x100;

/// Append-only array with power-of-two growth and front truncation.
///
/// Storage is an owned boxed slice; `size` is the logical length. When an
/// append would exceed the capacity, the storage is replaced by a new one of
/// the smallest power of two that fits, and the valid prefix is copied over.
/// Slices handed out by [`ExtendableBuffer::data`] borrow the buffer, so they
/// cannot outlive a reallocating [`ExtendableBuffer::add`].
#[derive(Clone, Debug)]
pub struct ExtendableBuffer<T> {
    data: Box<[T]>,
    size: usize,
}

impl<T: Copy + Default> ExtendableBuffer<T> {
    pub fn new() -> Self {
        ExtendableBuffer {
            data: vec![T::default(); INITIAL_CAPACITY].into_boxed_slice(),
            size: 0,
        }
    }

    /// Append `values`, growing the storage if needed.
    pub fn add(&mut self, values: &[T]) {
        let new_size = self.size + values.len();
        if new_size > self.data.len() {
            self.reallocate(new_size);
        }
        self.data[self.size..new_size].copy_from_slice(values);
        self.size = new_size;
    }

    fn reallocate(&mut self, new_size: usize) {
        let capacity = new_size.next_power_of_two();
        let mut data = vec![T::default(); capacity].into_boxed_slice();
        data[..self.size].copy_from_slice(&self.data[..self.size]);
        self.data = data;
    }

    /// Discard the first `n` elements, moving the remainder to the front.
    pub fn remove(&mut self, n: usize) {
        let n = n.min(self.size);
        self.data.copy_within(n..self.size, 0);
        self.size -= n;
    }
}

impl<T> ExtendableBuffer<T> {
    /// Valid elements, `[0, len)`
    pub fn data(&self) -> &[T] {
        &self.data[..self.size]
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl<T: Copy + Default> Default for ExtendableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
