use std::fmt;
use std::sync::Arc;

/// Reference counted, immutable-by-default storage for array values.
///
/// Slicing produces a new view over the same allocation. Mutation goes
/// through [`SharedBuffer::make_mut`] which copies the visible range if the
/// allocation is shared or only partially visible.
#[derive(Clone)]
pub struct SharedBuffer<T> {
    data: Arc<Vec<T>>,
    offset: usize,
    len: usize,
}

impl<T> SharedBuffer<T> {
    pub fn from_vec(values: Vec<T>) -> Self {
        let len = values.len();
        SharedBuffer {
            data: Arc::new(values),
            offset: 0,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Zero-copy view of a range of this buffer.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len, "slice out of bounds");
        SharedBuffer {
            data: self.data.clone(),
            offset: self.offset + offset,
            len,
        }
    }

    /// Whether some other buffer references the same allocation.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Check if both buffers point to the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T: Clone> SharedBuffer<T> {
    fn make_vec_mut(&mut self) -> &mut Vec<T> {
        if self.offset != 0 || self.len != self.data.len() {
            self.data = Arc::new(self.as_slice().to_vec());
            self.offset = 0;
        }
        Arc::make_mut(&mut self.data)
    }

    /// Get a mutable reference to the values, copying first if needed.
    pub fn make_mut(&mut self) -> &mut [T] {
        self.make_vec_mut().as_mut_slice()
    }

    /// Append values, copying first if needed.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.make_vec_mut().extend_from_slice(values);
        self.len += values.len();
    }

    /// Drop any excess capacity, unsharing the buffer.
    pub fn shrink_to_fit(&mut self) {
        self.make_vec_mut().shrink_to_fit();
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }
}

impl<T> From<Vec<T>> for SharedBuffer<T> {
    fn from(value: Vec<T>) -> Self {
        Self::from_vec(value)
    }
}

impl<T> FromIterator<T> for SharedBuffer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_shares_allocation() {
        let buf = SharedBuffer::from_vec(vec![1, 2, 3, 4, 5]);
        let sliced = buf.slice(1, 3);
        assert_eq!(&[2, 3, 4], sliced.as_slice());
        assert!(sliced.ptr_eq(&buf));
    }

    #[test]
    fn make_mut_copies_shared() {
        let buf = SharedBuffer::from_vec(vec![1, 2, 3]);
        let mut other = buf.clone();
        other.make_mut()[0] = 10;

        assert_eq!(&[1, 2, 3], buf.as_slice());
        assert_eq!(&[10, 2, 3], other.as_slice());
        assert!(!other.ptr_eq(&buf));
    }

    #[test]
    fn make_mut_on_slice_only_keeps_view() {
        let buf = SharedBuffer::from_vec(vec![1, 2, 3, 4]);
        let mut sliced = buf.slice(2, 2);
        sliced.extend_from_slice(&[5]);
        assert_eq!(&[3, 4, 5], sliced.as_slice());
    }
}
