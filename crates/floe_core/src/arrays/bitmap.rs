use std::fmt;

use floe_error::{DbError, Result};

/// An LSB ordered bitmap, used for array validity.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    len: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new_with_val(val: bool, len: usize) -> Self {
        let fill = if val { u8::MAX } else { 0 };
        Bitmap {
            len,
            data: vec![fill; len.div_ceil(8)],
        }
    }

    pub fn new_with_all_true(len: usize) -> Self {
        Self::new_with_val(true, len)
    }

    pub fn new_with_all_false(len: usize) -> Self {
        Self::new_with_val(false, len)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Bitmap {
            len: 0,
            data: Vec::with_capacity(cap.div_ceil(8)),
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_trues(&self) -> usize {
        self.iter().filter(|b| *b).count()
    }

    pub fn count_falses(&self) -> usize {
        self.len - self.count_trues()
    }

    pub fn is_all_true(&self) -> bool {
        self.count_trues() == self.len
    }

    pub fn push(&mut self, val: bool) {
        if self.len == self.data.len() * 8 {
            self.data.push(0);
        }
        let idx = self.len;
        self.len += 1;
        self.set_unchecked(idx, val);
    }

    /// Get the value at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn value(&self, idx: usize) -> bool {
        let byte = self.data[idx >> 3];
        (byte >> (idx & 7)) & 1 != 0
    }

    /// Set a bit at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn set_unchecked(&mut self, idx: usize, val: bool) {
        let byte = idx / 8;
        let bit = idx & 7;
        if val {
            self.data[byte] |= 1 << bit;
        } else {
            self.data[byte] &= !(1 << bit);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.value(idx))
    }

    /// Copy out a range of this bitmap.
    pub fn slice(&self, offset: usize, len: usize) -> Bitmap {
        (offset..offset + len).map(|idx| self.value(idx)).collect()
    }

    pub fn extend_from(&mut self, other: &Bitmap) {
        for v in other.iter() {
            self.push(v);
        }
    }

    /// Bit AND this bitmap with some other bitmap.
    pub fn bit_and_mut(&mut self, other: &Bitmap) -> Result<()> {
        if self.len != other.len {
            return Err(DbError::shape("Bitmap lengths do not match (and)")
                .with_field("left", self.len)
                .with_field("right", other.len));
        }
        for (byte, other) in self.data.iter_mut().zip(other.data.iter()) {
            *byte &= *other;
        }
        Ok(())
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut bitmap = Bitmap::with_capacity(lower);
        for v in iter {
            bitmap.push(v);
        }
        bitmap
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_count() {
        let bm: Bitmap = [true, false, true, true, false, false, true, true, true]
            .into_iter()
            .collect();
        assert_eq!(9, bm.len());
        assert_eq!(6, bm.count_trues());
        assert!(bm.value(8));
        assert!(!bm.value(1));
    }

    #[test]
    fn slice_crosses_byte_boundary() {
        let bm: Bitmap = (0..20).map(|i| i % 3 == 0).collect();
        let sliced = bm.slice(7, 5);
        assert_eq!(
            vec![false, false, true, false, false],
            sliced.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn and_mismatched_lengths() {
        let mut a = Bitmap::new_with_all_true(4);
        let b = Bitmap::new_with_all_true(5);
        assert!(a.bit_and_mut(&b).is_err());
    }
}
