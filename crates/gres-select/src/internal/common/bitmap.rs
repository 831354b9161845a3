use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-size bitmap over device units or cores.
///
/// The size is set at construction and never changes; all indices passed to
/// the accessors must be smaller than [`Bitmap::len`].
#[derive(Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "BitmapRepr", try_from = "BitmapRepr")]
pub struct Bitmap {
    bits: BitVec<u64, Lsb0>,
}

/// Serialized form: size and indices of the set bits.
#[derive(Serialize, Deserialize)]
struct BitmapRepr {
    len: usize,
    #[serde(default)]
    set: Vec<usize>,
}

impl From<Bitmap> for BitmapRepr {
    fn from(bitmap: Bitmap) -> Self {
        BitmapRepr {
            len: bitmap.len(),
            set: bitmap.iter_ones().collect(),
        }
    }
}

impl TryFrom<BitmapRepr> for Bitmap {
    type Error = String;

    fn try_from(repr: BitmapRepr) -> Result<Self, Self::Error> {
        if let Some(idx) = repr.set.iter().find(|idx| **idx >= repr.len) {
            return Err(format!("bit {idx} out of bitmap size {}", repr.len));
        }
        Ok(Bitmap::from_indices(repr.len, &repr.set))
    }
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Bitmap {
            bits: bitvec![u64, Lsb0; 0; len],
        }
    }

    pub fn full(len: usize) -> Self {
        Bitmap {
            bits: bitvec![u64, Lsb0; 1; len],
        }
    }

    pub fn from_indices(len: usize, indices: &[usize]) -> Self {
        let mut bitmap = Self::new(len);
        for &idx in indices {
            bitmap.set(idx);
        }
        bitmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Out of range indices read as unset.
    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        self.bits.get(idx).is_some_and(|b| *b)
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        self.bits.set(idx, true);
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        self.bits.set(idx, false);
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Number of set bits in `[begin, end)`; the range is clipped to the bitmap size.
    pub fn count_range(&self, begin: usize, end: usize) -> usize {
        let end = end.min(self.len());
        if begin >= end {
            return 0;
        }
        self.bits[begin..end].count_ones()
    }

    /// Number of bits set in both bitmaps.
    pub fn overlap(&self, other: &Bitmap) -> usize {
        self.bits
            .iter_ones()
            .filter(|idx| other.test(*idx))
            .count()
    }

    pub fn intersects(&self, other: &Bitmap) -> bool {
        self.bits.iter_ones().any(|idx| other.test(idx))
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for idx in self.iter_ones() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{idx}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:<{}>", self.len(), self)
    }
}
