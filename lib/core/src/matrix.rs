use crate::codec;
use crate::{Error, Result};
use bytes::{Buf, BufMut};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bit pattern marking a cell that was never set. It is a NaN, and `set`
/// refuses NaN values, so no real similarity can carry it.
const UNPOPULATED: u64 = 0x7ff8_dead_0000_0001;

/// Symmetric NxN similarity store.
///
/// Only the strict upper triangle is kept: `(i, j)` and `(j, i)` read the
/// same slot and the diagonal is always `1.0`. Cells are atomics, so
/// workers filling disjoint cells can share the matrix through `&self`.
pub struct SimilarityMatrix {
    capacity: usize,
    cells: Vec<AtomicU64>,
}

impl SimilarityMatrix {
    pub fn new(capacity: usize) -> Self {
        let len = pair_count(capacity);
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || AtomicU64::new(UNPOPULATED));
        Self { capacity, cells }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct off-diagonal pairs, `N(N-1)/2`
    #[inline]
    pub fn total_pairs(&self) -> usize {
        self.cells.len()
    }

    /// Offset of the slot backing `(i, j)`, `None` on the diagonal
    #[inline]
    fn slot(&self, i: usize, j: usize) -> Result<Option<usize>> {
        for index in [i, j] {
            if index >= self.capacity {
                return Err(Error::OutOfRange {
                    index,
                    capacity: self.capacity,
                });
            }
        }
        if i == j {
            return Ok(None);
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        Ok(Some(lo * (2 * self.capacity - lo - 1) / 2 + (hi - lo - 1)))
    }

    /// Store the similarity of `(i, j)`; setting the diagonal is a no-op
    pub fn set(&self, i: usize, j: usize, value: f64) -> Result<()> {
        if value.is_nan() {
            return Err(Error::InvalidValue(value));
        }
        if let Some(slot) = self.slot(i, j)? {
            self.cells[slot].store(value.to_bits(), Ordering::Release);
        }
        Ok(())
    }

    /// Read the similarity of `(i, j)`. Fails with [`Error::Unpopulated`]
    /// when the cell was never set.
    pub fn get(&self, i: usize, j: usize) -> Result<f64> {
        match self.slot(i, j)? {
            None => Ok(1.0),
            Some(slot) => {
                let bits = self.cells[slot].load(Ordering::Acquire);
                if bits == UNPOPULATED {
                    Err(Error::Unpopulated(i, j))
                } else {
                    Ok(f64::from_bits(bits))
                }
            }
        }
    }

    /// Like [`SimilarityMatrix::get`] but `None` for unpopulated or out of range cells
    #[inline]
    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        self.get(i, j).ok()
    }

    #[inline]
    pub fn is_populated(&self, i: usize, j: usize) -> bool {
        self.value(i, j).is_some()
    }

    /// Number of populated off-diagonal pairs
    pub fn populated_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.load(Ordering::Acquire) != UNPOPULATED)
            .count()
    }

    /// Populated off-diagonal cells of row `i`
    pub fn row_populated(&self, i: usize) -> usize {
        (0..self.capacity)
            .filter(|&j| j != i && self.is_populated(i, j))
            .count()
    }

    /// Rows whose `N-1` off-diagonal cells are all populated
    pub fn fully_calculated_nodes(&self) -> usize {
        let n = self.capacity;
        let full = n.saturating_sub(1);
        let mut counts = vec![0usize; n];
        for i in 0..n {
            for j in (i + 1)..n {
                if self.is_populated(i, j) {
                    counts[i] += 1;
                    counts[j] += 1;
                }
            }
        }
        counts.iter().filter(|&&c| c == full).count()
    }

    /// Frobenius norm of the difference over cells populated in both matrices
    pub fn frobenius_distance(&self, other: &SimilarityMatrix) -> Result<f64> {
        if self.capacity != other.capacity {
            return Err(Error::CapacityMismatch {
                expected: self.capacity,
                actual: other.capacity,
            });
        }
        let sum: f64 = (0..self.capacity)
            .flat_map(|i| ((i + 1)..self.capacity).map(move |j| (i, j)))
            .filter_map(|(i, j)| match (self.value(i, j), other.value(i, j)) {
                (Some(a), Some(b)) => Some((a - b) * (a - b)),
                _ => None,
            })
            .sum();
        Ok(sum.sqrt())
    }

    /// `u32` capacity followed by every upper-triangle cell as a
    /// big-endian `f64`, row-major. Unpopulated cells keep their sentinel.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 8 * self.cells.len());
        buf.put_u32(self.capacity as u32);
        for cell in &self.cells {
            buf.put_u64(cell.load(Ordering::Acquire));
        }
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let capacity = codec::get_u32(&mut buf, "matrix capacity")? as usize;
        let expected = pair_count(capacity)
            .checked_mul(8)
            .ok_or_else(|| Error::Decode(format!("capacity {} too large", capacity)))?;
        if buf.remaining() != expected {
            return Err(Error::Decode(format!(
                "matrix of capacity {} needs {} value bytes, found {}",
                capacity,
                expected,
                buf.remaining()
            )));
        }
        let matrix = Self::new(capacity);
        for cell in &matrix.cells {
            let bits = buf.get_u64();
            if bits != UNPOPULATED && f64::from_bits(bits).is_nan() {
                return Err(Error::Decode("NaN similarity value".to_string()));
            }
            cell.store(bits, Ordering::Relaxed);
        }
        Ok(matrix)
    }
}

impl Clone for SimilarityMatrix {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            cells: self
                .cells
                .iter()
                .map(|c| AtomicU64::new(c.load(Ordering::Acquire)))
                .collect(),
        }
    }
}

impl Default for SimilarityMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for SimilarityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityMatrix")
            .field("capacity", &self.capacity)
            .field("populated", &self.populated_cells())
            .finish()
    }
}

#[inline]
fn pair_count(capacity: usize) -> usize {
    capacity * capacity.saturating_sub(1) / 2
}
