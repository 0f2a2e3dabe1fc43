use std::collections::HashMap;
use std::collections::hash_map::Entry;

use loda_common::{LodaError, LodaResult};
use loda_number::Number;

/// Cells `0..DENSE_CELLS` are kept in a plain `Vec`; a hand-written program
/// almost never touches an index past this, but a generated or pathological
/// one can address any non-negative cell, so the tail spills into a sparse
/// map rather than growing a dense `Vec` without bound.
const DENSE_CELLS: usize = 64;

/// The interpreter's addressable cell space: non-negative integer indices to
/// [`Number`] values, unset cells reading as zero.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Memory {
    dense: Vec<Number>,
    sparse: HashMap<i64, Number>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: i64) -> LodaResult<Number> {
        if index < 0 {
            return Err(LodaError::OutOfRange(format!("negative cell index {index}")));
        }
        if let Some(d) = dense_index(index) {
            Ok(self.dense.get(d).cloned().unwrap_or_default())
        } else {
            Ok(self.sparse.get(&index).cloned().unwrap_or_default())
        }
    }

    pub fn set(&mut self, index: i64, value: Number) -> LodaResult<()> {
        if index < 0 {
            return Err(LodaError::OutOfRange(format!("negative cell index {index}")));
        }
        if let Some(d) = dense_index(index) {
            if d >= self.dense.len() {
                self.dense.resize(d + 1, Number::zero());
            }
            self.dense[d] = value;
        } else {
            match self.sparse.entry(index) {
                Entry::Occupied(mut e) => {
                    if value.is_zero() {
                        e.remove();
                    } else {
                        *e.get_mut() = value;
                    }
                }
                Entry::Vacant(e) => {
                    if !value.is_zero() {
                        e.insert(value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Zeroes `length` consecutive cells starting at `start` (the `clr`
    /// operation).
    pub fn clear(&mut self, start: i64, length: i64) -> LodaResult<()> {
        if length < 0 {
            return Err(LodaError::OutOfRange(format!("negative clear length {length}")));
        }
        for offset in 0..length {
            self.set(start + offset, Number::zero())?;
        }
        Ok(())
    }

    /// Returns cells `[start, start+length)` as a standalone [`Memory`]
    /// shifted down to index 0, used to build the argument snapshot handed
    /// to a called subprogram (`seq`) without leaking the caller's state
    /// beyond the window the callee can see.
    pub fn fragment(&self, start: i64, length: i64) -> LodaResult<Memory> {
        if length < 0 {
            return Err(LodaError::OutOfRange(format!("negative fragment length {length}")));
        }
        let mut result = Memory::new();
        for i in 0..length {
            result.set(i, self.get(start + i)?)?;
        }
        Ok(result)
    }

    /// The highest index holding a non-zero value, or `None` if every cell
    /// is zero.
    pub fn last_nonzero(&self) -> Option<i64> {
        let dense_max = self
            .dense
            .iter()
            .enumerate()
            .rev()
            .find(|(_, v)| !v.is_zero())
            .map(|(i, _)| i as i64);
        let sparse_max = self.sparse.iter().filter(|(_, v)| !v.is_zero()).map(|(k, _)| *k).max();
        dense_max.into_iter().chain(sparse_max).max()
    }

    /// Strict "progress" comparison over `[start, start+count)`, most
    /// significant cell first, used by `lpb` to confirm the loop body
    /// shrank the counter fragment since the previous iteration.
    pub fn is_less(&self, previous: &Memory, start: i64, count: i64) -> LodaResult<bool> {
        for offset in (0..count).rev() {
            let current = self.get(start + offset)?;
            let before = previous.get(start + offset)?;
            match current.try_cmp(&before)? {
                std::cmp::Ordering::Less => return Ok(true),
                std::cmp::Ordering::Greater => return Ok(false),
                std::cmp::Ordering::Equal => continue,
            }
        }
        Ok(false)
    }
}

fn dense_index(index: i64) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < DENSE_CELLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_cell_reads_zero() {
        let m = Memory::new();
        assert!(m.get(0).unwrap().is_zero());
        assert!(m.get(1000).unwrap().is_zero());
    }

    #[test]
    fn test_set_get_roundtrip_dense_and_sparse() {
        let mut m = Memory::new();
        m.set(3, Number::from_i64(42)).unwrap();
        m.set(500, Number::from_i64(7)).unwrap();
        assert_eq!(m.get(3).unwrap(), Number::from_i64(42));
        assert_eq!(m.get(500).unwrap(), Number::from_i64(7));
    }

    #[test]
    fn test_negative_index_is_error() {
        let m = Memory::new();
        assert!(m.get(-1).is_err());
    }

    #[test]
    fn test_clear_zeros_range() {
        let mut m = Memory::new();
        m.set(0, Number::from_i64(1)).unwrap();
        m.set(1, Number::from_i64(2)).unwrap();
        m.clear(0, 2).unwrap();
        assert!(m.get(0).unwrap().is_zero());
        assert!(m.get(1).unwrap().is_zero());
    }

    #[test]
    fn test_fragment_copies_prefix_only() {
        let mut m = Memory::new();
        m.set(0, Number::from_i64(1)).unwrap();
        m.set(5, Number::from_i64(9)).unwrap();
        let frag = m.fragment(0, 2).unwrap();
        assert_eq!(frag.get(0).unwrap(), Number::from_i64(1));
        assert!(frag.get(5).unwrap().is_zero());
    }

    #[test]
    fn test_is_less_most_significant_cell_first() {
        let mut before = Memory::new();
        before.set(0, Number::from_i64(5)).unwrap();
        before.set(1, Number::from_i64(1)).unwrap();
        let mut after = before.clone();
        after.set(1, Number::from_i64(0)).unwrap();
        assert!(after.is_less(&before, 0, 2).unwrap());
        assert!(!before.is_less(&after, 0, 2).unwrap());
    }

    #[test]
    fn test_last_nonzero() {
        let mut m = Memory::new();
        assert_eq!(m.last_nonzero(), None);
        m.set(10, Number::from_i64(3)).unwrap();
        assert_eq!(m.last_nonzero(), Some(10));
    }
}
