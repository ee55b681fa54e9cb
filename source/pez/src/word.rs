use core::fmt::Debug;

use crate::{heap::HeapError, Error, ReplaceErr};

/// A single stack/heap cell. Integers and heap addresses are both cells.
pub type Cell = i64;

/// Size of a [`Cell`] in the heap, in bytes.
pub const CELL: usize = core::mem::size_of::<Cell>();

/// Round a byte count up to a whole number of cells.
#[inline]
pub const fn cell_align(n: usize) -> usize {
    (n + (CELL - 1)) & !(CELL - 1)
}

/// Index of an entry in the dictionary, also known as its "execution token".
///
/// Compiled definitions are lists of these, stored as cells in the heap.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordId(pub(crate) usize);

impl WordId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub fn to_cell(self) -> Cell {
        // Dictionary capacity is far below i64::MAX
        self.0 as Cell
    }

    #[inline]
    pub fn from_cell(cell: Cell) -> Result<Self, Error> {
        let idx = usize::try_from(cell).replace_err(Error::Heap(HeapError::BadPointer))?;
        Ok(WordId(idx))
    }
}

impl Debug for WordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "xt#{}", self.0)
    }
}

/// Convert a cell into a heap address or a count.
pub(crate) fn cell_to_usize(cell: Cell) -> Result<usize, Error> {
    usize::try_from(cell).replace_err(Error::Heap(HeapError::BadPointer))
}

#[cfg(test)]
pub mod test {
    use super::{cell_align, WordId, CELL};

    #[test]
    fn alignment() {
        assert_eq!(cell_align(0), 0);
        assert_eq!(cell_align(1), CELL);
        assert_eq!(cell_align(CELL), CELL);
        assert_eq!(cell_align(CELL + 1), 2 * CELL);
    }

    #[test]
    fn xt_cells() {
        assert_eq!(WordId::from_cell(7).unwrap(), WordId(7));
        assert!(WordId::from_cell(-1).is_err());
    }
}
