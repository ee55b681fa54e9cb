use crate::word::{cell_align, Cell, CELL};

#[derive(Debug, Clone, PartialEq)]
pub enum HeapError {
    Overflow,
    BadPointer,
}

/// The byte-addressable heap of an instance.
///
/// Compiled definitions, variables, `create`d data and strings all live
/// here. Forth code only ever sees byte offsets into `buf`, so every access
/// is bounds checked.
pub struct Heap {
    buf: Box<[u8]>,
    cur: usize,
    max: usize,
    floor: usize,
}

impl Heap {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size].into_boxed_slice(),
            cur: 0,
            max: 0,
            floor: 0,
        }
    }

    /// The next free byte.
    #[inline]
    pub fn here(&self) -> usize {
        self.cur
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.cur
    }

    #[inline]
    pub fn high_water(&self) -> usize {
        self.max
    }

    /// Lowest cursor that `allot` with a negative count may reach.
    #[inline]
    pub fn floor(&self) -> usize {
        self.floor
    }

    pub(crate) fn set_floor(&mut self, floor: usize) {
        self.floor = floor;
    }

    /// Restore a cursor, e.g. when unwinding to a state mark or forgetting.
    pub fn reset(&mut self, cur: usize) {
        debug_assert!(cur <= self.buf.len());
        self.cur = cur.min(self.buf.len());
        self.floor = self.floor.min(self.cur);
    }

    /// Bump `n` bytes without alignment, zero filled.
    pub fn bump_u8s(&mut self, n: usize) -> Result<usize, HeapError> {
        let start = self.cur;
        let end = start.checked_add(n).ok_or(HeapError::Overflow)?;
        if end > self.buf.len() {
            return Err(HeapError::Overflow);
        }
        self.buf[start..end].fill(0);
        self.cur = end;
        self.max = self.max.max(end);
        Ok(start)
    }

    /// Pad the cursor up to the next cell boundary.
    pub fn align(&mut self) -> Result<(), HeapError> {
        let pad = cell_align(self.cur) - self.cur;
        self.bump_u8s(pad).map(drop)
    }

    /// Bump `n` cell-aligned cells, zero filled.
    pub fn bump_cells(&mut self, n: usize) -> Result<usize, HeapError> {
        self.align()?;
        let bytes = n.checked_mul(CELL).ok_or(HeapError::Overflow)?;
        self.bump_u8s(bytes)
    }

    /// Append one cell, returning its address.
    pub fn bump_write(&mut self, val: Cell) -> Result<usize, HeapError> {
        let addr = self.bump_cells(1)?;
        self.store(addr, val)?;
        Ok(addr)
    }

    /// Append a NUL terminated byte string, returning its address.
    pub fn bump_cstr(&mut self, bytes: &[u8]) -> Result<usize, HeapError> {
        let addr = self.bump_u8s(bytes.len() + 1)?;
        self.buf[addr..addr + bytes.len()].copy_from_slice(bytes);
        Ok(addr)
    }

    /// Move the cursor by `n` bytes. Shrinking stops at the floor.
    pub fn allot(&mut self, n: isize) -> Result<(), HeapError> {
        if n >= 0 {
            return self.bump_u8s(n.unsigned_abs()).map(drop);
        }
        let new_cur = self
            .cur
            .checked_sub(n.unsigned_abs())
            .filter(|c| *c >= self.floor)
            .ok_or(HeapError::BadPointer)?;
        self.cur = new_cur;
        Ok(())
    }

    /// Is `[addr, addr + len)` inside the heap buffer?
    #[inline]
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        addr.checked_add(len).map_or(false, |end| end <= self.buf.len())
    }

    #[inline]
    fn range(&self, addr: usize, len: usize) -> Result<core::ops::Range<usize>, HeapError> {
        if self.contains(addr, len) {
            Ok(addr..addr + len)
        } else {
            Err(HeapError::BadPointer)
        }
    }

    pub fn fetch(&self, addr: usize) -> Result<Cell, HeapError> {
        let r = self.range(addr, CELL)?;
        let mut bytes = [0u8; CELL];
        bytes.copy_from_slice(&self.buf[r]);
        Ok(Cell::from_le_bytes(bytes))
    }

    pub fn store(&mut self, addr: usize, val: Cell) -> Result<(), HeapError> {
        let r = self.range(addr, CELL)?;
        self.buf[r].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    pub fn fetch_float(&self, addr: usize) -> Result<f64, HeapError> {
        self.fetch(addr).map(|c| f64::from_bits(c as u64))
    }

    pub fn store_float(&mut self, addr: usize, val: f64) -> Result<(), HeapError> {
        self.store(addr, val.to_bits() as Cell)
    }

    pub fn fetch_u8(&self, addr: usize) -> Result<u8, HeapError> {
        self.buf.get(addr).copied().ok_or(HeapError::BadPointer)
    }

    pub fn store_u8(&mut self, addr: usize, val: u8) -> Result<(), HeapError> {
        let slot = self.buf.get_mut(addr).ok_or(HeapError::BadPointer)?;
        *slot = val;
        Ok(())
    }

    pub fn bytes(&self, addr: usize, len: usize) -> Result<&[u8], HeapError> {
        let r = self.range(addr, len)?;
        Ok(&self.buf[r])
    }

    pub fn bytes_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], HeapError> {
        let r = self.range(addr, len)?;
        Ok(&mut self.buf[r])
    }

    /// The NUL terminated string starting at `addr`, without the NUL.
    pub fn cstr(&self, addr: usize) -> Result<&[u8], HeapError> {
        let tail = self.buf.get(addr..).ok_or(HeapError::BadPointer)?;
        let len = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(HeapError::BadPointer)?;
        Ok(&tail[..len])
    }

    /// Write `bytes` plus a NUL terminator at `addr`.
    pub fn write_cstr(&mut self, addr: usize, bytes: &[u8]) -> Result<(), HeapError> {
        let dst = self.bytes_mut(addr, bytes.len() + 1)?;
        dst[..bytes.len()].copy_from_slice(bytes);
        dst[bytes.len()] = 0;
        Ok(())
    }

    /// The whole backing buffer, for native call marshaling.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

#[cfg(test)]
pub mod test {
    use super::{Heap, HeapError};
    use crate::word::CELL;

    #[test]
    fn do_a_bump() {
        let mut heap = Heap::new(256);

        // Be annoying
        let b = heap.bump_u8s(1).unwrap();
        assert_eq!(b, 0);

        let w = heap.bump_write(-42).unwrap();
        assert_eq!(w % CELL, 0);
        assert_eq!(heap.fetch(w), Ok(-42));

        let s = heap.bump_cstr(b"hello").unwrap();
        assert_eq!(heap.cstr(s).unwrap(), b"hello");
        assert_eq!(heap.high_water(), heap.here());
    }

    #[test]
    fn bounds() {
        let mut heap = Heap::new(2 * CELL);
        heap.bump_cells(2).unwrap();
        assert_eq!(heap.bump_u8s(1), Err(HeapError::Overflow));
        assert_eq!(heap.fetch(CELL + 1), Err(HeapError::BadPointer));
        assert_eq!(heap.store_u8(2 * CELL, 1), Err(HeapError::BadPointer));
        assert_eq!(heap.fetch(usize::MAX), Err(HeapError::BadPointer));
    }

    #[test]
    fn allot_respects_floor() {
        let mut heap = Heap::new(64);
        heap.bump_cells(1).unwrap();
        heap.set_floor(heap.here());
        heap.allot(16).unwrap();
        heap.allot(-16).unwrap();
        assert_eq!(heap.allot(-1), Err(HeapError::BadPointer));
        assert_eq!(heap.here(), CELL);
    }

    #[test]
    fn reset_rezeroes_on_reuse() {
        let mut heap = Heap::new(64);
        let a = heap.bump_write(7).unwrap();
        heap.reset(a);
        let b = heap.bump_cells(1).unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.fetch(b), Ok(0));
    }
}
