/// Which of the three stacks an operation touched.
///
/// Carried in every [`StackError`] so each region reports its own
/// overflow/underflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Data,
    Return,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackError {
    Overflow(Region),
    Underflow(Region),
}

/// A bounded stack with an explicit cursor.
///
/// Popping only moves the cursor; storage is never erased, so moving the
/// cursor back up (see [`Stack::set_cursor`]) exposes the same values again.
pub struct Stack<T: Copy + Default> {
    buf: Box<[T]>,
    cur: usize,
    max: usize,
    region: Region,
}

impl<T: Copy + Default> Stack<T> {
    pub fn new(region: Region, items: usize) -> Self {
        Self {
            buf: vec![T::default(); items].into_boxed_slice(),
            cur: 0,
            max: 0,
            region,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), StackError> {
        let slot = self
            .buf
            .get_mut(self.cur)
            .ok_or(StackError::Overflow(self.region))?;
        *slot = item;
        self.cur += 1;
        self.max = self.max.max(self.cur);
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.cur
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Deepest the stack has been since it was created.
    #[inline]
    pub fn high_water(&self) -> usize {
        self.max
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        match self.pop() {
            Some(v) => Ok(v),
            None => Err(StackError::Underflow(self.region)),
        }
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let next_cur = self.cur.checked_sub(1)?;
        self.cur = next_cur;
        Some(self.buf[next_cur])
    }

    #[inline]
    pub fn try_peek(&self) -> Result<T, StackError> {
        self.peek().ok_or(StackError::Underflow(self.region))
    }

    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.peek_back_n(0)
    }

    #[inline]
    pub fn peek_back_n(&self, n: usize) -> Option<T> {
        let idx = self.cur.checked_sub(n + 1)?;
        Some(self.buf[idx])
    }

    #[inline]
    pub fn try_peek_back_n(&self, n: usize) -> Result<T, StackError> {
        self.peek_back_n(n).ok_or(StackError::Underflow(self.region))
    }

    #[inline]
    pub fn try_peek_back_n_mut(&mut self, n: usize) -> Result<&mut T, StackError> {
        let idx = self
            .cur
            .checked_sub(n + 1)
            .ok_or(StackError::Underflow(self.region))?;
        Ok(&mut self.buf[idx])
    }

    #[inline]
    pub fn overwrite_back_n(&mut self, n: usize, item: T) -> Result<(), StackError> {
        *self.try_peek_back_n_mut(n)? = item;
        Ok(())
    }

    /// Move the item `n` places below the top to the top, shifting the
    /// ones above it down.
    pub fn roll(&mut self, n: usize) -> Result<(), StackError> {
        let idx = self
            .cur
            .checked_sub(n + 1)
            .ok_or(StackError::Underflow(self.region))?;
        self.buf[idx..self.cur].rotate_left(1);
        Ok(())
    }

    /// The live items, bottom first.
    pub fn as_slice(&self) -> &[T] {
        &self.buf[..self.cur]
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cur
    }

    /// Restore a cursor previously taken with [`Stack::cursor`].
    #[inline]
    pub fn set_cursor(&mut self, cur: usize) {
        debug_assert!(cur <= self.buf.len());
        self.cur = cur.min(self.buf.len());
    }

    #[inline]
    pub fn clear(&mut self) {
        self.cur = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cur == 0
    }
}
