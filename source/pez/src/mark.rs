use crate::{Mode, Pez};

/// A snapshot of the cursors of every memory region and of the dictionary.
///
/// Taking a mark copies five integers. Unwinding to it moves every cursor
/// back, throwing away anything pushed, allotted or defined since. Storage
/// is not saved, so stack slots or heap bytes overwritten after the mark
/// keep their new contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMark {
    pub(crate) stack: usize,
    pub(crate) rstack: usize,
    pub(crate) fstack: usize,
    pub(crate) heap: usize,
    pub(crate) dict: usize,
}

impl<T: 'static> Pez<T> {
    pub fn mark(&self) -> StateMark {
        StateMark {
            stack: self.data_stack.cursor(),
            rstack: self.return_stack.cursor(),
            fstack: self.float_stack.cursor(),
            heap: self.heap.here(),
            dict: self.dict.len(),
        }
    }

    /// Restore every region to `mark`.
    ///
    /// A definition started after the mark is abandoned. Marks taken before
    /// `protect` may drop protected words; that is the host's call.
    pub fn unwind(&mut self, mark: &StateMark) {
        self.data_stack.set_cursor(mark.stack);
        self.return_stack.set_cursor(mark.rstack);
        self.float_stack.set_cursor(mark.fstack);
        self.heap.reset(mark.heap);
        self.dict.truncate(mark.dict);

        let abandoned = self
            .create_word
            .as_ref()
            .map_or(false, |def| def.id.index() >= mark.dict);
        if abandoned {
            self.create_word = None;
            self.mode = Mode::Run;
        }
        if matches!(&self.create_struct, Some((id, _)) if id.index() >= mark.dict) {
            self.create_struct = None;
        }
        tracing::debug!(?mark, "unwound");
    }
}
