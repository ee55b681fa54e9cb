use bitflags::bitflags;

use crate::{
    fastr::{FaStr, TmpFaStr},
    word::{Cell, WordId},
    Error, WordFunc,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WordFlags: u8 {
        /// Runs even in compile mode.
        const IMMEDIATE = 1 << 0;
        /// Not found by lookup. Set while a colon definition is being built.
        const HIDDEN = 1 << 1;
    }
}

/// What happens when a word is executed.
pub enum EntryKind<T: 'static> {
    /// A Rust function.
    Builtin(WordFunc<T>),
    /// Threaded code, a list of cells starting at `body`.
    Colon { body: usize },
    /// Pushes the address of its storage.
    Variable { addr: usize },
    Constant { value: Cell },
    FConstant { value: f64 },
    /// Pushes the address of its data field.
    Create { data: usize },
    /// Pushes the data field, then runs the threaded code at `code`.
    Does { data: usize, code: usize },
    /// Struct member: adds `offset` to the address on the stack.
    Field { offset: Cell },
    /// A symbol resolved in a native library.
    Native {
        lib: usize,
        symbol: usize,
        arity: usize,
        returns: bool,
    },
}

impl<T: 'static> Clone for EntryKind<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for EntryKind<T> {}

pub struct Entry<T: 'static> {
    pub name: FaStr,
    pub flags: WordFlags,
    /// Heap cursor when the entry was created, restored by forget.
    pub heap_mark: usize,
    pub kind: EntryKind<T>,
}

/// A statically known builtin, see `Pez::FULL_BUILTINS`.
pub struct BuiltinEntry<T: 'static> {
    pub name: &'static str,
    pub func: WordFunc<T>,
    pub flags: WordFlags,
}

/// The word list of an instance.
///
/// Entries are only ever appended, or removed from the end. Everything
/// below `protected` survives `forget` and state mark rollbacks that
/// happened before protection.
pub struct Dictionary<T: 'static> {
    entries: Vec<Entry<T>>,
    capacity: usize,
    protected: usize,
}

impl<T: 'static> Dictionary<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1024)),
            capacity,
            protected: 0,
        }
    }

    pub fn define(&mut self, entry: Entry<T>) -> Result<WordId, Error> {
        if self.entries.len() >= self.capacity {
            return Err(Error::DictionaryFull);
        }
        let id = WordId(self.entries.len());
        self.entries.push(entry);
        Ok(id)
    }

    /// Find the newest visible entry called `name`.
    pub fn lookup(&self, name: &str) -> Option<WordId> {
        let fastr = TmpFaStr::new_from(name);
        self.entries
            .iter()
            .rposition(|e| !e.flags.contains(WordFlags::HIDDEN) && e.name == fastr)
            .map(WordId)
    }

    #[inline]
    pub fn get(&self, id: WordId) -> Option<&Entry<T>> {
        self.entries.get(id.0)
    }

    #[inline]
    pub fn get_mut(&mut self, id: WordId) -> Option<&mut Entry<T>> {
        self.entries.get_mut(id.0)
    }

    pub fn latest_mut(&mut self) -> Option<&mut Entry<T>> {
        self.entries.last_mut()
    }

    /// Remove `id` and everything defined after it, returning the heap cursor
    /// recorded when `id` was defined.
    pub fn forget(&mut self, id: WordId) -> Result<usize, Error> {
        if id.0 < self.protected {
            return Err(Error::ForgetProtected);
        }
        let heap_mark = self
            .entries
            .get(id.0)
            .map(|e| e.heap_mark)
            .ok_or_else(|| Error::Undefined(format!("{id:?}")))?;
        self.entries.truncate(id.0);
        Ok(heap_mark)
    }

    /// Drop every entry at or above `len`.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.protected = self.protected.min(len);
    }

    /// Make every current entry immune to `forget`.
    pub fn protect(&mut self) {
        self.protected = self.entries.len();
    }

    #[inline]
    pub fn protected(&self) -> usize {
        self.protected
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Visible entries, newest first.
    pub fn visible(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries
            .iter()
            .rev()
            .filter(|e| !e.flags.contains(WordFlags::HIDDEN))
    }
}

#[cfg(test)]
pub mod test {
    use super::{Dictionary, Entry, EntryKind, WordFlags};
    use crate::{fastr::FaStr, Error};

    fn constant(name: &str, value: i64) -> Entry<()> {
        Entry {
            name: FaStr::new(name),
            flags: WordFlags::empty(),
            heap_mark: value as usize,
            kind: EntryKind::Constant { value },
        }
    }

    #[test]
    fn newest_wins_and_hidden_is_skipped() {
        let mut dict = Dictionary::<()>::new(8);
        let a = dict.define(constant("x", 1)).unwrap();
        let b = dict.define(constant("x", 2)).unwrap();
        assert_eq!(dict.lookup("x"), Some(b));

        dict.get_mut(b).unwrap().flags |= WordFlags::HIDDEN;
        assert_eq!(dict.lookup("x"), Some(a));
        assert_eq!(dict.lookup("y"), None);
        assert_eq!(dict.visible().count(), 1);
    }

    #[test]
    fn forget_respects_protection() {
        let mut dict = Dictionary::<()>::new(8);
        let a = dict.define(constant("a", 0)).unwrap();
        dict.protect();
        let b = dict.define(constant("b", 16)).unwrap();
        dict.define(constant("c", 24)).unwrap();

        assert_eq!(dict.forget(a), Err(Error::ForgetProtected));
        assert_eq!(dict.forget(b), Ok(16));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.lookup("c"), None);
    }

    #[test]
    fn capacity() {
        let mut dict = Dictionary::<()>::new(1);
        dict.define(constant("a", 0)).unwrap();
        assert_eq!(dict.define(constant("b", 0)), Err(Error::DictionaryFull));
    }
}
