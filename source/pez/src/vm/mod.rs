use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    config::Params,
    dictionary::{Dictionary, Entry, EntryKind, WordFlags},
    fastr::FaStr,
    heap::{Heap, HeapError},
    input::WordStrBuf,
    io::Streams,
    loader::{Loader, StructDesc},
    mark::StateMark,
    output::OutputBuf,
    permissions::Permissions,
    regex::RegexSlots,
    stack::{Region, Stack},
    word::{cell_align, cell_to_usize, Cell, WordId},
    Error, Mode, Status, WordFunc,
};

pub mod builtins;
mod interp;

pub(crate) use self::interp::Walkback;

/// Return address meaning "back to the host".
pub(crate) const NO_RETURN: Cell = -1;

/// Lets the host stop a running evaluation from another thread.
///
/// The inner interpreter polls the flag before every word it executes and
/// fails with [`Error::Break`] once it is set.
#[derive(Clone, Debug)]
pub struct BreakHandle {
    flag: Arc<AtomicBool>,
}

impl BreakHandle {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// A token consumer waiting for the next word of input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Pending {
    Tick,
    CompileTick,
    BracketCompile,
    Forget,
    Define(DefKind),
}

/// What a defining word will create once it has a name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DefKind {
    Colon,
    Variable,
    FVariable,
    Constant(Cell),
    FConstant(f64),
    /// `data` is fixed when `create` runs, so cells compiled before the
    /// name arrives land in the data field. `code` is set by a `does>`
    /// that ran in the meantime.
    Create {
        data: usize,
        code: Option<usize>,
    },
    Struct,
    Field {
        offset: Cell,
    },
    Native {
        lib: usize,
        symbol: usize,
        arity: usize,
        returns: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrKind {
    /// `"text"`: address.
    Push,
    /// `s" text"`: address and length.
    PushLen,
    /// `." text"`: printed.
    Print,
}

pub(crate) struct PendingStr {
    kind: StrKind,
    text: Vec<u8>,
}

/// The colon definition being compiled, and where to roll back to if it
/// fails.
pub(crate) struct Definition {
    pub(crate) id: WordId,
    pub(crate) mark: StateMark,
}

/// Words the compiler emits by itself.
#[derive(Clone, Copy)]
pub(crate) struct Internals {
    pub(crate) lit: WordId,
    pub(crate) flit: WordId,
    pub(crate) branch: WordId,
    pub(crate) qbranch: WordId,
    pub(crate) xdo: WordId,
    pub(crate) xqdo: WordId,
    pub(crate) xloop: WordId,
    pub(crate) xploop: WordId,
    pub(crate) strlit: WordId,
    pub(crate) slit: WordId,
    pub(crate) dotstr: WordId,
    pub(crate) does: WordId,
    pub(crate) exit: WordId,
}

impl Internals {
    fn find<T: 'static>(dict: &Dictionary<T>) -> Result<Self, Error> {
        let get = |name: &str| {
            dict.lookup(name)
                .ok_or_else(|| Error::Undefined(name.to_string()))
        };
        Ok(Self {
            lit: get("(lit)")?,
            flit: get("(flit)")?,
            branch: get("(branch)")?,
            qbranch: get("(?branch)")?,
            xdo: get("(do)")?,
            xqdo: get("(?do)")?,
            xloop: get("(loop)")?,
            xploop: get("(+loop)")?,
            strlit: get("(strlit)")?,
            slit: get("(slit)")?,
            dotstr: get("(.\")")?,
            does: get("(does>)")?,
            exit: get("exit")?,
        })
    }
}

/// Rotating heap buffers for strings made while interpreting.
struct TempStrings {
    base: usize,
    count: usize,
    len: usize,
    next: usize,
}

enum Number {
    Int(Cell),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStats {
    pub used: usize,
    pub max: usize,
    pub capacity: usize,
}

/// Usage of every memory region, see [`Pez::memstat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    pub stack: RegionStats,
    pub return_stack: RegionStats,
    pub float_stack: RegionStats,
    pub heap: RegionStats,
    pub dictionary: RegionStats,
}

/// One interpreter instance.
pub struct Pez<T: 'static> {
    pub(crate) mode: Mode,
    pub data_stack: Stack<Cell>,
    pub return_stack: Stack<Cell>,
    pub float_stack: Stack<f64>,
    pub heap: Heap,
    pub(crate) dict: Dictionary<T>,
    pub(crate) permissions: Permissions,

    // execution state
    pub(crate) ip: Option<usize>,
    pub(crate) cur_word: Option<WordId>,
    pub(crate) tail_call_pending: bool,
    pub(crate) trace: bool,
    pub(crate) ignore_break: bool,
    brk: BreakHandle,
    pub(crate) walkback: Walkback,
    depth: usize,

    // compiler state
    pub(crate) create_word: Option<Definition>,
    pub(crate) create_struct: Option<(WordId, StructDesc)>,

    // lexer state
    pub input: WordStrBuf,
    pub(crate) pending: Option<Pending>,
    pub(crate) string: Option<PendingStr>,
    pub(crate) comment: bool,
    base_addr: usize,
    temp: TempStrings,

    pub output: OutputBuf,
    pub(crate) streams: Streams,
    pub(crate) regex: RegexSlots,
    pub(crate) loader: Loader,
    pub(crate) internals: Internals,
    params: Params,
    pub host_ctxt: T,
}

impl<T: 'static> Pez<T> {
    /// Create an instance with every builtin installed and protected.
    pub fn new(params: &Params, permissions: Permissions, host_ctxt: T) -> Result<Self, Error> {
        let mut dict = Dictionary::new(params.dict_entries);
        for bi in Self::FULL_BUILTINS {
            dict.define(Entry {
                name: FaStr::from_static(bi.name),
                flags: bi.flags,
                heap_mark: 0,
                kind: EntryKind::Builtin(bi.func),
            })?;
        }
        let internals = Internals::find(&dict)?;
        dict.protect();

        let mut heap = Heap::new(params.heap_bytes);
        let base_addr = heap.bump_write(10)?;
        let temp_bytes = params
            .temp_strings
            .checked_mul(params.temp_string_len)
            .ok_or(HeapError::Overflow)?;
        let temp_base = heap.bump_u8s(temp_bytes)?;
        heap.align()?;
        heap.set_floor(heap.here());

        tracing::debug!(?permissions, builtins = dict.len(), "instance created");

        Ok(Self {
            mode: Mode::Run,
            data_stack: Stack::new(Region::Data, params.stack_elems),
            return_stack: Stack::new(Region::Return, params.return_stack_elems),
            float_stack: Stack::new(Region::Float, params.float_stack_elems),
            heap,
            dict,
            permissions,
            ip: None,
            cur_word: None,
            tail_call_pending: false,
            trace: false,
            ignore_break: false,
            brk: BreakHandle::new(),
            walkback: Walkback::new(params.walkback),
            depth: 0,
            create_word: None,
            create_struct: None,
            input: WordStrBuf::new(),
            pending: None,
            string: None,
            comment: false,
            base_addr,
            temp: TempStrings {
                base: temp_base,
                count: params.temp_strings,
                len: params.temp_string_len,
                next: 0,
            },
            output: OutputBuf::new(),
            streams: Streams::default(),
            regex: RegexSlots::default(),
            loader: Loader::new(params.load_path.clone()),
            internals,
            params: params.clone(),
            host_ctxt,
        })
    }

    /// Create a fresh instance sharing this one's configuration.
    ///
    /// Needs `SPAWN`. The child can never hold a permission its parent
    /// lacks.
    pub fn spawn<U: 'static>(&self, permissions: Permissions, host_ctxt: U) -> Result<Pez<U>, Error> {
        self.require(Permissions::SPAWN)?;
        let mut child = Pez::new(&self.params, permissions & self.permissions, host_ctxt)?;
        child.loader.load_path = self.loader.load_path.clone();
        Ok(child)
    }

    pub fn release(self) -> T {
        self.host_ctxt
    }

    /// Evaluate one line of source.
    ///
    /// On any error except [`Error::RunString`] the instance is reset: all
    /// stacks are emptied, a definition in progress is rolled back and
    /// pending lexer state is dropped.
    pub fn eval(&mut self, line: &str) -> Result<(), Error> {
        if self.depth == 0 {
            self.walkback.reset();
        }
        let saved = core::mem::take(&mut self.input);
        self.input.fill(line);

        self.depth += 1;
        let res = self.process_line();
        self.depth -= 1;
        self.input = saved;

        match res {
            Err(e) if self.depth == 0 && e != Error::RunString => {
                self.abort(&e);
                Err(e)
            }
            res => res,
        }
    }

    pub fn eval_status(&mut self, line: &str) -> Status {
        match self.eval(line) {
            Ok(()) => Status::Normal,
            Err(e) => e.status(),
        }
    }

    fn abort(&mut self, err: &Error) {
        self.walkback.capture(&self.dict, self.cur_word);
        if let Some(def) = self.create_word.take() {
            self.unwind(&def.mark);
        }
        self.create_struct = None;
        self.data_stack.clear();
        self.return_stack.clear();
        self.float_stack.clear();
        self.ip = None;
        self.cur_word = None;
        self.tail_call_pending = false;
        self.pending = None;
        self.string = None;
        self.comment = false;
        self.mode = Mode::Run;
        self.streams.reset_redirects();
        tracing::warn!(
            ?err,
            status = err.status().code(),
            walkback = ?self.walkback.last(),
            "evaluation failed"
        );
    }

    /// Process everything in `self.input`.
    pub fn process_line(&mut self) -> Result<(), Error> {
        loop {
            if self.comment && !self.munch_comment() {
                return Ok(());
            }
            if self.string.is_some() {
                self.munch_string()?;
                continue;
            }
            self.input.advance();
            let tok = match self.input.cur_word() {
                Some(w) => w.to_ascii_lowercase(),
                None => return Ok(()),
            };
            self.process_token(&tok)?;
        }
    }

    fn process_token(&mut self, tok: &str) -> Result<(), Error> {
        match tok {
            "(" => {
                self.comment = true;
                return Ok(());
            }
            "\\" => {
                self.input.seek(usize::MAX);
                return Ok(());
            }
            ".\"" => return self.begin_string(StrKind::Print, true),
            "s\"" => return self.begin_string(StrKind::PushLen, true),
            _ if tok.starts_with('"') => {
                let start = self.input.word_start().unwrap_or(0);
                self.input.seek(start + 1);
                return self.begin_string(StrKind::Push, false);
            }
            _ => {}
        }

        if let Some(pending) = self.pending.take() {
            return self.finish_pending(pending, tok);
        }

        if let Some(id) = self.dict.lookup(tok) {
            let immediate = self
                .dict
                .get(id)
                .map_or(false, |e| e.flags.contains(WordFlags::IMMEDIATE));
            return if self.mode == Mode::Compile && !immediate {
                self.compile_xt(id)
            } else {
                self.run(id)
            };
        }

        match (self.parse_number(tok)?, self.mode) {
            (Some(Number::Int(val)), Mode::Compile) => self.compile_lit(val),
            (Some(Number::Int(val)), Mode::Run) => Ok(self.data_stack.push(val)?),
            (Some(Number::Float(val)), Mode::Compile) => {
                self.compile_xt(self.internals.flit)?;
                self.compile_cell(val.to_bits() as Cell)
            }
            (Some(Number::Float(val)), Mode::Run) => Ok(self.float_stack.push(val)?),
            (None, _) => Err(Error::Undefined(tok.to_string())),
        }
    }

    fn parse_number(&self, tok: &str) -> Result<Option<Number>, Error> {
        let radix = self.base()?;
        if let Ok(val) = Cell::from_str_radix(tok, radix) {
            return Ok(Some(Number::Int(val)));
        }
        let looks_real = radix == 10
            && tok.bytes().any(|b| b.is_ascii_digit())
            && tok.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'));
        if looks_real {
            if let Ok(val) = tok.parse::<f64>() {
                return Ok(Some(Number::Float(val)));
            }
        }
        Ok(None)
    }

    /// The current numeric base. Out of range values read as decimal.
    pub(crate) fn base(&self) -> Result<u32, Error> {
        let base = self.heap.fetch(self.base_addr)?;
        Ok(match u32::try_from(base) {
            Ok(b @ 2..=36) => b,
            _ => 10,
        })
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.base_addr
    }

    // Returns `true` once the comment is closed.
    fn munch_comment(&mut self) -> bool {
        match self.input.remaining().find(')') {
            Some(pos) => {
                self.input.consume(pos + 1);
                self.comment = false;
                true
            }
            None => {
                self.input.seek(usize::MAX);
                false
            }
        }
    }

    fn begin_string(&mut self, kind: StrKind, skip_space: bool) -> Result<(), Error> {
        if skip_space && self.input.remaining().starts_with([' ', '\t']) {
            self.input.consume(1);
        }
        self.string = Some(PendingStr {
            kind,
            text: Vec::new(),
        });
        Ok(())
    }

    fn munch_string(&mut self) -> Result<(), Error> {
        let pending = match self.string.as_mut() {
            Some(p) => p,
            None => return Ok(()),
        };
        let bytes = self.input.remaining().as_bytes();
        let mut used = 0;
        let mut escape = false;
        let mut closed = false;
        while let Some(&b) = bytes.get(used) {
            used += 1;
            if escape {
                escape = false;
                pending.text.push(match b {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    other => other,
                });
                continue;
            }
            match b {
                b'\\' => escape = true,
                b'"' => {
                    closed = true;
                    break;
                }
                other => pending.text.push(other),
            }
        }
        if escape {
            pending.text.push(b'\\');
        }

        if !closed {
            // The literal carries on with the next line
            pending.text.push(b'\n');
            self.input.seek(usize::MAX);
            return Err(Error::RunString);
        }
        self.input.consume(used);
        match self.string.take() {
            Some(s) => self.finish_string(s),
            None => Ok(()),
        }
    }

    fn finish_string(&mut self, s: PendingStr) -> Result<(), Error> {
        if self.mode == Mode::Compile {
            let xt = match s.kind {
                StrKind::Push => self.internals.strlit,
                StrKind::PushLen => self.internals.slit,
                StrKind::Print => self.internals.dotstr,
            };
            return self.compile_str(xt, &s.text);
        }
        match s.kind {
            StrKind::Print => self.write_out(&s.text),
            StrKind::Push => {
                let (addr, _) = self.push_temp(&s.text)?;
                Ok(self.data_stack.push(addr as Cell)?)
            }
            StrKind::PushLen => {
                let (addr, len) = self.push_temp(&s.text)?;
                self.data_stack.push(addr as Cell)?;
                Ok(self.data_stack.push(len as Cell)?)
            }
        }
    }

    /// Copy `bytes` into the next temporary string buffer, truncating to
    /// fit. Returns the address and the stored length.
    pub(crate) fn push_temp(&mut self, bytes: &[u8]) -> Result<(usize, usize), Error> {
        if self.temp.count == 0 || self.temp.len == 0 {
            return Err(HeapError::Overflow.into());
        }
        let addr = self.temp.base + self.temp.next * self.temp.len;
        self.temp.next = (self.temp.next + 1) % self.temp.count;
        let len = bytes.len().min(self.temp.len - 1);
        self.heap.write_cstr(addr, &bytes[..len])?;
        Ok((addr, len))
    }

    /// Read the next token for `pending` right away if the line has one,
    /// otherwise wait for the next line.
    pub(crate) fn with_next_token(&mut self, pending: Pending) -> Result<(), Error> {
        self.input.advance();
        match self.input.cur_word().map(str::to_ascii_lowercase) {
            Some(tok) => self.finish_pending(pending, &tok),
            None => {
                self.pending = Some(pending);
                Ok(())
            }
        }
    }

    fn finish_pending(&mut self, pending: Pending, tok: &str) -> Result<(), Error> {
        match pending {
            Pending::Tick => {
                let id = self.find(tok)?;
                Ok(self.data_stack.push(id.to_cell())?)
            }
            Pending::CompileTick => {
                let id = self.find(tok)?;
                self.compile_lit(id.to_cell())
            }
            Pending::BracketCompile => {
                let id = self.find(tok)?;
                self.compile_xt(id)
            }
            Pending::Forget => {
                let id = self.find(tok)?;
                self.forget(id)
            }
            Pending::Define(kind) => self.define_named(kind, tok),
        }
    }

    fn find(&self, tok: &str) -> Result<WordId, Error> {
        self.dict
            .lookup(tok)
            .ok_or_else(|| Error::Undefined(tok.to_string()))
    }

    fn define_named(&mut self, kind: DefKind, name: &str) -> Result<(), Error> {
        let heap_mark = self.heap.here();
        match kind {
            DefKind::Colon => {
                let mark = self.mark();
                self.heap.align()?;
                let body = self.heap.here();
                let id = self.define_word(name, WordFlags::HIDDEN, heap_mark, EntryKind::Colon { body })?;
                self.create_word = Some(Definition { id, mark });
                self.mode = Mode::Compile;
            }
            DefKind::Variable | DefKind::FVariable => {
                let addr = self.heap.bump_cells(1)?;
                self.define_word(name, WordFlags::empty(), heap_mark, EntryKind::Variable { addr })?;
            }
            DefKind::Constant(value) => {
                self.define_word(name, WordFlags::empty(), heap_mark, EntryKind::Constant { value })?;
            }
            DefKind::FConstant(value) => {
                self.define_word(name, WordFlags::empty(), heap_mark, EntryKind::FConstant { value })?;
            }
            DefKind::Create { data, code } => {
                let kind = match code {
                    Some(code) => EntryKind::Does { data, code },
                    None => EntryKind::Create { data },
                };
                self.define_word(name, WordFlags::empty(), data.min(heap_mark), kind)?;
            }
            DefKind::Struct => {
                let id = self.define_word(
                    name,
                    WordFlags::empty(),
                    heap_mark,
                    EntryKind::Constant { value: 0 },
                )?;
                self.create_struct = Some((
                    id,
                    StructDesc {
                        name: name.to_string(),
                        size: 0,
                    },
                ));
            }
            DefKind::Field { offset } => {
                self.define_word(name, WordFlags::empty(), heap_mark, EntryKind::Field { offset })?;
            }
            DefKind::Native {
                lib,
                symbol,
                arity,
                returns,
            } => {
                self.define_word(
                    name,
                    WordFlags::empty(),
                    heap_mark,
                    EntryKind::Native {
                        lib,
                        symbol,
                        arity,
                        returns,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn define_word(
        &mut self,
        name: &str,
        flags: WordFlags,
        heap_mark: usize,
        kind: EntryKind<T>,
    ) -> Result<WordId, Error> {
        let id = self.dict.define(Entry {
            name: FaStr::new(name),
            flags,
            heap_mark,
            kind,
        })?;
        tracing::debug!(name, id = id.index(), "defined");
        Ok(id)
    }

    pub(crate) fn compile_xt(&mut self, id: WordId) -> Result<(), Error> {
        self.heap.bump_write(id.to_cell())?;
        Ok(())
    }

    pub(crate) fn compile_cell(&mut self, val: Cell) -> Result<(), Error> {
        self.heap.bump_write(val)?;
        Ok(())
    }

    pub(crate) fn compile_lit(&mut self, val: Cell) -> Result<(), Error> {
        self.compile_xt(self.internals.lit)?;
        self.compile_cell(val)
    }

    // xt, length cell, then the bytes NUL padded to a cell boundary
    fn compile_str(&mut self, xt: WordId, text: &[u8]) -> Result<(), Error> {
        self.compile_xt(xt)?;
        self.compile_cell(text.len() as Cell)?;
        let addr = self.heap.bump_u8s(cell_align(text.len() + 1))?;
        self.heap.write_cstr(addr, text)?;
        Ok(())
    }

    /// Check that `len` bytes at `addr` may be touched by Forth code.
    ///
    /// Without `POINTERS` only the allocated part of the heap is reachable.
    pub(crate) fn addr(&self, addr: Cell, len: usize) -> Result<usize, Error> {
        let addr = cell_to_usize(addr)?;
        let limit = if self.permissions.contains(Permissions::POINTERS) {
            self.heap.capacity()
        } else {
            self.heap.here()
        };
        match addr.checked_add(len) {
            Some(end) if end <= limit => Ok(addr),
            _ => Err(HeapError::BadPointer.into()),
        }
    }

    /// The NUL terminated string at `addr`, checked like [`Pez::addr`].
    pub(crate) fn cstr_at(&self, addr: Cell) -> Result<&[u8], Error> {
        let start = self.addr(addr, 0)?;
        let bytes = self.heap.cstr(start)?;
        self.addr(addr, bytes.len() + 1)?;
        Ok(bytes)
    }

    pub(crate) fn string_at(&self, addr: Cell) -> Result<String, Error> {
        Ok(String::from_utf8_lossy(self.cstr_at(addr)?).into_owned())
    }

    /// Write to the current output stream.
    pub(crate) fn write_out(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let fd = self.streams.current_output();
        let out = &mut self.output;
        self.streams.get_mut(fd)?.write_all(out, bytes)?;
        Ok(())
    }

    pub(crate) fn print(&mut self, s: &str) -> Result<(), Error> {
        self.write_out(s.as_bytes())
    }

    pub(crate) fn require(&self, perm: Permissions) -> Result<(), Error> {
        if self.permissions.contains(perm) {
            return Ok(());
        }
        tracing::warn!(
            ?perm,
            word = ?self.cur_word.and_then(|id| self.dict.get(id)).map(|e| e.name.as_str()),
            "permission denied"
        );
        Err(Error::Permission(perm))
    }

    pub(crate) fn compiling(&self) -> Result<(), Error> {
        match self.mode {
            Mode::Compile => Ok(()),
            Mode::Run => Err(Error::NotInDefinition),
        }
    }

    // Host interface

    pub fn add_builtin(&mut self, name: &str, func: WordFunc<T>) -> Result<WordId, Error> {
        let name = name.to_ascii_lowercase();
        let heap_mark = self.heap.here();
        self.define_word(&name, WordFlags::empty(), heap_mark, EntryKind::Builtin(func))
    }

    pub fn lookup(&self, name: &str) -> Option<WordId> {
        self.dict.lookup(&name.to_ascii_lowercase())
    }

    /// Forget `id` and every word defined after it, releasing their heap.
    pub fn forget(&mut self, id: WordId) -> Result<(), Error> {
        let heap_mark = self.dict.forget(id)?;
        self.heap.reset(heap_mark);
        tracing::debug!(?id, "forgot");
        Ok(())
    }

    /// Make every current word immune to `forget`.
    pub fn protect(&mut self) {
        self.dict.protect();
        self.heap.set_floor(self.heap.here());
    }

    pub fn dict_len(&self) -> usize {
        self.dict.len()
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn push(&mut self, val: Cell) -> Result<(), Error> {
        Ok(self.data_stack.push(val)?)
    }

    pub fn pop(&mut self) -> Result<Cell, Error> {
        Ok(self.data_stack.try_pop()?)
    }

    pub fn push_float(&mut self, val: f64) -> Result<(), Error> {
        Ok(self.float_stack.push(val)?)
    }

    pub fn pop_float(&mut self) -> Result<f64, Error> {
        Ok(self.float_stack.try_pop()?)
    }

    /// Push the address of a temporary copy of `s`. The copy is reused after
    /// a few more temporary strings.
    pub fn push_string(&mut self, s: &str) -> Result<usize, Error> {
        let (addr, _) = self.push_temp(s.as_bytes())?;
        self.data_stack.push(addr as Cell)?;
        Ok(addr)
    }

    /// Allocate a permanent copy of `s` on the heap.
    pub fn heap_string(&mut self, s: &str) -> Result<usize, Error> {
        Ok(self.heap.bump_cstr(s.as_bytes())?)
    }

    /// Allocate a float cell on the heap.
    pub fn heap_float(&mut self, val: f64) -> Result<usize, Error> {
        let addr = self.heap.bump_cells(1)?;
        self.heap.store_float(addr, val)?;
        Ok(addr)
    }

    /// Read the NUL terminated string at heap address `addr`.
    pub fn read_string(&self, addr: usize) -> Result<String, Error> {
        Ok(String::from_utf8_lossy(self.heap.cstr(addr)?).into_owned())
    }

    pub fn request_break(&self) {
        self.brk.request();
    }

    pub fn break_handle(&self) -> BreakHandle {
        self.brk.clone()
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Is the next token going to be consumed by something other than the
    /// normal interpreter (a name, a tick or a string continuation)?
    pub fn anticipating_token(&self) -> bool {
        self.pending.is_some() || self.string.is_some()
    }

    pub fn in_comment(&self) -> bool {
        self.comment
    }

    pub fn is_compiling(&self) -> bool {
        self.mode == Mode::Compile
    }

    /// Was the last call elided into a jump?
    pub fn tail_call_pending(&self) -> bool {
        self.tail_call_pending
    }

    /// Words active when the last error was reported, innermost first.
    pub fn last_walkback(&self) -> &[String] {
        self.walkback.last()
    }

    /// Store the result of a regular expression match for `prematch`,
    /// `postmatch` and `match@`.
    pub fn set_regex_matches(&mut self, subject: &str, spans: &[Option<(usize, usize)>]) {
        self.regex.set(subject, spans);
    }

    pub fn memstat(&self) -> MemStats {
        fn stack<V: Copy + Default>(s: &Stack<V>) -> RegionStats {
            RegionStats {
                used: s.depth(),
                max: s.high_water(),
                capacity: s.capacity(),
            }
        }
        MemStats {
            stack: stack(&self.data_stack),
            return_stack: stack(&self.return_stack),
            float_stack: stack(&self.float_stack),
            heap: RegionStats {
                used: self.heap.used(),
                max: self.heap.high_water(),
                capacity: self.heap.capacity(),
            },
            dictionary: RegionStats {
                used: self.dict.len(),
                max: self.dict.len(),
                capacity: self.dict.capacity(),
            },
        }
    }
}

#[cfg(test)]
pub mod test {
    use crate::{
        config::Params, stack::Region, stack::StackError, testutil::all_runtest, Error,
        Permissions, Pez,
    };

    fn pez() -> Pez<()> {
        Pez::new(&Params::default(), Permissions::empty(), ()).unwrap()
    }

    #[test]
    fn strings_span_lines() {
        let mut pez = pez();
        assert_eq!(pez.eval("s\" abc"), Err(Error::RunString));
        assert!(pez.anticipating_token());
        pez.eval("def\" type").unwrap();
        assert_eq!(pez.output.as_str(), "abc\ndef");
        assert!(!pez.anticipating_token());
    }

    #[test]
    fn names_span_lines() {
        let mut pez = pez();
        pez.eval(":").unwrap();
        assert!(pez.anticipating_token());
        pez.eval("sq dup *").unwrap();
        assert!(pez.is_compiling());
        pez.eval("; 7 sq .").unwrap();
        assert_eq!(pez.output.as_str(), "49 ");
    }

    #[test]
    fn errors_reset_the_instance() {
        let mut pez = pez();
        pez.eval("1 2 3 1.5").unwrap();
        assert_eq!(
            pez.eval(": broken 1 2 nosuchword"),
            Err(Error::Undefined("nosuchword".into()))
        );
        assert!(!pez.is_compiling());
        assert!(pez.data_stack.is_empty());
        assert!(pez.float_stack.is_empty());
        assert!(pez.lookup("broken").is_none());

        assert_eq!(
            pez.eval("drop"),
            Err(Error::Stack(StackError::Underflow(Region::Data)))
        );
        assert_eq!(
            pez.eval("fdrop"),
            Err(Error::Stack(StackError::Underflow(Region::Float)))
        );
    }

    #[test]
    fn compile_only_words() {
        let mut pez = pez();
        assert_eq!(pez.eval("1 if"), Err(Error::NotInDefinition));
        assert_eq!(pez.eval(";"), Err(Error::NotInDefinition));
    }

    #[test]
    fn spawn_needs_permission() {
        let pez = pez();
        assert_eq!(
            pez.spawn(Permissions::EVERYTHING, ()).err(),
            Some(Error::Permission(Permissions::SPAWN))
        );

        let parent = Pez::new(
            &Params::default(),
            Permissions::SPAWN | Permissions::IO,
            (),
        )
        .unwrap();
        let child = parent.spawn(Permissions::EVERYTHING, 5u8).unwrap();
        assert_eq!(child.permissions(), Permissions::SPAWN | Permissions::IO);
        assert_eq!(child.release(), 5);
    }

    #[test]
    fn host_strings_and_floats() {
        let mut pez = pez();
        let addr = pez.push_string("Hi There").unwrap();
        assert_eq!(pez.read_string(addr).unwrap(), "Hi There");
        pez.eval("dup strlen type").unwrap();
        assert_eq!(pez.output.as_str(), "Hi There");
        pez.output.clear();

        let f = pez.heap_float(2.5).unwrap();
        pez.push(f as i64).unwrap();
        pez.eval("f@ f.").unwrap();
        assert_eq!(pez.output.as_str(), "2.5 ");

        let s = pez.heap_string("kept").unwrap();
        assert_eq!(pez.read_string(s).unwrap(), "kept");
    }

    #[test]
    fn ui() {
        all_runtest(
            r#"
            ( stack_elems 8 )
            > 1 2 3 .s
            < <3> 1 2 3
            > : sum 0 swap 0 do i + loop ;
            > 4 sum .
            < 6
            > 16 base ! ff . decimal
            < ff
            > 1.5 2e1 f+ f.
            < 21.5
            x 1 2 3 4 5 6 7 8 9
            > "Hello" strlen .
            < 5
            "#,
        );
    }
}
