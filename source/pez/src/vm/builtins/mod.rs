use crate::{
    dictionary::{BuiltinEntry, EntryKind},
    heap::HeapError,
    vm::{DefKind, Pending},
    word::{cell_align, cell_to_usize, Cell, CELL},
    Error, Pez, ReplaceErr,
};

pub mod compiler;
pub mod ffi;
pub mod floats;
pub mod io;

const TRUE: Cell = -1;
const FALSE: Cell = 0;

#[inline]
fn flag(b: bool) -> Cell {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Build a [`BuiltinEntry`]. Add `immediate` to run it while compiling.
#[macro_export]
macro_rules! builtin {
    ($name:literal, $func:expr) => {
        $crate::dictionary::BuiltinEntry {
            name: $name,
            func: $func,
            flags: $crate::dictionary::WordFlags::empty(),
        }
    };
    ($name:literal, $func:expr, immediate) => {
        $crate::dictionary::BuiltinEntry {
            name: $name,
            func: $func,
            flags: $crate::dictionary::WordFlags::IMMEDIATE,
        }
    };
}

impl<T: 'static> Pez<T> {
    pub const FULL_BUILTINS: &'static [BuiltinEntry<T>] = &[
        //
        // compiler internals
        //
        builtin!("(lit)", Self::lit),
        builtin!("(flit)", Self::flit),
        builtin!("(branch)", Self::branch),
        builtin!("(?branch)", Self::qbranch),
        builtin!("(do)", Self::xdo),
        builtin!("(?do)", Self::xqdo),
        builtin!("(loop)", Self::xloop),
        builtin!("(+loop)", Self::xploop),
        builtin!("(strlit)", Self::strlit),
        builtin!("(slit)", Self::slit),
        builtin!("(.\")", Self::dotstr),
        builtin!("(does>)", Self::does_runtime),
        builtin!("exit", Self::exit),
        //
        // stack
        //
        builtin!("dup", Self::dup),
        builtin!("drop", Self::ds_drop),
        builtin!("swap", Self::swap),
        builtin!("over", Self::over),
        builtin!("rot", Self::rot),
        builtin!("-rot", Self::neg_rot),
        builtin!("nip", Self::nip),
        builtin!("tuck", Self::tuck),
        builtin!("pick", Self::pick),
        builtin!("roll", Self::roll),
        builtin!("?dup", Self::qdup),
        builtin!("2dup", Self::dup_2),
        builtin!("2drop", Self::ds_drop_2),
        builtin!("2swap", Self::swap_2),
        builtin!("2over", Self::over_2),
        builtin!("depth", Self::depth),
        builtin!("clear", Self::clear),
        //
        // arithmetic and logic
        //
        builtin!("+", Self::add),
        builtin!("-", Self::minus),
        builtin!("*", Self::mul),
        builtin!("/", Self::div),
        builtin!("mod", Self::modu),
        builtin!("/mod", Self::div_mod),
        builtin!("negate", Self::negate),
        builtin!("abs", Self::abs),
        builtin!("min", Self::min),
        builtin!("max", Self::max),
        builtin!("1+", Self::one_plus),
        builtin!("1-", Self::one_minus),
        builtin!("2*", Self::two_mul),
        builtin!("2/", Self::two_div),
        builtin!("and", Self::logical_and),
        builtin!("or", Self::logical_or),
        builtin!("xor", Self::logical_xor),
        builtin!("invert", Self::invert),
        builtin!("not", Self::zero_equal),
        builtin!("lshift", Self::lshift),
        builtin!("rshift", Self::rshift),
        //
        // comparison
        //
        builtin!("=", Self::equal),
        builtin!("<>", Self::not_equal),
        builtin!("<", Self::less),
        builtin!(">", Self::greater),
        builtin!("<=", Self::less_equal),
        builtin!(">=", Self::greater_equal),
        builtin!("0=", Self::zero_equal),
        builtin!("0<>", Self::zero_not_equal),
        builtin!("0<", Self::zero_less),
        builtin!("0>", Self::zero_greater),
        builtin!("true", Self::push_true),
        builtin!("false", Self::push_false),
        //
        // memory
        //
        builtin!("@", Self::var_load),
        builtin!("!", Self::var_store),
        builtin!("c@", Self::byte_load),
        builtin!("c!", Self::byte_store),
        builtin!("+!", Self::plus_store),
        builtin!("here", Self::here),
        builtin!("allot", Self::allot),
        builtin!(",", Self::comma),
        builtin!("c,", Self::byte_comma),
        builtin!("cells", Self::cells),
        builtin!("cell+", Self::cell_plus),
        builtin!("align", Self::align_heap),
        builtin!("fill", Self::fill),
        //
        // return stack and loops
        //
        builtin!(">r", Self::to_rs),
        builtin!("r>", Self::from_rs),
        builtin!("r@", Self::rs_fetch),
        builtin!("i", Self::loop_i),
        builtin!("j", Self::loop_j),
        builtin!("leave", Self::leave),
        //
        // compiler
        //
        builtin!(":", Self::colon),
        builtin!(";", Self::semicolon, immediate),
        builtin!("immediate", Self::immediate),
        builtin!("[", Self::left_bracket, immediate),
        builtin!("]", Self::right_bracket),
        builtin!("'", Self::tick, immediate),
        builtin!("[']", Self::bracket_tick, immediate),
        builtin!("[compile]", Self::bracket_compile, immediate),
        builtin!("literal", Self::literal, immediate),
        builtin!("execute", Self::execute),
        builtin!("create", Self::create),
        builtin!("variable", Self::variable),
        builtin!("constant", Self::constant),
        builtin!("forget", Self::forget_word),
        builtin!("compiling?", Self::is_compiling_word),
        builtin!("recurse", Self::recurse, immediate),
        builtin!("does>", Self::does, immediate),
        builtin!("if", Self::cf_if, immediate),
        builtin!("else", Self::cf_else, immediate),
        builtin!("then", Self::cf_then, immediate),
        builtin!("begin", Self::cf_begin, immediate),
        builtin!("until", Self::cf_until, immediate),
        builtin!("again", Self::cf_again, immediate),
        builtin!("while", Self::cf_while, immediate),
        builtin!("repeat", Self::cf_repeat, immediate),
        builtin!("do", Self::cf_do, immediate),
        builtin!("?do", Self::cf_qdo, immediate),
        builtin!("loop", Self::cf_loop, immediate),
        builtin!("+loop", Self::cf_ploop, immediate),
        //
        // output and strings
        //
        builtin!(".", Self::pop_print),
        builtin!("emit", Self::emit),
        builtin!("cr", Self::cr),
        builtin!("space", Self::space),
        builtin!("spaces", Self::spaces),
        builtin!(".s", Self::print_stack),
        builtin!("n.s", Self::print_stack_n),
        builtin!("type", Self::type_str),
        builtin!("base", Self::base_word),
        builtin!("decimal", Self::decimal),
        builtin!("hex", Self::hex),
        builtin!("strlen", Self::strlen),
        builtin!("strcpy", Self::strcpy),
        builtin!("strcat", Self::strcat),
        builtin!("strcmp", Self::strcmp),
        //
        // streams and the host system
        //
        builtin!("stdin", Self::stdin),
        builtin!("stdout", Self::stdout),
        builtin!("stderr", Self::stderr),
        builtin!(">output", Self::to_output),
        builtin!("output>", Self::from_output),
        builtin!(">input", Self::to_input),
        builtin!("input>", Self::from_input),
        builtin!("read-line", Self::read_line),
        builtin!("read", Self::read),
        builtin!("write", Self::write),
        builtin!("open", Self::open),
        builtin!("close", Self::close),
        builtin!("unlink", Self::unlink),
        builtin!("load", Self::load),
        builtin!("add-load-path", Self::add_load_path_word),
        builtin!("sigint-ignore", Self::sigint_ignore),
        builtin!("getpid", Self::getpid),
        builtin!("sleep", Self::sleep),
        builtin!("tcp-connect", Self::tcp_connect),
        builtin!("system", Self::system),
        builtin!("getenv", Self::getenv),
        builtin!("setenv", Self::setenv),
        builtin!("prematch", Self::prematch),
        builtin!("postmatch", Self::postmatch),
        builtin!("match@", Self::match_fetch),
        //
        // floats
        //
        builtin!("f+", Self::float_add),
        builtin!("f-", Self::float_minus),
        builtin!("f*", Self::float_mul),
        builtin!("f/", Self::float_div),
        builtin!("fmod", Self::float_modu),
        builtin!("fnegate", Self::float_negate),
        builtin!("fabs", Self::float_abs),
        builtin!("fmin", Self::float_min),
        builtin!("fmax", Self::float_max),
        builtin!("f=", Self::float_equal),
        builtin!("f<>", Self::float_not_equal),
        builtin!("f<", Self::float_less),
        builtin!("f>", Self::float_greater),
        builtin!("f<=", Self::float_less_equal),
        builtin!("f>=", Self::float_greater_equal),
        builtin!("f.", Self::float_pop_print),
        builtin!("fdup", Self::float_dup),
        builtin!("fdrop", Self::float_drop),
        builtin!("fswap", Self::float_swap),
        builtin!("fover", Self::float_over),
        builtin!("float", Self::float_from_int),
        builtin!("fix", Self::float_fix),
        builtin!("sqrt", Self::float_sqrt),
        builtin!("sin", Self::float_sin),
        builtin!("cos", Self::float_cos),
        builtin!("tan", Self::float_tan),
        builtin!("atan", Self::float_atan),
        builtin!("atan2", Self::float_atan2),
        builtin!("exp", Self::float_exp),
        builtin!("log", Self::float_log),
        builtin!("pow", Self::float_pow),
        builtin!("f@", Self::float_load),
        builtin!("f!", Self::float_store),
        builtin!("fconstant", Self::fconstant),
        builtin!("fvariable", Self::fvariable),
        builtin!("f.s", Self::float_print_stack),
        builtin!("nf.s", Self::float_print_stack_n),
        //
        // structs and native libraries
        //
        builtin!("struct:", Self::struct_begin),
        builtin!("field:", Self::struct_field),
        builtin!("end-struct", Self::struct_end),
        builtin!("ffi-load", Self::ffi_load_word),
        builtin!("ffi-include", Self::ffi_include),
        builtin!("ffi-bind", Self::ffi_bind),
        //
        // diagnostics
        //
        builtin!("trace", Self::trace_word),
        builtin!("walkback", Self::walkback_word),
        builtin!("memstat", Self::memstat_word),
        builtin!("words", Self::words),
    ];

    // Pop two cells, `(a, b)` where `b` was on top.
    #[inline]
    fn pop2(&mut self) -> Result<(Cell, Cell), Error> {
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        Ok((a, b))
    }

    #[inline]
    fn binop(&mut self, f: impl FnOnce(Cell, Cell) -> Cell) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        self.data_stack.push(f(a, b))?;
        Ok(())
    }

    #[inline]
    fn unop(&mut self, f: impl FnOnce(Cell) -> Cell) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(f(a))?;
        Ok(())
    }

    //
    // compiler internals
    //

    pub fn lit(&mut self) -> Result<(), Error> {
        let val = self.operand()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn flit(&mut self) -> Result<(), Error> {
        let bits = self.operand()?;
        self.float_stack.push(f64::from_bits(bits as u64))?;
        Ok(())
    }

    pub fn branch(&mut self) -> Result<(), Error> {
        let target = self.operand()?;
        self.jump(target)
    }

    pub fn qbranch(&mut self) -> Result<(), Error> {
        let target = self.operand()?;
        if self.data_stack.try_pop()? == FALSE {
            self.jump(target)?;
        }
        Ok(())
    }

    /// ( limit index -- ) ( R: -- limit index )
    pub fn xdo(&mut self) -> Result<(), Error> {
        let (limit, index) = self.pop2()?;
        self.return_stack.push(limit)?;
        self.return_stack.push(index)?;
        Ok(())
    }

    /// Like `(do)`, but skips the loop when there is nothing to do.
    pub fn xqdo(&mut self) -> Result<(), Error> {
        let target = self.operand()?;
        let (limit, index) = self.pop2()?;
        if limit == index {
            return self.jump(target);
        }
        self.return_stack.push(limit)?;
        self.return_stack.push(index)?;
        Ok(())
    }

    pub fn xloop(&mut self) -> Result<(), Error> {
        let target = self.operand()?;
        let index = self.return_stack.try_peek()?.wrapping_add(1);
        let limit = self.return_stack.try_peek_back_n(1)?;
        self.loop_step(target, index, index < limit)
    }

    pub fn xploop(&mut self) -> Result<(), Error> {
        let target = self.operand()?;
        let step = self.data_stack.try_pop()?;
        let index = self.return_stack.try_peek()?.wrapping_add(step);
        let limit = self.return_stack.try_peek_back_n(1)?;
        let more = if step >= 0 { index < limit } else { index >= limit };
        self.loop_step(target, index, more)
    }

    fn loop_step(&mut self, target: Cell, index: Cell, more: bool) -> Result<(), Error> {
        if more {
            self.return_stack.overwrite_back_n(0, index)?;
            self.jump(target)
        } else {
            self.return_stack.try_pop()?;
            self.return_stack.try_pop()?;
            Ok(())
        }
    }

    // Skip an inline string, returning its address and length.
    fn inline_str(&mut self) -> Result<(usize, usize), Error> {
        let len = cell_to_usize(self.operand()?)?;
        let addr = self.ip.ok_or(Error::NotInDefinition)?;
        self.ip = Some(addr + cell_align(len + 1));
        Ok((addr, len))
    }

    pub fn strlit(&mut self) -> Result<(), Error> {
        let (addr, _) = self.inline_str()?;
        self.data_stack.push(addr as Cell)?;
        Ok(())
    }

    pub fn slit(&mut self) -> Result<(), Error> {
        let (addr, len) = self.inline_str()?;
        self.data_stack.push(addr as Cell)?;
        self.data_stack.push(len as Cell)?;
        Ok(())
    }

    pub fn dotstr(&mut self) -> Result<(), Error> {
        let (addr, len) = self.inline_str()?;
        let text = self.heap.bytes(addr, len)?.to_vec();
        self.write_out(&text)
    }

    /// Run time of `does>`: the rest of the defining word becomes the
    /// behavior of the word it just created.
    pub fn does_runtime(&mut self) -> Result<(), Error> {
        let code = self.ip.ok_or(Error::NotInDefinition)?;
        // `create` is still waiting for its name
        if let Some(Pending::Define(DefKind::Create { data, .. })) = self.pending {
            self.pending = Some(Pending::Define(DefKind::Create {
                data,
                code: Some(code),
            }));
            return self.exit();
        }
        let latest = self.dict.latest_mut().ok_or(Error::NotInDefinition)?;
        latest.kind = match latest.kind {
            EntryKind::Create { data } | EntryKind::Does { data, .. } => {
                EntryKind::Does { data, code }
            }
            _ => return Err(Error::NotInDefinition),
        };
        self.exit()
    }

    //
    // stack
    //

    pub fn dup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn ds_drop(&mut self) -> Result<(), Error> {
        let _a = self.data_stack.try_pop()?;
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        self.data_stack.push(b)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_peek_back_n(1)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    pub fn rot(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.roll(2)?)
    }

    pub fn neg_rot(&mut self) -> Result<(), Error> {
        self.data_stack.roll(2)?;
        Ok(self.data_stack.roll(2)?)
    }

    pub fn nip(&mut self) -> Result<(), Error> {
        let (_, b) = self.pop2()?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn tuck(&mut self) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        self.data_stack.push(b)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn pick(&mut self) -> Result<(), Error> {
        let n = cell_to_usize(self.data_stack.try_pop()?)?;
        let val = self.data_stack.try_peek_back_n(n)?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn roll(&mut self) -> Result<(), Error> {
        let n = cell_to_usize(self.data_stack.try_pop()?)?;
        Ok(self.data_stack.roll(n)?)
    }

    pub fn qdup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        if val != 0 {
            self.data_stack.push(val)?;
        }
        Ok(())
    }

    pub fn dup_2(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_peek_back_n(1)?;
        let b = self.data_stack.try_peek()?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn ds_drop_2(&mut self) -> Result<(), Error> {
        let _ = self.pop2()?;
        Ok(())
    }

    pub fn swap_2(&mut self) -> Result<(), Error> {
        self.data_stack.roll(3)?;
        Ok(self.data_stack.roll(3)?)
    }

    pub fn over_2(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_peek_back_n(3)?;
        let b = self.data_stack.try_peek_back_n(2)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn depth(&mut self) -> Result<(), Error> {
        let depth = self.data_stack.depth() as Cell;
        self.data_stack.push(depth)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), Error> {
        self.data_stack.clear();
        Ok(())
    }

    //
    // arithmetic and logic
    //

    pub fn add(&mut self) -> Result<(), Error> {
        self.binop(Cell::wrapping_add)
    }

    pub fn minus(&mut self) -> Result<(), Error> {
        self.binop(Cell::wrapping_sub)
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        self.binop(Cell::wrapping_mul)
    }

    pub fn div(&mut self) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        if b == 0 {
            return Err(Error::DivideByZero);
        }
        self.data_stack.push(a.wrapping_div(b))?;
        Ok(())
    }

    pub fn modu(&mut self) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        if b == 0 {
            return Err(Error::DivideByZero);
        }
        self.data_stack.push(a.wrapping_rem(b))?;
        Ok(())
    }

    /// ( a b -- rem quot )
    pub fn div_mod(&mut self) -> Result<(), Error> {
        let (a, b) = self.pop2()?;
        if b == 0 {
            return Err(Error::DivideByZero);
        }
        self.data_stack.push(a.wrapping_rem(b))?;
        self.data_stack.push(a.wrapping_div(b))?;
        Ok(())
    }

    pub fn negate(&mut self) -> Result<(), Error> {
        self.unop(Cell::wrapping_neg)
    }

    pub fn abs(&mut self) -> Result<(), Error> {
        self.unop(Cell::wrapping_abs)
    }

    pub fn min(&mut self) -> Result<(), Error> {
        self.binop(Cell::min)
    }

    pub fn max(&mut self) -> Result<(), Error> {
        self.binop(Cell::max)
    }

    pub fn one_plus(&mut self) -> Result<(), Error> {
        self.unop(|a| a.wrapping_add(1))
    }

    pub fn one_minus(&mut self) -> Result<(), Error> {
        self.unop(|a| a.wrapping_sub(1))
    }

    pub fn two_mul(&mut self) -> Result<(), Error> {
        self.unop(|a| a.wrapping_shl(1))
    }

    pub fn two_div(&mut self) -> Result<(), Error> {
        self.unop(|a| a >> 1)
    }

    pub fn logical_and(&mut self) -> Result<(), Error> {
        self.binop(|a, b| a & b)
    }

    pub fn logical_or(&mut self) -> Result<(), Error> {
        self.binop(|a, b| a | b)
    }

    pub fn logical_xor(&mut self) -> Result<(), Error> {
        self.binop(|a, b| a ^ b)
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        self.unop(|a| !a)
    }

    pub fn lshift(&mut self) -> Result<(), Error> {
        self.binop(|a, n| {
            u32::try_from(n)
                .ok()
                .and_then(|n| a.checked_shl(n))
                .unwrap_or(0)
        })
    }

    /// Logical (unsigned) shift.
    pub fn rshift(&mut self) -> Result<(), Error> {
        self.binop(|a, n| {
            u32::try_from(n)
                .ok()
                .and_then(|n| (a as u64).checked_shr(n))
                .map_or(0, |v| v as Cell)
        })
    }

    //
    // comparison
    //

    pub fn equal(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a == b))
    }

    pub fn not_equal(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a != b))
    }

    pub fn less(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a < b))
    }

    pub fn greater(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a > b))
    }

    pub fn less_equal(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a <= b))
    }

    pub fn greater_equal(&mut self) -> Result<(), Error> {
        self.binop(|a, b| flag(a >= b))
    }

    pub fn zero_equal(&mut self) -> Result<(), Error> {
        self.unop(|a| flag(a == 0))
    }

    pub fn zero_not_equal(&mut self) -> Result<(), Error> {
        self.unop(|a| flag(a != 0))
    }

    pub fn zero_less(&mut self) -> Result<(), Error> {
        self.unop(|a| flag(a < 0))
    }

    pub fn zero_greater(&mut self) -> Result<(), Error> {
        self.unop(|a| flag(a > 0))
    }

    pub fn push_true(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.push(TRUE)?)
    }

    pub fn push_false(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.push(FALSE)?)
    }

    //
    // memory
    //

    pub fn var_load(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let addr = self.addr(addr, CELL)?;
        let val = self.heap.fetch(addr)?;
        self.data_stack.push(val)?;
        Ok(())
    }

    /// ( val addr -- )
    pub fn var_store(&mut self) -> Result<(), Error> {
        let (val, addr) = self.pop2()?;
        let addr = self.addr(addr, CELL)?;
        self.heap.store(addr, val)?;
        Ok(())
    }

    pub fn byte_load(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let addr = self.addr(addr, 1)?;
        let val = self.heap.fetch_u8(addr)?;
        self.data_stack.push(Cell::from(val))?;
        Ok(())
    }

    pub fn byte_store(&mut self) -> Result<(), Error> {
        let (val, addr) = self.pop2()?;
        let addr = self.addr(addr, 1)?;
        self.heap.store_u8(addr, val as u8)?;
        Ok(())
    }

    pub fn plus_store(&mut self) -> Result<(), Error> {
        let (n, addr) = self.pop2()?;
        let addr = self.addr(addr, CELL)?;
        let val = self.heap.fetch(addr)?;
        self.heap.store(addr, val.wrapping_add(n))?;
        Ok(())
    }

    pub fn here(&mut self) -> Result<(), Error> {
        let here = self.heap.here() as Cell;
        self.data_stack.push(here)?;
        Ok(())
    }

    pub fn allot(&mut self) -> Result<(), Error> {
        let n = self.data_stack.try_pop()?;
        let n = isize::try_from(n).replace_err(HeapError::Overflow)?;
        self.heap.allot(n)?;
        Ok(())
    }

    pub fn comma(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.heap.bump_write(val)?;
        Ok(())
    }

    pub fn byte_comma(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        let addr = self.heap.bump_u8s(1)?;
        self.heap.store_u8(addr, val as u8)?;
        Ok(())
    }

    pub fn cells(&mut self) -> Result<(), Error> {
        self.unop(|n| n.wrapping_mul(CELL as Cell))
    }

    pub fn cell_plus(&mut self) -> Result<(), Error> {
        self.unop(|n| n.wrapping_add(CELL as Cell))
    }

    pub fn align_heap(&mut self) -> Result<(), Error> {
        Ok(self.heap.align()?)
    }

    /// ( addr len byte -- )
    pub fn fill(&mut self) -> Result<(), Error> {
        let byte = self.data_stack.try_pop()?;
        let (addr, len) = self.pop2()?;
        let len = cell_to_usize(len)?;
        let addr = self.addr(addr, len)?;
        self.heap.bytes_mut(addr, len)?.fill(byte as u8);
        Ok(())
    }

    //
    // return stack and loops
    //

    pub fn to_rs(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.return_stack.push(val)?;
        Ok(())
    }

    pub fn from_rs(&mut self) -> Result<(), Error> {
        let val = self.return_stack.try_pop()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn rs_fetch(&mut self) -> Result<(), Error> {
        let val = self.return_stack.try_peek()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn loop_i(&mut self) -> Result<(), Error> {
        self.rs_fetch()
    }

    pub fn loop_j(&mut self) -> Result<(), Error> {
        let val = self.return_stack.try_peek_back_n(2)?;
        self.data_stack.push(val)?;
        Ok(())
    }

    /// Make the innermost loop end at its next `loop`.
    pub fn leave(&mut self) -> Result<(), Error> {
        let limit = self.return_stack.try_peek_back_n(1)?;
        self.return_stack.overwrite_back_n(0, limit)?;
        Ok(())
    }

    //
    // diagnostics
    //

    pub fn trace_word(&mut self) -> Result<(), Error> {
        self.trace = self.data_stack.try_pop()? != FALSE;
        Ok(())
    }

    pub fn walkback_word(&mut self) -> Result<(), Error> {
        let enabled = self.data_stack.try_pop()? != FALSE;
        self.walkback.set_enabled(enabled);
        Ok(())
    }

    pub fn memstat_word(&mut self) -> Result<(), Error> {
        let stats = self.memstat();
        let rows = [
            ("stack", stats.stack),
            ("return stack", stats.return_stack),
            ("float stack", stats.float_stack),
            ("heap", stats.heap),
            ("dictionary", stats.dictionary),
        ];
        let mut out = String::from("region          used     max  capacity\n");
        for (name, r) in rows {
            out.push_str(&format!(
                "{name:<12} {:>7} {:>7} {:>9}\n",
                r.used, r.max, r.capacity
            ));
        }
        self.print(&out)
    }

    pub fn words(&mut self) -> Result<(), Error> {
        let names = self
            .dict
            .visible()
            .map(|e| e.name.as_str())
            .filter(|name| !name.starts_with('('))
            .collect::<Vec<_>>()
            .join(" ");
        self.print(&names)?;
        self.print("\n")
    }
}

#[cfg(test)]
pub mod test {
    use crate::{
        config::Params, dictionary::WordFlags, heap::HeapError, testutil::all_runtest, Error,
        Permissions, Pez,
    };

    #[test]
    fn builtin_names_are_unique() {
        let names = Pez::<()>::FULL_BUILTINS
            .iter()
            .map(|b| b.name)
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(names.len(), Pez::<()>::FULL_BUILTINS.len());
        assert!(Pez::<()>::FULL_BUILTINS
            .iter()
            .filter(|b| b.flags.contains(WordFlags::IMMEDIATE))
            .all(|b| b.name != "exit"));
    }

    #[test]
    fn memory_access_is_checked() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        pez.eval("here").unwrap();
        let here = pez.pop().unwrap();
        assert_eq!(
            pez.eval(&format!("{here} @")),
            Err(Error::Heap(HeapError::BadPointer))
        );
        assert_eq!(pez.eval("-8 @"), Err(Error::Heap(HeapError::BadPointer)));

        let mut pez = Pez::new(&Params::default(), Permissions::POINTERS, ()).unwrap();
        pez.eval(&format!("{here} @ .")).unwrap();
        assert_eq!(pez.output.as_str(), "0 ");
    }

    #[test]
    fn core_words() {
        all_runtest(
            r#"
            ( stack and arithmetic )
            > 1 2 3 rot .s
            < <3> 2 3 1
            > clear 1 2 3 -rot .s
            < <3> 3 1 2
            > clear 1 2 3 4 2swap .s
            < <4> 3 4 1 2
            > clear 7 2 /mod . .
            < 3 1
            > -7 abs 3 max .
            < 7
            > 1 4 lshift . -1 60 rshift .
            < 16 15
            > 3 4 < . 4 3 < . 0 0= .
            < -1 0 -1
            x 1 0 mod
            x drop

            ( memory )
            > variable v 5 v ! 3 v +! v @ .
            < 8
            > create buf 4 cells allot 1 buf ! 2 buf cell+ ! buf cell+ @ .
            < 2
            > create bytes 3 allot bytes 3 65 fill bytes c@ .
            < 65

            ( loops )
            > : evens 10 0 do i . 2 +loop ;
            > evens
            < 0 2 4 6 8
            > : down 0 5 do i . -1 +loop ;
            > down
            < 5 4 3 2 1 0
            > : nothing 0 0 ?do 42 emit loop ;
            > nothing
            <
            > : grid 2 0 do 3 0 do j i * . loop loop ;
            > grid
            < 0 0 0 0 1 2
            > : find5 10 0 do i 5 = if i . leave then loop ;
            > find5
            < 5
            > : w 0 begin dup 3 < while 1+ repeat . ;
            > w
            < 3
            > : u 0 begin 1+ dup 4 = until . ;
            > u
            < 4
            "#,
        );
    }
}
