use crate::{
    dictionary::{Dictionary, EntryKind},
    permissions::Permissions,
    word::{cell_to_usize, Cell, WordId, CELL},
    Error, Pez,
};

use super::NO_RETURN;

/// The chain of colon words currently executing, used in error reports.
pub(crate) struct Walkback {
    enabled: bool,
    frames: Vec<WordId>,
    last: Vec<String>,
}

impl Walkback {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            frames: Vec::new(),
            last: Vec::new(),
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.frames.clear();
    }

    fn push(&mut self, id: WordId) {
        if self.enabled {
            self.frames.push(id);
        }
    }

    fn replace_top(&mut self, id: WordId) {
        if !self.enabled {
            return;
        }
        match self.frames.last_mut() {
            Some(top) => *top = id,
            None => self.frames.push(id),
        }
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn reset(&mut self) {
        self.frames.clear();
    }

    /// Remember the active words, innermost first.
    pub(crate) fn capture<T: 'static>(&mut self, dict: &Dictionary<T>, cur: Option<WordId>) {
        self.last.clear();
        if !self.enabled {
            return;
        }
        let names = cur
            .into_iter()
            .chain(self.frames.iter().rev().copied())
            .filter_map(|id| dict.get(id))
            .map(|e| e.name.as_str().to_string());
        self.last.extend(names);
        self.last.dedup();
        self.frames.clear();
    }

    pub(crate) fn last(&self) -> &[String] {
        &self.last
    }
}

impl<T: 'static> Pez<T> {
    /// Execute `id` to completion, as the interpreter does for words typed
    /// at the prompt.
    pub(crate) fn run(&mut self, id: WordId) -> Result<(), Error> {
        let saved = self.ip.take();
        let res = self.call(id).and_then(|()| self.inner_loop());
        self.ip = saved;
        res
    }

    fn inner_loop(&mut self) -> Result<(), Error> {
        while let Some(ip) = self.ip {
            self.poll_break()?;
            let xt = WordId::from_cell(self.heap.fetch(ip)?)?;
            self.ip = Some(ip + CELL);
            self.call(xt)?;
        }
        Ok(())
    }

    fn poll_break(&mut self) -> Result<(), Error> {
        if self.brk.take() && !self.ignore_break {
            tracing::debug!("break requested");
            return Err(Error::Break);
        }
        Ok(())
    }

    /// Execute one word. Colon words only set up their frame; the inner
    /// loop runs their body.
    pub(crate) fn call(&mut self, id: WordId) -> Result<(), Error> {
        let entry = self
            .dict
            .get(id)
            .ok_or_else(|| Error::Undefined(format!("{id:?}")))?;
        let kind = entry.kind;
        if self.trace {
            tracing::trace!(
                word = entry.name.as_str(),
                stack = ?self.data_stack.as_slice(),
                "exec"
            );
        }
        self.cur_word = Some(id);

        match kind {
            EntryKind::Builtin(func) => func(self),
            EntryKind::Colon { body } => self.enter(id, body),
            EntryKind::Variable { addr } => Ok(self.data_stack.push(addr as Cell)?),
            EntryKind::Constant { value } => Ok(self.data_stack.push(value)?),
            EntryKind::FConstant { value } => Ok(self.float_stack.push(value)?),
            EntryKind::Create { data } => Ok(self.data_stack.push(data as Cell)?),
            EntryKind::Does { data, code } => {
                self.data_stack.push(data as Cell)?;
                self.enter(id, code)
            }
            EntryKind::Field { offset } => {
                let base = self.data_stack.try_pop()?;
                Ok(self.data_stack.push(base.wrapping_add(offset))?)
            }
            EntryKind::Native {
                lib,
                symbol,
                arity,
                returns,
            } => self.call_native(lib, symbol, arity, returns),
        }
    }

    fn enter(&mut self, id: WordId, body: usize) -> Result<(), Error> {
        let exit = self.internals.exit.to_cell();
        let tail = match self.ip {
            Some(ip) => self.heap.fetch(ip).map_or(false, |next| next == exit),
            None => false,
        };

        if tail {
            // Our caller's frame is done, reuse its return address
            self.tail_call_pending = true;
            self.walkback.replace_top(id);
        } else {
            let ret = self.ip.map_or(NO_RETURN, |ip| ip as Cell);
            self.return_stack.push(ret)?;
            self.walkback.push(id);
        }
        self.ip = Some(body);
        Ok(())
    }

    /// Return from the current colon word.
    pub(crate) fn exit(&mut self) -> Result<(), Error> {
        let ret = self.return_stack.try_pop()?;
        self.walkback.pop();
        self.tail_call_pending = false;
        self.ip = if ret == NO_RETURN {
            None
        } else {
            Some(cell_to_usize(ret)?)
        };
        Ok(())
    }

    fn call_native(
        &mut self,
        lib: usize,
        symbol: usize,
        arity: usize,
        returns: bool,
    ) -> Result<(), Error> {
        self.require(Permissions::FFI)?;
        if arity > 0 {
            self.data_stack.try_peek_back_n(arity - 1)?;
        }
        let mut args = vec![0; arity];
        for arg in args.iter_mut().rev() {
            *arg = self.data_stack.try_pop()?;
        }
        let ret = self
            .loader
            .call(lib, symbol, &args, self.heap.as_mut_slice())?;
        if returns {
            self.data_stack.push(ret)?;
        }
        Ok(())
    }

    /// The inline operand after the current instruction.
    pub(crate) fn operand(&mut self) -> Result<Cell, Error> {
        let ip = self.ip.ok_or(Error::NotInDefinition)?;
        let val = self.heap.fetch(ip)?;
        self.ip = Some(ip + CELL);
        Ok(val)
    }

    pub(crate) fn jump(&mut self, target: Cell) -> Result<(), Error> {
        self.ip = Some(cell_to_usize(target)?);
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use crate::{config::Params, Error, Permissions, Pez};

    fn pez() -> Pez<()> {
        Pez::new(&Params::default(), Permissions::empty(), ()).unwrap()
    }

    #[test]
    fn tail_calls_do_not_grow_the_return_stack() {
        let params = Params {
            return_stack_elems: 8,
            ..Params::default()
        };
        let mut pez = Pez::new(&params, Permissions::empty(), ()).unwrap();
        pez.eval(": down dup 0> if 1- recurse then ;").unwrap();
        pez.eval("1000 down .").unwrap();
        assert_eq!(pez.output.as_str(), "0 ");
        assert!(pez.return_stack.high_water() <= 2);

        // Not a tail call, so this one runs out
        pez.eval(": deep dup 0> if 1- recurse 0 drop then ;").unwrap();
        assert!(pez.eval("1000 deep").is_err());
    }

    #[test]
    fn walkback_names_the_failing_words() {
        let mut pez = pez();
        pez.eval(": inner 1 0 / ;").unwrap();
        pez.eval(": outer inner 5 ;").unwrap();
        assert_eq!(pez.eval("outer"), Err(Error::DivideByZero));
        assert_eq!(pez.last_walkback(), ["/", "inner", "outer"]);

        pez.eval("false walkback").unwrap();
        assert!(pez.eval("outer").is_err());
        assert!(pez.last_walkback().is_empty());
    }

    #[test]
    fn break_stops_a_loop() {
        let mut pez = pez();
        pez.eval(": forever begin again ;").unwrap();
        let handle = pez.break_handle();
        handle.request();
        assert_eq!(pez.eval("forever"), Err(Error::Break));
        assert!(!handle.is_requested());
        pez.eval("1 .").unwrap();
    }
}
