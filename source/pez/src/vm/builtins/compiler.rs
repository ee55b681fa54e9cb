use crate::{
    dictionary::WordFlags,
    vm::{DefKind, Pending},
    word::{Cell, WordId},
    Error, Mode, Pez,
};

use super::flag;

impl<T: 'static> Pez<T> {
    // Branch targets are absolute heap addresses. Forward references leave
    // the address of their operand cell on the data stack until resolved.

    fn here_cell(&self) -> Cell {
        self.heap.here() as Cell
    }

    // Compile `xt` followed by an empty operand, returning the operand's
    // address.
    fn compile_forward(&mut self, xt: WordId) -> Result<Cell, Error> {
        self.compile_xt(xt)?;
        let fixup = self.here_cell();
        self.compile_cell(0)?;
        Ok(fixup)
    }

    fn resolve_forward(&mut self, fixup: Cell) -> Result<(), Error> {
        let here = self.here_cell();
        let addr = self.addr(fixup, crate::word::CELL)?;
        self.heap.store(addr, here)?;
        Ok(())
    }

    pub fn cf_if(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let fixup = self.compile_forward(self.internals.qbranch)?;
        self.data_stack.push(fixup)?;
        Ok(())
    }

    pub fn cf_else(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let if_fixup = self.data_stack.try_pop()?;
        let else_fixup = self.compile_forward(self.internals.branch)?;
        self.resolve_forward(if_fixup)?;
        self.data_stack.push(else_fixup)?;
        Ok(())
    }

    pub fn cf_then(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let fixup = self.data_stack.try_pop()?;
        self.resolve_forward(fixup)
    }

    pub fn cf_begin(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let here = self.here_cell();
        self.data_stack.push(here)?;
        Ok(())
    }

    pub fn cf_until(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let dest = self.data_stack.try_pop()?;
        self.compile_xt(self.internals.qbranch)?;
        self.compile_cell(dest)
    }

    pub fn cf_again(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let dest = self.data_stack.try_pop()?;
        self.compile_xt(self.internals.branch)?;
        self.compile_cell(dest)
    }

    /// ( dest -- dest fixup )
    pub fn cf_while(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let fixup = self.compile_forward(self.internals.qbranch)?;
        self.data_stack.push(fixup)?;
        Ok(())
    }

    pub fn cf_repeat(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let fixup = self.data_stack.try_pop()?;
        let dest = self.data_stack.try_pop()?;
        self.compile_xt(self.internals.branch)?;
        self.compile_cell(dest)?;
        self.resolve_forward(fixup)
    }

    /// ( -- fixup dest ). `do` has no exit to patch, so its fixup is 0.
    pub fn cf_do(&mut self) -> Result<(), Error> {
        self.compiling()?;
        self.compile_xt(self.internals.xdo)?;
        self.data_stack.push(0)?;
        let here = self.here_cell();
        self.data_stack.push(here)?;
        Ok(())
    }

    pub fn cf_qdo(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let fixup = self.compile_forward(self.internals.xqdo)?;
        self.data_stack.push(fixup)?;
        let here = self.here_cell();
        self.data_stack.push(here)?;
        Ok(())
    }

    pub fn cf_loop(&mut self) -> Result<(), Error> {
        self.close_loop(self.internals.xloop)
    }

    pub fn cf_ploop(&mut self) -> Result<(), Error> {
        self.close_loop(self.internals.xploop)
    }

    fn close_loop(&mut self, xt: WordId) -> Result<(), Error> {
        self.compiling()?;
        let dest = self.data_stack.try_pop()?;
        let fixup = self.data_stack.try_pop()?;
        self.compile_xt(xt)?;
        self.compile_cell(dest)?;
        if fixup != 0 {
            self.resolve_forward(fixup)?;
        }
        Ok(())
    }

    pub fn recurse(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let id = self
            .create_word
            .as_ref()
            .map(|def| def.id)
            .ok_or(Error::NotInDefinition)?;
        self.compile_xt(id)
    }

    pub fn does(&mut self) -> Result<(), Error> {
        self.compiling()?;
        self.compile_xt(self.internals.does)
    }

    pub fn colon(&mut self) -> Result<(), Error> {
        self.with_next_token(Pending::Define(DefKind::Colon))
    }

    pub fn semicolon(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let def = self.create_word.as_ref().ok_or(Error::NotInDefinition)?;
        // An open `if`, `begin` or `do` still has its fixup on the stack
        if self.data_stack.depth() != def.mark.stack {
            return Err(Error::NotInDefinition);
        }
        let def = self.create_word.take().ok_or(Error::NotInDefinition)?;
        self.compile_xt(self.internals.exit)?;
        if let Some(entry) = self.dict.get_mut(def.id) {
            entry.flags.remove(WordFlags::HIDDEN);
        }
        self.mode = Mode::Run;
        Ok(())
    }

    pub fn immediate(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest_mut().ok_or(Error::NotInDefinition)?;
        latest.flags.insert(WordFlags::IMMEDIATE);
        Ok(())
    }

    pub fn left_bracket(&mut self) -> Result<(), Error> {
        self.compiling()?;
        self.mode = Mode::Run;
        Ok(())
    }

    pub fn right_bracket(&mut self) -> Result<(), Error> {
        if self.create_word.is_none() {
            return Err(Error::NotInDefinition);
        }
        self.mode = Mode::Compile;
        Ok(())
    }

    /// `'` pushes the execution token of the next word. Inside a definition
    /// it compiles it as a literal instead.
    pub fn tick(&mut self) -> Result<(), Error> {
        let pending = match self.mode {
            Mode::Compile => Pending::CompileTick,
            Mode::Run => Pending::Tick,
        };
        self.with_next_token(pending)
    }

    pub fn bracket_tick(&mut self) -> Result<(), Error> {
        self.compiling()?;
        self.with_next_token(Pending::CompileTick)
    }

    pub fn bracket_compile(&mut self) -> Result<(), Error> {
        self.compiling()?;
        self.with_next_token(Pending::BracketCompile)
    }

    pub fn literal(&mut self) -> Result<(), Error> {
        self.compiling()?;
        let val = self.data_stack.try_pop()?;
        self.compile_lit(val)
    }

    pub fn execute(&mut self) -> Result<(), Error> {
        let xt = self.data_stack.try_pop()?;
        let id = WordId::from_cell(xt)?;
        self.call(id)
    }

    pub fn create(&mut self) -> Result<(), Error> {
        self.heap.align()?;
        let data = self.heap.here();
        self.with_next_token(Pending::Define(DefKind::Create { data, code: None }))
    }

    pub fn variable(&mut self) -> Result<(), Error> {
        self.with_next_token(Pending::Define(DefKind::Variable))
    }

    pub fn constant(&mut self) -> Result<(), Error> {
        let value = self.data_stack.try_pop()?;
        self.with_next_token(Pending::Define(DefKind::Constant(value)))
    }

    pub fn forget_word(&mut self) -> Result<(), Error> {
        self.with_next_token(Pending::Forget)
    }

    pub fn is_compiling_word(&mut self) -> Result<(), Error> {
        let compiling = self.mode == Mode::Compile;
        self.data_stack.push(flag(compiling))?;
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use crate::{config::Params, testutil::all_runtest, Error, Permissions, Pez};

    #[test]
    fn defining_words() {
        all_runtest(
            r#"
            > : const create , does> @ ;
            > 7 const seven seven .
            < 7
            > : counter create 0 , does> dup @ 1+ dup rot ! ;
            > counter ticks ticks ticks ticks . . .
            < 3 2 1
            > : sq dup * ;
            > 5 ' sq execute .
            < 25
            > : fact dup 1 > if dup 1- recurse * then ;
            > 6 fact .
            < 720
            > : five [ 2 3 + ] literal ;
            > five .
            < 5
            > : sign dup 0< if drop -1 else 0> if 1 else 0 then then ;
            > -4 sign . 0 sign . 9 sign .
            < -1 0 1
            > : ticker ['] five ;
            > ticker execute .
            < 5
            > : [five] five ; immediate
            > : seven2 [five] literal 2 + ;
            > seven2 .
            < 7
            "#,
        );
    }

    #[test]
    fn defining_word_names_can_come_later() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        pez.eval(": const create , does> @ ;").unwrap();
        pez.eval("7 const seven seven .").unwrap();
        pez.eval("8 const").unwrap();
        assert!(pez.anticipating_token());
        pez.eval("eight eight . seven .").unwrap();
        assert_eq!(pez.output.as_str(), "7 8 7 ");
        pez.output.clear();

        pez.eval("create").unwrap();
        pez.eval("plain 5 , plain @ .").unwrap();
        assert_eq!(pez.output.as_str(), "5 ");
    }

    #[test]
    fn unbalanced_control_flow_is_rejected() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        assert_eq!(pez.eval(": x if ;"), Err(Error::NotInDefinition));
        assert!(pez.lookup("x").is_none());
        assert!(!pez.is_compiling());
        assert_eq!(pez.eval(": y begin 1 ;"), Err(Error::NotInDefinition));
        assert_eq!(pez.eval(": z 3 0 do ;"), Err(Error::NotInDefinition));

        pez.eval("1 2 : ok 3 ;").unwrap();
        assert_eq!(pez.data_stack.as_slice(), &[1, 2]);
        assert!(pez.lookup("ok").is_some());
    }

    #[test]
    fn forget_releases_words_and_heap() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        pez.eval(": keep 1 ;").unwrap();
        pez.eval("here").unwrap();
        let before = pez.pop().unwrap();
        pez.eval(": gone 2 ; variable also").unwrap();
        pez.eval("forget gone").unwrap();
        assert!(pez.lookup("gone").is_none());
        assert!(pez.lookup("also").is_none());
        assert!(pez.lookup("keep").is_some());
        pez.eval("here").unwrap();
        assert_eq!(pez.pop().unwrap(), before);

        assert_eq!(pez.eval("forget dup"), Err(Error::ForgetProtected));
    }

    #[test]
    fn words_are_hidden_until_finished() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        assert_eq!(
            pez.eval(": self self ;"),
            Err(Error::Undefined("self".into()))
        );
        pez.eval(": dup dup dup ;").unwrap();
        pez.eval("1 dup .s").unwrap();
        assert_eq!(pez.output.as_str(), "<3> 1 1 1 ");
    }
}
