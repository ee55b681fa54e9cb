use crate::{
    dictionary::EntryKind,
    loader::StructDesc,
    permissions::Permissions,
    vm::{DefKind, Pending},
    word::{cell_to_usize, Cell},
    Error, Pez,
};

use super::FALSE;

impl<T: 'static> Pez<T> {
    /// ( name -- lib )
    pub fn ffi_load_word(&mut self) -> Result<(), Error> {
        self.require(Permissions::FFI)?;
        let name = self.data_stack.try_pop()?;
        let name = self.string_at(name)?;
        let lib = self.ffi_load(&name)?;
        self.data_stack.push(lib as Cell)?;
        Ok(())
    }

    /// ( lib header -- ) Make `header`'s declarations visible to later
    /// `ffi-bind`s on `lib`.
    pub fn ffi_include(&mut self) -> Result<(), Error> {
        self.require(Permissions::FFI)?;
        let header = self.data_stack.try_pop()?;
        let lib = cell_to_usize(self.data_stack.try_pop()?)?;
        let header = self.string_at(header)?;
        let lib = self.loader.lib_mut(lib)?;
        if !lib.includes.contains(&header) {
            lib.includes.push(header);
        }
        Ok(())
    }

    /// ( lib arity returns symbol -- ) `ffi-bind name` defines `name`, which
    /// calls `symbol` with `arity` cells and pushes its result if `returns`
    /// is set.
    pub fn ffi_bind(&mut self) -> Result<(), Error> {
        self.require(Permissions::FFI)?;
        let symbol = self.data_stack.try_pop()?;
        let returns = self.data_stack.try_pop()? != FALSE;
        let arity = cell_to_usize(self.data_stack.try_pop()?)?;
        let lib = cell_to_usize(self.data_stack.try_pop()?)?;
        let symbol_name = self.string_at(symbol)?;
        let symbol = self.loader.resolve(lib, &symbol_name)?;
        tracing::debug!(symbol = %symbol_name, lib, arity, returns, "bound");
        self.with_next_token(Pending::Define(DefKind::Native {
            lib,
            symbol,
            arity,
            returns,
        }))
    }

    /// `struct: name` starts a layout. `name` becomes a constant holding
    /// its size once `end-struct` closes it.
    pub fn struct_begin(&mut self) -> Result<(), Error> {
        if self.create_struct.is_some() {
            return Err(Error::NotInDefinition);
        }
        self.with_next_token(Pending::Define(DefKind::Struct))
    }

    /// ( size -- ) `field: name` adds a member of `size` bytes. `name` adds
    /// the member's offset to a struct address.
    pub fn struct_field(&mut self) -> Result<(), Error> {
        let size = cell_to_usize(self.data_stack.try_pop()?)?;
        let (_, desc) = self
            .create_struct
            .as_mut()
            .ok_or(Error::NotInDefinition)?;
        let offset = desc.size as Cell;
        desc.size += size;
        self.with_next_token(Pending::Define(DefKind::Field { offset }))
    }

    pub fn struct_end(&mut self) -> Result<(), Error> {
        let (id, desc) = self.create_struct.take().ok_or(Error::NotInDefinition)?;
        if let Some(entry) = self.dict.get_mut(id) {
            entry.kind = EntryKind::Constant {
                value: desc.size as Cell,
            };
        }
        tracing::debug!(name = %desc.name, size = desc.size, "struct declared");
        self.loader.structs.retain(|s: &StructDesc| s.name != desc.name);
        self.loader.structs.push(desc);
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use crate::{
        config::Params, loader::StructDesc, testutil::all_runtest, Error, Permissions, Pez,
    };

    #[test]
    fn structs() {
        all_runtest(
            r#"
            > struct: point
            > 8 field: px
            > 8 field: py
            > 4 field: flags
            > end-struct
            > point . 100 px . 100 py . 100 flags .
            < 20 100 108 116
            > create p point allot 3 p px ! 4 p py ! p py @ p px @ + .
            < 7
            "#,
        );
    }

    #[test]
    fn struct_layouts_reach_the_loader() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        pez.eval("struct: pair 8 field: car 8 field: cdr end-struct").unwrap();
        assert_eq!(
            pez.structs(),
            [StructDesc {
                name: "pair".into(),
                size: 16
            }]
        );
        assert_eq!(pez.eval("8 field: stray"), Err(Error::NotInDefinition));
        assert_eq!(pez.eval("end-struct"), Err(Error::NotInDefinition));
    }

    #[test]
    fn ffi_words_need_permission() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        assert_eq!(
            pez.eval("\"libm\" ffi-load"),
            Err(Error::Permission(Permissions::FFI))
        );
    }
}
