use std::{
    env::consts::{DLL_PREFIX, DLL_SUFFIX},
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::{word::Cell, Error, Pez};

/// A C struct layout declared with `struct:` ... `end-struct`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDesc {
    pub name: String,
    pub size: usize,
}

/// Arguments for one call of a bound native symbol.
pub struct NativeCall<'a> {
    /// Stack cells, deepest first.
    pub args: &'a [Cell],
    /// The instance heap. Address arguments are offsets into it.
    pub heap: &'a mut [u8],
    /// Every struct layout declared so far.
    pub structs: &'a [StructDesc],
}

/// An open native library, provided by the host.
pub trait NativeLibrary {
    /// Resolve `symbol`, using the headers registered with `ffi-include`.
    fn resolve(&self, symbol: &str, includes: &[String]) -> Option<usize>;

    /// Call a symbol previously returned by `resolve`.
    fn call(&mut self, symbol: usize, call: NativeCall<'_>) -> Result<Cell, Error>;
}

/// Opens native libraries on behalf of an instance.
///
/// `path` is the library found on the load path, if any; loaders may fall
/// back to a system search by `name`.
pub trait NativeLoader {
    fn open(&mut self, name: &str, path: Option<&Path>) -> Result<Box<dyn NativeLibrary>, Error>;
}

pub struct FfiLib {
    pub name: String,
    pub includes: Vec<String>,
    handle: Box<dyn NativeLibrary>,
}

/// Module and native library bookkeeping for an instance.
pub struct Loader {
    pub(crate) load_path: Vec<PathBuf>,
    pub(crate) already_loaded: Vec<PathBuf>,
    pub(crate) libs: Vec<FfiLib>,
    pub(crate) native: Option<Box<dyn NativeLoader>>,
    pub(crate) structs: Vec<StructDesc>,
    /// Line number of the last failed load, 0 if none.
    pub(crate) errline: usize,
}

impl Loader {
    pub fn new(load_path: Vec<PathBuf>) -> Self {
        Self {
            load_path,
            already_loaded: Vec::new(),
            libs: Vec::new(),
            native: None,
            structs: Vec::new(),
            errline: 0,
        }
    }

    /// Find a source file: `name` itself, then `dir/name` and
    /// `dir/name.pez` for each load path directory, in order.
    pub fn which_lib(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        self.load_path.iter().find_map(|dir| {
            let plain = dir.join(name);
            if plain.is_file() {
                return Some(plain);
            }
            let ext = dir.join(format!("{name}.pez"));
            ext.is_file().then_some(ext)
        })
    }

    /// Find a platform native library called `name` on the load path.
    pub fn which_native(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{DLL_PREFIX}{name}{DLL_SUFFIX}");
        self.load_path
            .iter()
            .map(|dir| dir.join(&file))
            .find(|p| p.is_file())
    }

    pub fn lib_mut(&mut self, lib: usize) -> Result<&mut FfiLib, Error> {
        self.libs.get_mut(lib).ok_or(Error::BadFile)
    }

    pub fn resolve(&self, lib: usize, symbol: &str) -> Result<usize, Error> {
        let lib = self.libs.get(lib).ok_or(Error::BadFile)?;
        lib.handle
            .resolve(symbol, &lib.includes)
            .ok_or_else(|| Error::Undefined(symbol.to_string()))
    }

    pub fn call(
        &mut self,
        lib: usize,
        symbol: usize,
        args: &[Cell],
        heap: &mut [u8],
    ) -> Result<Cell, Error> {
        let ffi = self.libs.get_mut(lib).ok_or(Error::BadFile)?;
        ffi.handle.call(
            symbol,
            NativeCall {
                args,
                heap,
                structs: &self.structs,
            },
        )
    }
}

impl<T: 'static> Pez<T> {
    /// Evaluate every line from `reader`.
    ///
    /// Stops at the first failing line, whose number is then available from
    /// [`Pez::errline`]. A string or comment still open at the end of input
    /// is an error, and is discarded.
    pub fn load_reader(&mut self, reader: impl BufRead) -> Result<(), Error> {
        self.loader.errline = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    self.loader.errline = idx + 1;
                    return Err(e.into());
                }
            };
            match self.eval(&line) {
                Ok(()) | Err(Error::RunString) => {}
                Err(e) => {
                    self.loader.errline = idx + 1;
                    return Err(e);
                }
            }
        }

        if self.string.take().is_some() {
            return Err(Error::RunString);
        }
        if core::mem::take(&mut self.comment) {
            return Err(Error::RunComment);
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    pub fn load_file(&mut self, path: &Path) -> Result<(), Error> {
        let file = File::open(path).map_err(|error| {
            tracing::debug!(%error, "cannot open");
            Error::BadFile
        })?;
        let res = self.load_reader(BufReader::new(file));
        if let Err(ref err) = res {
            tracing::debug!(?err, line = self.loader.errline, "load failed");
        }
        res
    }

    /// Load a module once. Later loads of the same file, by any name that
    /// resolves to it, do nothing.
    pub fn load_module(&mut self, name: &str) -> Result<(), Error> {
        let path = self.loader.which_lib(name).ok_or(Error::BadFile)?;
        let canon = path.canonicalize()?;
        if self.loader.already_loaded.contains(&canon) {
            tracing::debug!(module = name, "already loaded");
            return Ok(());
        }

        // Recorded up front, so a module that loads itself stops there
        self.loader.already_loaded.push(canon.clone());
        let res = self.load_file(&canon);
        if res.is_err() {
            self.loader.already_loaded.retain(|p| p != &canon);
        }
        res
    }

    pub fn which_lib(&self, name: &str) -> Option<PathBuf> {
        self.loader.which_lib(name)
    }

    pub fn add_load_path(&mut self, dir: impl Into<PathBuf>) {
        self.loader.load_path.push(dir.into());
    }

    pub fn errline(&self) -> usize {
        self.loader.errline
    }

    pub fn set_native_loader(&mut self, loader: impl NativeLoader + 'static) {
        self.loader.native = Some(Box::new(loader));
    }

    /// Open the native library `name`, once. Returns its handle number.
    pub fn ffi_load(&mut self, name: &str) -> Result<usize, Error> {
        if let Some(idx) = self.loader.libs.iter().position(|l| l.name == name) {
            return Ok(idx);
        }
        let path = self.loader.which_native(name);
        let native = self
            .loader
            .native
            .as_mut()
            .ok_or_else(|| Error::Application("no native loader installed".into()))?;
        let handle = native.open(name, path.as_deref())?;
        tracing::debug!(lib = name, ?path, "native library opened");
        self.loader.libs.push(FfiLib {
            name: name.to_string(),
            includes: Vec::new(),
            handle,
        });
        Ok(self.loader.libs.len() - 1)
    }

    pub fn structs(&self) -> &[StructDesc] {
        &self.loader.structs
    }
}
