//! # pez
//!
//! `pez` is an embeddable, forth-family scripting language runtime.
//!
//! A host creates one or more [`Pez`] instances. Each instance owns four
//! memory regions (data stack, return stack, float stack and heap), a
//! dictionary of words, and a [`Permissions`] mask that restricts which
//! side-effecting primitives it may run. Source text is fed to the
//! instance one line at a time with [`Pez::eval`], and every failure is
//! reported as an [`Error`] (which maps to a numeric [`Status`]) rather
//! than tearing down the host.
//!
//! ```rust
//! use pez::{config::Params, Permissions, Pez};
//!
//! let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
//! pez.eval(": double dup + ;").unwrap();
//! pez.eval("5 double .").unwrap();
//! assert_eq!(pez.output.as_str().trim_end(), "10");
//! ```

pub mod config;
pub mod dictionary;
pub mod fastr;
pub mod heap;
pub mod input;
pub mod io;
pub mod loader;
pub mod mark;
pub mod output;
pub mod permissions;
pub mod regex;
pub mod stack;
pub mod vm;
pub mod word;

#[cfg(any(test, feature = "_force_test_utils"))]
pub mod testutil;

pub use crate::{
    mark::StateMark,
    permissions::Permissions,
    vm::{BreakHandle, Pez},
    word::{Cell, WordId},
};

use crate::{heap::HeapError, stack::StackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Compile,
}

/// Everything that can stop the evaluation of a line.
///
/// Use [`Error::status`] to get the numeric status code for an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Stack(StackError),
    Heap(HeapError),
    DictionaryFull,
    Undefined(String),
    ForgetProtected,
    NotInDefinition,
    RunString,
    RunComment,
    Break,
    DivideByZero,
    Application(String),
    BadFile,
    Permission(Permissions),
    Io(std::io::ErrorKind),
    StreamLimit,
    BadStream,
}

/// Numeric evaluation status, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Normal = 0,
    StackOver = 1,
    StackUnder = 2,
    RStackOver = 3,
    RStackUnder = 4,
    HeapOver = 5,
    BadPointer = 6,
    Undefined = 7,
    ForgetProt = 8,
    NotInDef = 9,
    RunString = 10,
    RunComm = 11,
    Break = 12,
    DivZero = 13,
    Application = 14,
    BadFile = 15,
    FStackUnder = 16,
    FStackOver = 17,
    Permission = 18,
    Io = 19,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn describe(self) -> &'static str {
        match self {
            Status::Normal => "ok",
            Status::StackOver => "stack overflow",
            Status::StackUnder => "stack underflow",
            Status::RStackOver => "return stack overflow",
            Status::RStackUnder => "return stack underflow",
            Status::HeapOver => "heap overflow",
            Status::BadPointer => "bad pointer",
            Status::Undefined => "undefined word",
            Status::ForgetProt => "attempt to forget protected word",
            Status::NotInDef => "compiler word outside definition",
            Status::RunString => "unterminated string",
            Status::RunComm => "unterminated comment",
            Status::Break => "break signal",
            Status::DivZero => "divide by zero",
            Status::Application => "application error",
            Status::BadFile => "bad file",
            Status::FStackUnder => "float stack underflow",
            Status::FStackOver => "float stack overflow",
            Status::Permission => "permission denied",
            Status::Io => "i/o failure",
        }
    }
}

impl Error {
    pub fn status(&self) -> Status {
        use crate::stack::Region;
        match self {
            Error::Stack(StackError::Overflow(Region::Data)) => Status::StackOver,
            Error::Stack(StackError::Underflow(Region::Data)) => Status::StackUnder,
            Error::Stack(StackError::Overflow(Region::Return)) => Status::RStackOver,
            Error::Stack(StackError::Underflow(Region::Return)) => Status::RStackUnder,
            Error::Stack(StackError::Overflow(Region::Float)) => Status::FStackOver,
            Error::Stack(StackError::Underflow(Region::Float)) => Status::FStackUnder,
            Error::Heap(HeapError::Overflow) => Status::HeapOver,
            Error::Heap(HeapError::BadPointer) => Status::BadPointer,
            Error::DictionaryFull => Status::HeapOver,
            Error::Undefined(_) => Status::Undefined,
            Error::ForgetProtected => Status::ForgetProt,
            Error::NotInDefinition => Status::NotInDef,
            Error::RunString => Status::RunString,
            Error::RunComment => Status::RunComm,
            Error::Break => Status::Break,
            Error::DivideByZero => Status::DivZero,
            Error::Application(_) => Status::Application,
            Error::BadFile => Status::BadFile,
            Error::Permission(_) => Status::Permission,
            Error::Io(_) | Error::StreamLimit | Error::BadStream => Status::Io,
        }
    }
}

impl From<StackError> for Error {
    fn from(se: StackError) -> Self {
        Error::Stack(se)
    }
}

impl From<HeapError> for Error {
    fn from(he: HeapError) -> Self {
        Error::Heap(he)
    }
}

impl From<std::io::Error> for Error {
    fn from(ioe: std::io::Error) -> Self {
        Error::Io(ioe.kind())
    }
}

/// `WordFunc` represents a function that can be used as part of a dictionary word.
///
/// It takes the whole instance, so builtins can reach the stacks, the heap
/// and the host context.
pub type WordFunc<T> = fn(&mut Pez<T>) -> Result<(), Error>;

trait ReplaceErr {
    type OK;
    fn replace_err<NE>(self, t: NE) -> Result<Self::OK, NE>;
}

impl<T, OE> ReplaceErr for Result<T, OE> {
    type OK = T;
    #[inline]
    fn replace_err<NE>(self, e: NE) -> Result<Self::OK, NE> {
        match self {
            Ok(t) => Ok(t),
            Err(_e) => Err(e),
        }
    }
}

#[cfg(test)]
pub mod test {
    use crate::{config::Params, stack::Region, stack::StackError, Error, Permissions, Pez, Status};

    #[derive(Default)]
    struct TestContext {
        contents: Vec<i64>,
    }

    #[test]
    fn status_codes() {
        assert_eq!(Error::Stack(StackError::Underflow(Region::Data)).status().code(), 2);
        assert_eq!(Error::Stack(StackError::Overflow(Region::Float)).status().code(), 17);
        assert_eq!(Error::Undefined("nope".into()).status(), Status::Undefined);
        assert_eq!(Error::Permission(Permissions::IO).status().code(), 18);
        assert_eq!(Status::ForgetProt.describe(), "attempt to forget protected word");
    }

    #[test]
    fn pez() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), TestContext::default())
            .unwrap();
        let lines = &[
            ("2 3 + .", "5 "),
            (": yay 2 3 + . ;", ""),
            ("yay yay yay", "5 5 5 "),
            (": boop yay yay ;", ""),
            ("boop", "5 5 "),
            (": err if boop boop boop else yay yay then ;", ""),
            ("0 err", "5 5 "),
            ("1 err", "5 5 5 5 5 5 "),
            ("42 emit", "*"),
            (": star 42 emit ;", ""),
            (": sloop 5 0 do star star loop ;", ""),
            ("sloop", "**********"),
            (": count 10 0 do i . loop ;", ""),
            ("count", "0 1 2 3 4 5 6 7 8 9 "),
            (": beep .\" hello, world!\" ;", ""),
            ("beep", "hello, world!"),
            ("123 constant x", ""),
            ("4 x + .", "127 "),
            ("variable y", ""),
            ("y @ .", "0 "),
            ("10 y ! y @ .", "10 "),
        ];

        for (line, out) in lines {
            pez.eval(line).unwrap();
            assert_eq!(pez.output.as_str(), *out, "line: {line}");
            pez.output.clear();
        }

        assert!(pez.eval("yay yaay").is_err());
        assert_eq!(pez.data_stack.depth(), 0);
        assert_eq!(pez.return_stack.depth(), 0);

        // Takes one value off the stack, and stores it in the vec
        fn squirrel(pez: &mut Pez<TestContext>) -> Result<(), Error> {
            let val = pez.data_stack.try_pop()?;
            pez.host_ctxt.contents.push(val);
            Ok(())
        }
        pez.add_builtin("squirrel", squirrel).unwrap();

        pez.eval("5 6 squirrel squirrel").unwrap();
        pez.eval(": sqloop 4 0 do i squirrel loop ;").unwrap();
        pez.eval("sqloop").unwrap();

        let context = pez.release();
        assert_eq!(&context.contents, &[6, 5, 0, 1, 2, 3]);
    }
}
