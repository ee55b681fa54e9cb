use std::{
    fs::{self, OpenOptions},
    io::BufReader,
    net::TcpStream,
    path::PathBuf,
    process::Command,
    time::Duration,
};

use crate::{
    heap::HeapError,
    io::{Stream, STDERR, STDIN, STDOUT},
    permissions::Permissions,
    word::{cell_to_usize, Cell},
    Error, Pez,
};

use super::{flag, FALSE};

/// Most spaces a single `spaces` may print.
pub const MAX_SPACES: usize = 64 * 1024;

/// Render `val` in `radix` (2..=36), lowercase.
pub(crate) fn format_radix(val: Cell, radix: u32) -> String {
    if radix == 10 {
        return val.to_string();
    }
    let mut mag = val.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        let d = (mag % u64::from(radix)) as u32;
        digits.push(char::from_digit(d, radix).unwrap_or('?'));
        mag /= u64::from(radix);
        if mag == 0 {
            break;
        }
    }
    if val < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

impl<T: 'static> Pez<T> {
    fn print_cell(&self, val: Cell) -> Result<String, Error> {
        Ok(format_radix(val, self.base()?))
    }

    pub fn pop_print(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        let s = self.print_cell(a)?;
        self.print(&s)?;
        self.print(" ")
    }

    pub fn emit(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        self.write_out(&[val as u8])
    }

    pub fn cr(&mut self) -> Result<(), Error> {
        self.print("\n")
    }

    pub fn space(&mut self) -> Result<(), Error> {
        self.print(" ")
    }

    pub fn spaces(&mut self) -> Result<(), Error> {
        let n = usize::try_from(self.data_stack.try_pop()?.max(0)).unwrap_or(usize::MAX);
        if n > MAX_SPACES {
            return Err(Error::Application(format!("{n} spaces is more than {MAX_SPACES}")));
        }
        self.print(&" ".repeat(n))
    }

    pub fn print_stack(&mut self) -> Result<(), Error> {
        let depth = self.data_stack.depth();
        self.print_stack_top(depth)
    }

    /// ( n -- ) Print the top `n` cells, deepest first.
    pub fn print_stack_n(&mut self) -> Result<(), Error> {
        let n = cell_to_usize(self.data_stack.try_pop()?)?;
        self.print_stack_top(n.min(self.data_stack.depth()))
    }

    fn print_stack_top(&mut self, n: usize) -> Result<(), Error> {
        let radix = self.base()?;
        let items = self.data_stack.as_slice();
        let mut s = format!("<{}>", items.len());
        for val in &items[items.len() - n..] {
            s.push(' ');
            s.push_str(&format_radix(*val, radix));
        }
        s.push(' ');
        self.print(&s)
    }

    /// ( addr len -- )
    pub fn type_str(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_pop()?;
        let addr = self.data_stack.try_pop()?;
        let len = cell_to_usize(len)?;
        let addr = self.addr(addr, len)?;
        let bytes = self.heap.bytes(addr, len)?.to_vec();
        self.write_out(&bytes)
    }

    pub fn base_word(&mut self) -> Result<(), Error> {
        let addr = self.base_addr() as Cell;
        self.data_stack.push(addr)?;
        Ok(())
    }

    pub fn decimal(&mut self) -> Result<(), Error> {
        Ok(self.heap.store(self.base_addr(), 10)?)
    }

    pub fn hex(&mut self) -> Result<(), Error> {
        Ok(self.heap.store(self.base_addr(), 16)?)
    }

    //
    // C strings
    //

    pub fn strlen(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_pop()?;
        let len = self.cstr_at(addr)?.len();
        self.data_stack.push(len as Cell)?;
        Ok(())
    }

    /// ( dst src -- )
    pub fn strcpy(&mut self) -> Result<(), Error> {
        let src = self.data_stack.try_pop()?;
        let dst = self.data_stack.try_pop()?;
        let text = self.cstr_at(src)?.to_vec();
        let dst = self.addr(dst, text.len() + 1)?;
        self.heap.write_cstr(dst, &text)?;
        Ok(())
    }

    /// ( dst src -- )
    pub fn strcat(&mut self) -> Result<(), Error> {
        let src = self.data_stack.try_pop()?;
        let dst = self.data_stack.try_pop()?;
        let text = self.cstr_at(src)?.to_vec();
        let end = dst.wrapping_add(self.cstr_at(dst)?.len() as Cell);
        let end = self.addr(end, text.len() + 1)?;
        self.heap.write_cstr(end, &text)?;
        Ok(())
    }

    /// ( a b -- n ) -1, 0 or 1 as `a` sorts before, equal to or after `b`.
    pub fn strcmp(&mut self) -> Result<(), Error> {
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        let ord = self.cstr_at(a)?.cmp(self.cstr_at(b)?);
        self.data_stack.push(ord as Cell)?;
        Ok(())
    }

    //
    // streams
    //

    pub fn stdin(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.push(STDIN as Cell)?)
    }

    pub fn stdout(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.push(STDOUT as Cell)?)
    }

    pub fn stderr(&mut self) -> Result<(), Error> {
        Ok(self.data_stack.push(STDERR as Cell)?)
    }

    pub fn to_output(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let fd = cell_to_usize(self.data_stack.try_pop()?)?;
        self.streams.push_output(fd)
    }

    pub fn from_output(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let fd = self.streams.pop_output()?;
        self.data_stack.push(fd as Cell)?;
        Ok(())
    }

    pub fn to_input(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let fd = cell_to_usize(self.data_stack.try_pop()?)?;
        self.streams.push_input(fd)
    }

    pub fn from_input(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let fd = self.streams.pop_input()?;
        self.data_stack.push(fd as Cell)?;
        Ok(())
    }

    // Pop ( addr len ) and check the buffer, returning it as a heap range.
    fn pop_buffer(&mut self) -> Result<(usize, usize), Error> {
        let len = cell_to_usize(self.data_stack.try_pop()?)?;
        let addr = self.data_stack.try_pop()?;
        Ok((self.addr(addr, len)?, len))
    }

    /// ( addr len -- n ) Read a line from the current input into a C string
    /// buffer of `len` bytes, without its terminator. `n` is -1 at end of
    /// input.
    pub fn read_line(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let (addr, len) = self.pop_buffer()?;
        if len == 0 {
            return Err(HeapError::BadPointer.into());
        }
        let fd = self.streams.current_input();
        let mut line = String::new();
        if self.streams.get_mut(fd)?.read_line(&mut line)? == 0 {
            self.data_stack.push(-1)?;
            return Ok(());
        }
        let text = line.trim_end_matches(['\n', '\r']).as_bytes();
        let n = text.len().min(len - 1);
        self.heap.write_cstr(addr, &text[..n])?;
        self.data_stack.push(n as Cell)?;
        Ok(())
    }

    /// ( addr len -- n ) Read up to `len` bytes from the current input.
    pub fn read(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let (addr, len) = self.pop_buffer()?;
        let fd = self.streams.current_input();
        let mut buf = vec![0; len];
        let n = self.streams.get_mut(fd)?.read(&mut buf)?;
        self.heap.bytes_mut(addr, n)?.copy_from_slice(&buf[..n]);
        self.data_stack.push(n as Cell)?;
        Ok(())
    }

    /// ( addr len -- )
    pub fn write(&mut self) -> Result<(), Error> {
        self.require(Permissions::IO)?;
        let (addr, len) = self.pop_buffer()?;
        let bytes = self.heap.bytes(addr, len)?.to_vec();
        self.write_out(&bytes)?;
        let fd = self.streams.current_output();
        self.streams.get_mut(fd)?.flush()?;
        Ok(())
    }

    /// ( name mode -- fd ) Modes: 0 read, 1 write, 2 append, 3 read and
    /// write. `fd` is -1 if the file cannot be opened.
    pub fn open(&mut self) -> Result<(), Error> {
        self.require(Permissions::FILES)?;
        let mode = self.data_stack.try_pop()?;
        let name = self.data_stack.try_pop()?;
        let path = self.string_at(name)?;

        let mut opts = OpenOptions::new();
        match mode {
            0 => opts.read(true),
            1 => opts.write(true).create(true).truncate(true),
            2 => opts.append(true).create(true),
            3 => opts.read(true).write(true),
            _ => return Err(Error::BadFile),
        };
        let fd = match opts.open(&path) {
            Ok(file) => self.streams.open(Stream::File(BufReader::new(file))) as Cell,
            Err(error) => {
                tracing::debug!(%error, %path, "open failed");
                -1
            }
        };
        self.data_stack.push(fd)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.require(Permissions::FILES)?;
        let fd = cell_to_usize(self.data_stack.try_pop()?)?;
        self.streams.close(fd)
    }

    /// ( name -- flag )
    pub fn unlink(&mut self) -> Result<(), Error> {
        self.require(Permissions::FILES)?;
        let name = self.data_stack.try_pop()?;
        let path = self.string_at(name)?;
        let ok = fs::remove_file(path).is_ok();
        self.data_stack.push(flag(ok))?;
        Ok(())
    }

    /// ( name -- ) Load a source module from the load path, once.
    pub fn load(&mut self) -> Result<(), Error> {
        self.require(Permissions::FILES)?;
        let name = self.data_stack.try_pop()?;
        let name = self.string_at(name)?;
        self.load_module(&name)
    }

    pub fn add_load_path_word(&mut self) -> Result<(), Error> {
        self.require(Permissions::FILES)?;
        let dir = self.data_stack.try_pop()?;
        let dir = self.string_at(dir)?;
        self.add_load_path(PathBuf::from(dir));
        Ok(())
    }

    /// ( flag -- ) While set, break requests are ignored.
    pub fn sigint_ignore(&mut self) -> Result<(), Error> {
        self.require(Permissions::SIG)?;
        self.ignore_break = self.data_stack.try_pop()? != FALSE;
        Ok(())
    }

    pub fn getpid(&mut self) -> Result<(), Error> {
        self.require(Permissions::PROCESS)?;
        self.data_stack.push(Cell::from(std::process::id()))?;
        Ok(())
    }

    /// ( ms -- )
    pub fn sleep(&mut self) -> Result<(), Error> {
        self.require(Permissions::PROCESS)?;
        let ms = self.data_stack.try_pop()?.max(0) as u64;
        std::thread::sleep(Duration::from_millis(ms));
        Ok(())
    }

    /// ( host port -- fd ) `fd` is -1 if the connection fails.
    pub fn tcp_connect(&mut self) -> Result<(), Error> {
        self.require(Permissions::SOCKET)?;
        let port = self.data_stack.try_pop()?;
        let host = self.data_stack.try_pop()?;
        let host = self.string_at(host)?;
        let port = u16::try_from(port).map_err(|_| Error::BadStream)?;
        let fd = match TcpStream::connect((host.as_str(), port)) {
            Ok(stream) => self.streams.open(Stream::Tcp(BufReader::new(stream))) as Cell,
            Err(error) => {
                tracing::debug!(%error, %host, port, "connect failed");
                -1
            }
        };
        self.data_stack.push(fd)?;
        Ok(())
    }

    /// ( cmd -- status ) Run `cmd` through the shell.
    pub fn system(&mut self) -> Result<(), Error> {
        self.require(Permissions::SYSTEM)?;
        let cmd = self.data_stack.try_pop()?;
        let cmd = self.string_at(cmd)?;
        let status = Command::new("sh").arg("-c").arg(&cmd).status()?;
        self.data_stack.push(Cell::from(status.code().unwrap_or(-1)))?;
        Ok(())
    }

    /// ( name -- addr ) `addr` is 0 if the variable is unset.
    pub fn getenv(&mut self) -> Result<(), Error> {
        self.require(Permissions::POINTERS)?;
        let name = self.data_stack.try_pop()?;
        let name = self.string_at(name)?;
        let addr = match std::env::var(name) {
            Ok(val) => self.push_temp(val.as_bytes())?.0 as Cell,
            Err(_) => 0,
        };
        self.data_stack.push(addr)?;
        Ok(())
    }

    /// ( value name -- )
    pub fn setenv(&mut self) -> Result<(), Error> {
        self.require(Permissions::POINTERS)?;
        let name = self.data_stack.try_pop()?;
        let value = self.data_stack.try_pop()?;
        let name = self.string_at(name)?;
        let value = self.string_at(value)?;
        if name.is_empty() || name.contains(['=', '\0']) {
            return Err(Error::Application(format!("bad variable name {name:?}")));
        }
        std::env::set_var(name, value);
        Ok(())
    }

    //
    // regular expression results
    //

    pub fn prematch(&mut self) -> Result<(), Error> {
        let text = self.regex.prematch().to_owned();
        let (addr, _) = self.push_temp(text.as_bytes())?;
        self.data_stack.push(addr as Cell)?;
        Ok(())
    }

    pub fn postmatch(&mut self) -> Result<(), Error> {
        let text = self.regex.postmatch().to_owned();
        let (addr, _) = self.push_temp(text.as_bytes())?;
        self.data_stack.push(addr as Cell)?;
        Ok(())
    }

    /// ( n -- addr ) Capture group `n`, 0 being the whole match.
    pub fn match_fetch(&mut self) -> Result<(), Error> {
        let n = cell_to_usize(self.data_stack.try_pop()?)?;
        let text = self
            .regex
            .group(n)
            .ok_or(HeapError::BadPointer)?
            .to_owned();
        let (addr, _) = self.push_temp(text.as_bytes())?;
        self.data_stack.push(addr as Cell)?;
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use super::{format_radix, MAX_SPACES};
    use crate::{
        config::Params, io::MAX_IO_STREAMS, testutil::all_runtest, Error, Permissions, Pez,
        Status, WordFunc,
    };

    #[test]
    fn radix() {
        assert_eq!(format_radix(255, 16), "ff");
        assert_eq!(format_radix(-5, 2), "-101");
        assert_eq!(format_radix(0, 8), "0");
        assert_eq!(format_radix(i64::MIN, 16), "-8000000000000000");
    }

    #[test]
    fn output_words() {
        all_runtest(
            r#"
            > 65 emit space 66 emit 3 spaces 67 emit
            < A B   C
            > 1 2 3 4 2 n.s clear
            < <4> 3 4
            > 255 hex . -1 . decimal
            < ff -1
            > hex 255 . decimal
            < 255
            > s" counted" type
            < counted
            > create a 16 allot create b 16 allot
            > a "foo" strcpy b "bar" strcpy a b strcat a dup strlen type
            < foobar
            > a "foobar" strcmp . a "fop" strcmp . "b" "a" strcmp .
            < 0 -1 1
            "#,
        );
    }

    #[test]
    fn huge_space_counts_are_rejected() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        assert_eq!(
            pez.eval_status("9223372036854775807 spaces"),
            Status::Application
        );
        assert!(pez.output.is_empty());
        pez.eval(&format!("{} spaces", MAX_SPACES + 1)).unwrap_err();
        pez.eval(&format!("{MAX_SPACES} spaces -5 spaces")).unwrap();
        assert_eq!(pez.output.as_bytes().len(), MAX_SPACES);
    }

    #[test]
    fn gated_words_leave_the_stack_alone() {
        let mut pez = Pez::new(&Params::default(), Permissions::empty(), ()).unwrap();
        let cases: &[(WordFunc<()>, Permissions)] = &[
            (Pez::open, Permissions::FILES),
            (Pez::close, Permissions::FILES),
            (Pez::unlink, Permissions::FILES),
            (Pez::load, Permissions::FILES),
            (Pez::add_load_path_word, Permissions::FILES),
            (Pez::system, Permissions::SYSTEM),
            (Pez::getpid, Permissions::PROCESS),
            (Pez::sleep, Permissions::PROCESS),
            (Pez::getenv, Permissions::POINTERS),
            (Pez::setenv, Permissions::POINTERS),
            (Pez::tcp_connect, Permissions::SOCKET),
            (Pez::sigint_ignore, Permissions::SIG),
            (Pez::to_output, Permissions::IO),
            (Pez::to_input, Permissions::IO),
            (Pez::read_line, Permissions::IO),
            (Pez::read, Permissions::IO),
            (Pez::write, Permissions::IO),
            (Pez::ffi_load_word, Permissions::FFI),
            (Pez::ffi_include, Permissions::FFI),
            (Pez::ffi_bind, Permissions::FFI),
        ];
        for (word, perm) in cases {
            pez.data_stack.clear();
            pez.float_stack.clear();
            for val in [1, 2, 3, 4] {
                pez.push(val).unwrap();
            }
            pez.push_float(0.5).unwrap();
            let before = pez.mark();

            assert_eq!(word(&mut pez), Err(Error::Permission(*perm)), "{perm:?}");
            assert_eq!(pez.mark(), before, "{perm:?}");
            assert_eq!(pez.data_stack.as_slice(), &[1, 2, 3, 4]);
            assert!(!pez.ignore_break);
        }
    }

    #[test]
    fn redirected_output() {
        let mut pez = Pez::new(&Params::default(), Permissions::IO, ()).unwrap();
        pez.eval("stderr >output output> stdout = .").unwrap();
        assert_eq!(pez.output.as_str(), "0 ");
        pez.output.clear();

        let line = "stdout >output ".repeat(MAX_IO_STREAMS + 1);
        assert_eq!(pez.eval(&line), Err(Error::StreamLimit));
        // Redirections are dropped with the rest of the state
        pez.eval("1 .").unwrap();
        assert_eq!(pez.output.as_str(), "1 ");
    }

    #[test]
    fn file_round_trip() {
        let dir = std::env::temp_dir().join(format!("pez-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("lines.txt");
        let path = path.to_str().unwrap();

        let mut pez = Pez::new(&Params::default(), Permissions::FILES, ()).unwrap();
        pez.eval(&format!("\"{path}\" 1 open constant out")).unwrap();
        pez.eval("out >output .\" first\" cr .\" second\" cr output> drop out close").unwrap();

        pez.eval("create line 32 allot").unwrap();
        pez.eval(&format!("\"{path}\" 0 open constant in in >input")).unwrap();
        pez.eval("line 32 read-line . line dup strlen type cr").unwrap();
        pez.eval("line 32 read-line . line 32 read-line . input> drop").unwrap();
        assert_eq!(pez.output.as_str(), "5 first\n6 -1 ");

        pez.eval(&format!("\"{path}\" unlink .")).unwrap();
        assert!(!std::path::Path::new(path).exists());
        let _ = std::fs::remove_dir(&dir);
    }
}
