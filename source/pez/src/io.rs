use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Write},
    net::TcpStream,
};

use crate::{output::OutputBuf, Error};

/// Depth limit of each redirection stack.
pub const MAX_IO_STREAMS: usize = 10;

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;
pub const STDERR: usize = 2;

/// An open stream, addressed from Forth code by its slot number.
#[derive(Debug)]
pub enum Stream {
    Stdin,
    /// The instance's [`OutputBuf`].
    Output,
    Stderr,
    File(BufReader<File>),
    Tcp(BufReader<TcpStream>),
}

impl Stream {
    pub fn write_all(&mut self, out: &mut OutputBuf, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Output => {
                out.push_bstr(bytes);
                Ok(())
            }
            Self::Stderr => io::stderr().write_all(bytes),
            Self::File(f) => f.get_mut().write_all(bytes),
            Self::Tcp(t) => t.get_mut().write_all(bytes),
            Self::Stdin => Err(io::ErrorKind::Unsupported.into()),
        }
    }

    /// Read one line, including its terminator. Returns 0 at end of stream.
    pub fn read_line(&mut self, line: &mut String) -> io::Result<usize> {
        match self {
            Self::Stdin => io::stdin().lock().read_line(line),
            Self::File(f) => f.read_line(line),
            Self::Tcp(t) => t.read_line(line),
            Self::Output | Self::Stderr => Err(io::ErrorKind::Unsupported.into()),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Stdin => io::stdin().lock().read(buf),
            Self::File(f) => f.read(buf),
            Self::Tcp(t) => t.read(buf),
            Self::Output | Self::Stderr => Err(io::ErrorKind::Unsupported.into()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stderr => io::stderr().flush(),
            Self::File(f) => f.get_mut().flush(),
            Self::Tcp(t) => t.get_mut().flush(),
            Self::Stdin | Self::Output => Ok(()),
        }
    }
}

/// The stream table plus the input and output redirection stacks.
#[derive(Debug)]
pub struct Streams {
    slots: Vec<Option<Stream>>,
    outputs: Vec<usize>,
    inputs: Vec<usize>,
}

impl Default for Streams {
    fn default() -> Self {
        Self {
            slots: vec![Some(Stream::Stdin), Some(Stream::Output), Some(Stream::Stderr)],
            outputs: Vec::with_capacity(MAX_IO_STREAMS),
            inputs: Vec::with_capacity(MAX_IO_STREAMS),
        }
    }
}

impl Streams {
    /// Store `stream` in the lowest free slot, returning its number.
    pub fn open(&mut self, stream: Stream) -> usize {
        match self.slots.iter().position(Option::is_none) {
            Some(fd) => {
                self.slots[fd] = Some(stream);
                fd
            }
            None => {
                self.slots.push(Some(stream));
                self.slots.len() - 1
            }
        }
    }

    /// Close a stream opened with [`Streams::open`]. The standard streams
    /// cannot be closed.
    pub fn close(&mut self, fd: usize) -> Result<(), Error> {
        if fd <= STDERR {
            return Err(Error::BadStream);
        }
        let mut stream = self
            .slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Error::BadStream)?;
        stream.flush()?;
        Ok(())
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut Stream, Error> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(Error::BadStream)
    }

    pub fn is_open(&self, fd: usize) -> bool {
        matches!(self.slots.get(fd), Some(Some(_)))
    }

    pub fn push_output(&mut self, fd: usize) -> Result<(), Error> {
        let open = self.is_open(fd);
        Self::push_redirect(&mut self.outputs, fd, open)
    }

    pub fn pop_output(&mut self) -> Result<usize, Error> {
        self.outputs.pop().ok_or(Error::BadStream)
    }

    pub fn push_input(&mut self, fd: usize) -> Result<(), Error> {
        let open = self.is_open(fd);
        Self::push_redirect(&mut self.inputs, fd, open)
    }

    pub fn pop_input(&mut self) -> Result<usize, Error> {
        self.inputs.pop().ok_or(Error::BadStream)
    }

    fn push_redirect(stack: &mut Vec<usize>, fd: usize, open: bool) -> Result<(), Error> {
        if !open {
            return Err(Error::BadStream);
        }
        if stack.len() >= MAX_IO_STREAMS {
            return Err(Error::StreamLimit);
        }
        stack.push(fd);
        Ok(())
    }

    /// Where output words currently write.
    pub fn current_output(&self) -> usize {
        self.outputs.last().copied().unwrap_or(STDOUT)
    }

    /// Where input words currently read.
    pub fn current_input(&self) -> usize {
        self.inputs.last().copied().unwrap_or(STDIN)
    }

    pub fn reset_redirects(&mut self) {
        self.outputs.clear();
        self.inputs.clear();
    }
}

#[cfg(test)]
pub mod test {
    use super::{Stream, Streams, MAX_IO_STREAMS, STDERR, STDIN, STDOUT};
    use crate::{output::OutputBuf, Error};

    #[test]
    fn redirect_limit() {
        let mut streams = Streams::default();
        for _ in 0..MAX_IO_STREAMS {
            streams.push_output(STDERR).unwrap();
        }
        assert_eq!(streams.push_output(STDERR), Err(Error::StreamLimit));
        assert_eq!(streams.current_output(), STDERR);
        streams.reset_redirects();
        assert_eq!(streams.current_output(), STDOUT);
        assert_eq!(streams.pop_output(), Err(Error::BadStream));
    }

    #[test]
    fn redirects_need_an_open_stream() {
        let mut streams = Streams::default();
        streams.push_input(STDIN).unwrap();
        streams.push_output(STDERR).unwrap();
        assert_eq!(streams.current_input(), STDIN);
        assert_eq!(streams.current_output(), STDERR);
        assert_eq!(streams.push_output(3), Err(Error::BadStream));
        assert_eq!(streams.pop_input(), Ok(STDIN));
        assert_eq!(streams.pop_output(), Ok(STDERR));
    }

    #[test]
    fn std_streams_stay_open() {
        let mut streams = Streams::default();
        assert_eq!(streams.close(STDOUT), Err(Error::BadStream));
        assert_eq!(streams.push_input(7), Err(Error::BadStream));

        let mut out = OutputBuf::new();
        streams
            .get_mut(STDOUT)
            .unwrap()
            .write_all(&mut out, b"hi")
            .unwrap();
        assert_eq!(out.as_str(), "hi");
        assert!(matches!(streams.get_mut(0), Ok(Stream::Stdin)));
    }
}
