use std::borrow::Cow;

/// Everything printed to the instance's standard output stream.
///
/// The host drains it after each evaluation.
#[derive(Default)]
pub struct OutputBuf {
    buf: Vec<u8>,
}

impl OutputBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bstr(&mut self, bstr: &[u8]) {
        self.buf.extend_from_slice(bstr);
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_bstr(s.as_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Printed text. Invalid UTF-8 from `type`/`emit` is replaced.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Return the contents and empty the buffer.
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl core::fmt::Write for OutputBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use super::OutputBuf;
    use core::fmt::Write;

    #[test]
    fn lossy() {
        let mut out = OutputBuf::new();
        write!(&mut out, "{} ", 42).unwrap();
        out.push_bstr(&[0xff]);
        assert_eq!(out.as_str(), "42 \u{fffd}");
        assert_eq!(out.take(), b"42 \xff");
        assert!(out.is_empty());
    }
}
