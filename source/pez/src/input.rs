/// The line currently being evaluated, with a cursor.
///
/// Tokens are runs of non-whitespace. The lexer may also read raw bytes
/// past the cursor, for string literals and comments.
#[derive(Default)]
pub struct WordStrBuf {
    buf: String,
    cur: usize,
    holding: Option<(usize, usize)>,
}

impl WordStrBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `input`, minus any line terminator.
    pub fn fill(&mut self, input: &str) {
        self.buf.clear();
        self.buf.push_str(input.trim_end_matches(['\n', '\r']));
        self.cur = 0;
        self.holding = None;
    }

    // Move `self.cur` to the next non-whitespace character.
    //
    // Returns `None` if we hit the end.
    fn next_nonwhitespace(&mut self) -> Option<usize> {
        let bytes = self.buf.as_bytes();
        while self.cur < bytes.len() {
            if !bytes[self.cur].is_ascii_whitespace() {
                return Some(self.cur);
            }
            self.cur += 1;
        }
        None
    }

    pub fn advance(&mut self) {
        self.holding = None;

        // Find the start, skipping any ASCII whitespace
        let start = match self.next_nonwhitespace() {
            Some(s) => s,
            None => return,
        };
        // Find the end, either the first ASCII whitespace, or the end of the buffer
        let bytes = self.buf.as_bytes();
        while self.cur < bytes.len() && !bytes[self.cur].is_ascii_whitespace() {
            self.cur += 1;
        }
        self.holding = Some((start, self.cur));
    }

    pub fn cur_word(&self) -> Option<&str> {
        let (start, end) = self.holding?;
        self.buf.get(start..end)
    }

    /// Byte offset of the current token.
    pub fn word_start(&self) -> Option<usize> {
        self.holding.map(|(start, _)| start)
    }

    /// Everything after the cursor.
    pub fn remaining(&self) -> &str {
        self.buf.get(self.cur..).unwrap_or("")
    }

    /// Move the cursor to an absolute byte offset, dropping the current token.
    pub fn seek(&mut self, pos: usize) {
        self.cur = pos.min(self.buf.len());
        self.holding = None;
    }

    /// Move the cursor forward by `n` bytes.
    pub fn consume(&mut self, n: usize) {
        self.seek(self.cur + n);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
pub mod test {
    use super::WordStrBuf;

    #[test]
    fn tokens() {
        let mut buf = WordStrBuf::new();
        buf.fill("  : Star 42   emit ;\n");

        let mut words = vec![];
        loop {
            buf.advance();
            match buf.cur_word() {
                Some(w) => words.push(w.to_string()),
                None => break,
            }
        }
        assert_eq!(words, [":", "Star", "42", "emit", ";"]);
    }

    #[test]
    fn raw_access() {
        let mut buf = WordStrBuf::new();
        buf.fill(r#"." hi there" cr"#);
        buf.advance();
        assert_eq!(buf.cur_word(), Some(r#".""#));
        assert_eq!(buf.word_start(), Some(0));
        assert_eq!(buf.remaining(), r#" hi there" cr"#);
        buf.consume(1);
        assert_eq!(buf.remaining(), r#"hi there" cr"#);
        buf.seek(100);
        buf.advance();
        assert_eq!(buf.cur_word(), None);
    }
}
