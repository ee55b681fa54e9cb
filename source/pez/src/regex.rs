/// Number of capture slots, the whole match included.
pub const MAX_REGEX_MATCHES: usize = 20;

/// Results of the last regular expression match.
///
/// The engine does not match anything itself. The host runs its matcher and
/// stores the results here with `Pez::set_regex_matches`, and Forth code
/// reads them with `prematch`, `postmatch` and `match@`.
#[derive(Debug, Default, Clone)]
pub struct RegexSlots {
    pre: String,
    post: String,
    groups: Vec<Option<String>>,
}

impl RegexSlots {
    /// Record a match against `subject`. `spans[0]` is the whole match,
    /// later entries are capture groups; `None` marks a group that did not
    /// participate. Spans past the slot limit, or outside `subject`, are
    /// ignored.
    pub fn set(&mut self, subject: &str, spans: &[Option<(usize, usize)>]) {
        self.clear();
        let slice = |span: Option<(usize, usize)>| {
            span.and_then(|(start, end)| subject.get(start..end))
                .map(str::to_owned)
        };
        if let Some(Some((start, end))) = spans.first().copied() {
            self.pre = subject.get(..start).unwrap_or("").to_owned();
            self.post = subject.get(end..).unwrap_or("").to_owned();
        }
        self.groups = spans
            .iter()
            .take(MAX_REGEX_MATCHES)
            .map(|s| slice(*s))
            .collect();
    }

    pub fn clear(&mut self) {
        self.pre.clear();
        self.post.clear();
        self.groups.clear();
    }

    pub fn prematch(&self) -> &str {
        &self.pre
    }

    pub fn postmatch(&self) -> &str {
        &self.post
    }

    /// Group `n`, or `None` when `n` is past the slot limit. Groups that did
    /// not match read as empty.
    pub fn group(&self, n: usize) -> Option<&str> {
        if n >= MAX_REGEX_MATCHES {
            return None;
        }
        Some(
            self.groups
                .get(n)
                .and_then(Option::as_deref)
                .unwrap_or(""),
        )
    }
}
