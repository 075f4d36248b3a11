//! Incremental sentence segmentation for streamed text.
//!
//! A sentence ends at `.`, `!` or `?` followed by whitespace. Text after the
//! last such boundary stays pending until more text arrives or the caller
//! flushes it with [`SentenceSegmenter::finish`].

const TERMINATORS: [char; 3] = ['.', '!', '?'];

#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    pending: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every sentence it completed.
    ///
    /// Splitting only happens when the fragment itself carries a terminator.
    /// The last piece is always kept back, even if it already ends with one,
    /// since the next fragment may extend it.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);

        if !fragment.contains(&TERMINATORS[..]) {
            return Vec::new();
        }

        let (complete, rest) = split_boundaries(&self.pending);
        let sentences = complete
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        self.pending = rest.to_string();
        sentences
    }

    /// End of block: hand back whatever is pending as one last sentence.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// Split at every terminator followed by a whitespace run.
///
/// Returns the completed pieces (terminator included, surrounding whitespace
/// untouched) and the unterminated remainder.
fn split_boundaries(text: &str) -> (Vec<&str>, &str) {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }

        pieces.push(&text[start..i + c.len_utf8()]);

        // Swallow the whole whitespace run.
        start = text.len();
        while let Some(&(j, w)) = chars.peek() {
            if w.is_whitespace() {
                chars.next();
            } else {
                start = j;
                break;
            }
        }
    }

    (pieces, &text[start.min(text.len())..])
}
