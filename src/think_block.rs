//! Thinking-block detection over a token stream.
//!
//! OUTSIDE_THINK → INSIDE_THINK → DONE
//!
//! Text before the open tag is ignored, text between the tags is handed back
//! to the caller, and everything from the close tag on is discarded. Tags
//! split across fragments are recognised: a fragment suffix that could still
//! grow into the awaited tag is held back until the next push.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    OutsideThink,
    InsideThink,
    Done,
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideThink => write!(f, "OUTSIDE_THINK"),
            Self::InsideThink => write!(f, "INSIDE_THINK"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// What one pushed fragment contributed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scanned {
    /// In-block text, in stream order. May be empty.
    pub thinking: String,
    /// The close tag was seen in this push.
    pub closed: bool,
}

#[derive(Debug)]
pub struct ThinkBlockScanner {
    open_tag: String,
    close_tag: String,
    state: BlockState,
    carry: String,
}

impl ThinkBlockScanner {
    pub fn new(open_tag: &str, close_tag: &str) -> Self {
        Self {
            open_tag: open_tag.to_string(),
            close_tag: close_tag.to_string(),
            state: BlockState::OutsideThink,
            carry: String::new(),
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn push(&mut self, fragment: &str) -> Scanned {
        let mut out = Scanned::default();
        if self.state == BlockState::Done {
            return out;
        }

        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(fragment);

        if self.state == BlockState::OutsideThink {
            match buf.find(&self.open_tag) {
                Some(i) => {
                    buf.drain(..i + self.open_tag.len());
                    self.transition(BlockState::InsideThink);
                }
                None => {
                    let keep = partial_tag_len(&buf, &self.open_tag);
                    self.carry = buf.split_off(buf.len() - keep);
                    return out;
                }
            }
        }

        match buf.find(&self.close_tag) {
            Some(i) => {
                buf.truncate(i);
                out.thinking = buf;
                out.closed = true;
                self.transition(BlockState::Done);
            }
            None => {
                let keep = partial_tag_len(&buf, &self.close_tag);
                self.carry = buf.split_off(buf.len() - keep);
                out.thinking = buf;
            }
        }

        out
    }

    /// The stream ended. Returns held-back in-block text, if any.
    pub fn finish(&mut self) -> String {
        let carry = std::mem::take(&mut self.carry);
        match self.state {
            BlockState::InsideThink => carry,
            _ => String::new(),
        }
    }

    fn transition(&mut self, next: BlockState) {
        debug!("Think block: {} → {}", self.state, next);
        self.state = next;
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .filter(|&k| tag.is_char_boundary(k) && k <= text.len())
        .find(|&k| text.is_char_boundary(text.len() - k) && text.ends_with(&tag[..k]))
        .unwrap_or(0)
}
