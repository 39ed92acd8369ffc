//! Reasoning-tag handling
//!
//! Qwen3-family models wrap their chain of thought in `<think>` ...
//! `</think>`. The span is hidden from the visible reply and exposed
//! separately. Matching is ASCII case-insensitive.

use super::base::{StreamChunk, TokenUsage};

/// Opening reasoning delimiter
pub const THINK_OPEN: &str = "<think>";

/// Closing reasoning delimiter
pub const THINK_CLOSE: &str = "</think>";

/// Visible and hidden parts of a generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSplit {
    /// Text outside any reasoning span, untrimmed
    pub visible: String,
    /// Reasoning segments joined by blank lines, if any were non-empty
    pub thinking: Option<String>,
    /// Whether the text ends inside an unterminated reasoning span
    pub open: bool,
}

/// Byte offset of the first ASCII case-insensitive match of `needle` at or after `from`
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from > hay.len() || hay.len() - from < pat.len() {
        return None;
    }
    (from..=hay.len() - pat.len()).find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

fn join_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let parts: Vec<&str> = segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Separate reasoning spans from visible text
///
/// A complete open/close pair is removed exactly, leaving the text on
/// either side untouched. An open delimiter without a matching close
/// drops everything from that point on.
///
/// # Examples
///
/// ```
/// use lexai::engines::thinking::split_thinking;
///
/// let split = split_thinking("A<think>plan</think>B");
/// assert_eq!(split.visible, "AB");
/// assert_eq!(split.thinking.as_deref(), Some("plan"));
///
/// let split = split_thinking("Answer <THINK>still going");
/// assert_eq!(split.visible, "Answer ");
/// assert!(split.open);
/// ```
pub fn split_thinking(text: &str) -> ThinkingSplit {
    let mut visible = String::with_capacity(text.len());
    let mut segments = Vec::new();
    let mut open = false;
    let mut pos = 0;

    while pos < text.len() {
        let Some(start) = find_ci(text, THINK_OPEN, pos) else {
            visible.push_str(&text[pos..]);
            break;
        };
        visible.push_str(&text[pos..start]);
        let body = start + THINK_OPEN.len();
        match find_ci(text, THINK_CLOSE, body) {
            Some(end) => {
                segments.push(&text[body..end]);
                pos = end + THINK_CLOSE.len();
            }
            None => {
                segments.push(&text[body..]);
                open = true;
                break;
            }
        }
    }

    ThinkingSplit {
        visible,
        thinking: join_segments(segments),
        open,
    }
}

/// Remove reasoning spans, keeping surrounding text exactly as it was
pub fn strip_thinking(text: &str) -> String {
    split_thinking(text).visible
}

/// Length of a trailing partial `<think>` that may complete in a later fragment
fn partial_open_suffix(text: &str) -> usize {
    let bytes = text.as_bytes();
    let open = THINK_OPEN.as_bytes();
    (1..open.len())
        .rev()
        .find(|&k| bytes.len() >= k && bytes[bytes.len() - k..].eq_ignore_ascii_case(&open[..k]))
        .unwrap_or(0)
}

/// Incremental visible-text tracker for streamed replies
///
/// Fragments are accumulated raw; after each one the visible text is
/// recomputed and the delta against the previous visible text emitted.
/// If the new visible text does not extend the old one, the whole new
/// text becomes the delta.
#[derive(Debug, Default)]
pub struct ThinkingFilter {
    raw: String,
    side_thinking: String,
    last_visible: String,
    last_thinking: Option<String>,
    fragments: usize,
}

impl ThinkingFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of content fragments received
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Visible text emitted so far
    pub fn visible(&self) -> &str {
        &self.last_visible
    }

    /// Feed a fragment of generated text
    ///
    /// Returns a chunk when the visible text or thinking changed.
    pub fn push_content(&mut self, fragment: &str) -> Option<StreamChunk> {
        self.fragments += 1;
        self.raw.push_str(fragment);
        self.step(false)
    }

    /// Feed a fragment of reasoning text reported out of band
    pub fn push_thinking(&mut self, fragment: &str) -> Option<StreamChunk> {
        self.side_thinking.push_str(fragment);
        self.step(false)
    }

    /// Produce the final chunk
    ///
    /// Missing usage is estimated as zero prompt tokens and one
    /// completion token per content fragment.
    pub fn finish(mut self, usage: Option<TokenUsage>) -> StreamChunk {
        let (delta, text, thinking) = self.advance(true);
        StreamChunk {
            delta,
            text,
            finished: true,
            usage: Some(usage.unwrap_or_else(|| TokenUsage::new(0, self.fragments))),
            thinking,
        }
    }

    fn step(&mut self, finishing: bool) -> Option<StreamChunk> {
        let before = self.last_thinking.clone();
        let (delta, text, thinking) = self.advance(finishing);
        if delta.is_empty() && thinking == before {
            return None;
        }
        Some(StreamChunk {
            delta,
            text,
            finished: false,
            usage: None,
            thinking,
        })
    }

    fn advance(&mut self, finishing: bool) -> (String, String, Option<String>) {
        let split = split_thinking(&self.raw);
        let mut visible = split.visible.as_str();
        if !finishing && !split.open {
            let held = partial_open_suffix(visible);
            visible = &visible[..visible.len() - held];
        }
        let visible = visible.trim().to_string();

        let delta = match visible.strip_prefix(self.last_visible.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => visible.clone(),
        };

        let thinking = join_segments(
            [self.side_thinking.as_str()]
                .into_iter()
                .chain(split.thinking.as_deref()),
        );

        self.last_visible = visible.clone();
        self.last_thinking = thinking.clone();
        (delta, visible, thinking)
    }
}
