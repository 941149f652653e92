//! Token-to-sentence segmentation
//!
//! Converts a streamed sequence of LLM tokens into sentence-sized units
//! suitable for incremental speech synthesis. A token containing `.`, `!`,
//! `?`, or a newline closes the current sentence at token granularity; no
//! sub-token splitting is attempted, so "Mr." closes a sentence too. That
//! coarseness is accepted for speech pacing.

/// Characters that close a sentence when present anywhere in a token
const BOUNDARY_CHARS: [char; 4] = ['.', '!', '?', '\n'];

/// Accumulates streamed tokens and emits complete sentences
///
/// Single-pass and forward-only; one instance lives for the duration of one
/// streamed response. Concatenating every emitted sentence (plus the final
/// `flush`) reconstructs the token stream up to whitespace normalization.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    /// Create a segmenter with an empty sentence buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token; returns a sentence when the token closes one
    ///
    /// Empty tokens are ignored entirely: not appended, not a boundary.
    /// A boundary token whose accumulated buffer trims to nothing emits
    /// nothing.
    pub fn push(&mut self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }

        self.buffer.push_str(token);

        if !token.contains(BOUNDARY_CHARS) {
            return None;
        }

        let sentence = self.buffer.trim();
        let emitted = if sentence.is_empty() {
            None
        } else {
            Some(sentence.to_string())
        };
        self.buffer.clear();
        emitted
    }

    /// Emit whatever remains after the token stream ends
    pub fn flush(&mut self) -> Option<String> {
        let sentence = self.buffer.trim();
        let emitted = if sentence.is_empty() {
            None
        } else {
            Some(sentence.to_string())
        };
        self.buffer.clear();
        emitted
    }

    /// Whether any un-emitted text is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Pull-based sentence iterator over a token iterator
///
/// Lazy: tokens are only consumed as sentences are requested, so a caller
/// that stops early never drains the rest of the stream.
#[derive(Debug)]
pub struct Sentences<I> {
    tokens: I,
    segmenter: SentenceSegmenter,
    exhausted: bool,
}

impl<I> Sentences<I> {
    fn new(tokens: I) -> Self {
        Self {
            tokens,
            segmenter: SentenceSegmenter::new(),
            exhausted: false,
        }
    }
}

impl<I, T> Iterator for Sentences<I>
where
    I: Iterator<Item = T>,
    T: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }

        loop {
            match self.tokens.next() {
                Some(token) => {
                    if let Some(sentence) = self.segmenter.push(token.as_ref()) {
                        return Some(sentence);
                    }
                }
                None => {
                    self.exhausted = true;
                    return self.segmenter.flush();
                }
            }
        }
    }
}

/// Segment a token iterator into sentences
pub fn sentences<I, T>(tokens: I) -> Sentences<I::IntoIter>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    Sentences::new(tokens.into_iter())
}
