//! Splits agent output into platform-sized frames.
//!
//! Sizes are counted in Unicode scalar values, so a frame never ends inside a
//! multi-byte character. Splits fall at fixed offsets, not word boundaries.

/// Lazily yields consecutive frames of at most `max_frame_chars` characters.
/// Empty text yields no frames. A limit of zero is treated as one.
pub fn chunk(text: &str, max_frame_chars: usize) -> Frames<'_> {
    Frames {
        remaining: text,
        max_frame_chars: max_frame_chars.max(1),
    }
}

#[derive(Debug, Clone)]
pub struct Frames<'a> {
    remaining: &'a str,
    max_frame_chars: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let split_at = self
            .remaining
            .char_indices()
            .nth(self.max_frame_chars)
            .map_or(self.remaining.len(), |(idx, _)| idx);
        let (frame, rest) = self.remaining.split_at(split_at);
        self.remaining = rest;
        Some(frame)
    }
}
