//! Accumulating text buffer measured in characters.

/// Text written by the producer and not yet released downstream.
///
/// Lengths count `char`s so that a prefix split never lands inside a
/// multi-byte sequence. Released text is skipped with a read offset and
/// compacted away once it makes up more than half of the storage.
#[derive(Debug, Default)]
pub struct RenderBuffer {
    text: String,
    start: usize,
    chars: usize,
}

impl RenderBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the end of the buffer.
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.chars += fragment.chars().count();
    }

    /// Number of buffered characters.
    pub fn len(&self) -> usize {
        self.chars
    }

    /// Whether the buffer holds no text.
    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Buffered text, for inspection.
    pub fn as_str(&self) -> &str {
        &self.text[self.start..]
    }

    /// Remove and return the first `n` characters, or everything if fewer
    /// are buffered.
    pub fn take_prefix(&mut self, n: usize) -> String {
        if n >= self.chars {
            return self.take_all();
        }

        let split = self
            .as_str()
            .char_indices()
            .nth(n)
            .map_or(self.text.len(), |(idx, _)| self.start + idx);
        let chunk = self.text[self.start..split].to_owned();
        self.start = split;
        self.chars -= n;

        if self.start > self.text.len() / 2 {
            self.text.drain(..self.start);
            self.start = 0;
        }
        chunk
    }

    /// Remove and return the whole buffer.
    pub fn take_all(&mut self) -> String {
        let start = std::mem::take(&mut self.start);
        self.chars = 0;
        let mut text = std::mem::take(&mut self.text);
        if start > 0 {
            text.drain(..start);
        }
        text
    }

    /// Discard all buffered text.
    pub fn clear(&mut self) {
        self.text.clear();
        self.start = 0;
        self.chars = 0;
    }

    /// Bytes held in storage, including released text not yet compacted.
    #[cfg(test)]
    fn storage_len(&self) -> usize {
        self.text.len()
    }
}
