/// Little-endian 32-bit word view over an incrementally fed byte stream.
///
/// Chunks may split words at any byte; the partial tail is carried until
/// the next chunk completes it. Any bytes that never form a whole word
/// are reported through [`WordBuffer::trailing_bytes`] and dropped.
#[derive(Debug, Default)]
pub struct WordBuffer {
    words: Vec<u32>,
    tail: Vec<u8>,
}

impl WordBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, completing any partial word left by earlier chunks.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.tail.extend_from_slice(chunk);
        let complete = self.tail.len() / 4 * 4;
        for quad in self.tail[..complete].chunks_exact(4) {
            self.words
                .push(u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]));
        }
        self.tail.drain(..complete);
    }

    /// The word at `index`, or `None` past the end of the buffer.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u32> {
        self.words.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Bytes fed so far that do not fill a complete word.
    #[must_use]
    pub fn trailing_bytes(&self) -> usize {
        self.tail.len()
    }
}
