//! Character offset helpers
//!
//! Regex matches report byte offsets, while entities carry char offsets so that
//! spans stay meaningful for CJK text. `CharMap` converts between the two.

/// Byte/char offset table for one text chunk
#[derive(Debug, Clone)]
pub struct CharMap<'a> {
    text: &'a str,
    /// Byte offset of each char, plus `text.len()` as a sentinel
    byte_offsets: Vec<usize>,
}

impl<'a> CharMap<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    /// Number of chars in the text
    pub fn len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a byte offset (on a char boundary) to a char offset
    pub fn char_offset(&self, byte: usize) -> usize {
        match self.byte_offsets.binary_search(&byte) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        }
    }

    /// Convert a char offset to a byte offset, clamped to the text end
    pub fn byte_offset(&self, ch: usize) -> usize {
        self.byte_offsets[ch.min(self.len())]
    }

    /// Slice by char offsets, clamped to the text bounds
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.len());
        let start = start.min(end);
        &self.text[self.byte_offset(start)..self.byte_offset(end)]
    }

    /// Text within `radius` chars on either side of `[start, end)`
    pub fn window(&self, start: usize, end: usize, radius: usize) -> &'a str {
        self.slice(start.saturating_sub(radius), end.saturating_add(radius))
    }

    /// Char span of a byte range
    pub fn span(&self, byte_start: usize, byte_end: usize) -> (usize, usize) {
        (self.char_offset(byte_start), self.char_offset(byte_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_offsets() {
        let map = CharMap::new("hello world");
        assert_eq!(map.len(), 11);
        assert_eq!(map.char_offset(6), 6);
        assert_eq!(map.slice(6, 11), "world");
    }

    #[test]
    fn test_cjk_offsets() {
        let text = "账户在北京转账";
        let map = CharMap::new(text);
        assert_eq!(map.len(), 7);

        // "北京" starts at byte 9 (three 3-byte chars before it)
        let byte_start = text.find("北京").unwrap();
        assert_eq!(byte_start, 9);
        assert_eq!(map.span(byte_start, byte_start + "北京".len()), (3, 5));
        assert_eq!(map.slice(3, 5), "北京");
    }

    #[test]
    fn test_window_clamps() {
        let map = CharMap::new("abcdef");
        assert_eq!(map.window(2, 3, 10), "abcdef");
        assert_eq!(map.window(2, 3, 1), "bcd");
        assert_eq!(map.slice(4, 100), "ef");
    }
}
