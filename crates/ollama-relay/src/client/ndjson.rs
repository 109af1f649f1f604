/// Incremental splitter for newline-delimited JSON over arbitrary chunks.
///
/// Relayed chunk boundaries follow the upstream's transmission, not line
/// boundaries, so a line may arrive in pieces or several lines in one chunk.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without the newline.
    /// Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Take whatever trails the last newline once the input has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    pub fn has_partial_line(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_multiple_lines() {
        let mut decoder = NdjsonDecoder::new();
        let lines = decoder.push(b"{\"a\":1}\n{\"b\":2}\n");

        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert!(!decoder.has_partial_line());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = NdjsonDecoder::new();

        assert!(decoder.push(b"{\"resp").is_empty());
        assert!(decoder.has_partial_line());
        assert!(decoder.push(b"onse\":\"hi\"").is_empty());

        let lines = decoder.push(b"}\n{\"done\"");
        assert_eq!(lines, vec!["{\"response\":\"hi\"}"]);

        assert_eq!(decoder.finish(), Some("{\"done\"".to_string()));
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let mut decoder = NdjsonDecoder::new();
        let lines = decoder.push(b"\n{\"a\":1}\r\n\r\n  \n{\"b\":2}\n");

        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "{\"response\":\"ü\"}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0x80).unwrap() + 1;

        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(&text[..split]).is_empty());
        let lines = decoder.push(&text[split..]);

        assert_eq!(lines, vec!["{\"response\":\"ü\"}"]);
    }

    #[test]
    fn test_finish_on_empty_buffer() {
        let mut decoder = NdjsonDecoder::new();
        decoder.push(b"{\"a\":1}\n");
        assert_eq!(decoder.finish(), None);
    }
}
