//! Newline-delimited record counting over chunked byte streams

/// Counts non-empty, newline-terminated records as chunks pass through.
///
/// A record may be split across any number of chunks. Only whether the
/// pending partial line holds non-blank content is carried between chunks,
/// plus at most three bytes of a UTF-8 character cut by a chunk edge, so
/// memory use does not depend on line length. Blank means Unicode
/// whitespace or a byte order mark. A non-empty remainder left at end of
/// stream counts as one final record.
#[derive(Debug, Default, Clone)]
pub struct RecordCounter {
    complete: u64,
    pending_content: bool,
    carry: Vec<u8>,
}

impl RecordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the stream
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.carry.is_empty() {
            self.feed_bytes(chunk);
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(chunk);
            self.feed_bytes(&joined);
        }
    }

    fn feed_bytes(&mut self, chunk: &[u8]) {
        let mut segments = chunk.split(|b| *b == b'\n');
        // split always yields at least one segment; the last one is unterminated
        let mut current = segments.next();
        for next in segments {
            if let Some(segment) = current {
                if self.pending_content || has_content(segment) {
                    self.complete += 1;
                }
                self.pending_content = false;
            }
            current = Some(next);
        }
        if let Some(tail) = current {
            let (whole, partial) = split_incomplete_char(tail);
            self.pending_content |= has_content(whole);
            self.carry = partial.to_vec();
        }
    }

    /// Records terminated so far
    pub fn complete(&self) -> u64 {
        self.complete
    }

    /// Final count, including a trailing unterminated record
    pub fn finish(self) -> u64 {
        let pending = self.pending_content || has_content(&self.carry);
        self.complete + u64::from(pending)
    }
}

fn has_content(segment: &[u8]) -> bool {
    if segment.is_ascii() {
        return segment.iter().any(|b| !b.is_ascii_whitespace() && *b != 0x0b);
    }
    String::from_utf8_lossy(segment)
        .chars()
        .any(|c| !c.is_whitespace() && c != '\u{feff}')
}

/// Split off a UTF-8 sequence cut short at the end of `bytes`
fn split_incomplete_char(bytes: &[u8]) -> (&[u8], &[u8]) {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => bytes.split_at(e.valid_up_to()),
        _ => (bytes, &[]),
    }
}

/// Count records in a fully buffered payload
pub fn count_records(payload: &[u8]) -> u64 {
    let mut counter = RecordCounter::new();
    counter.feed(payload);
    counter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn count_chunks(chunks: &[&str]) -> u64 {
        let mut counter = RecordCounter::new();
        for chunk in chunks {
            counter.feed(chunk.as_bytes());
        }
        counter.finish()
    }

    #[test]
    fn test_boundary_on_chunk_edge() {
        assert_eq!(count_chunks(&["a\nb\n", "c\n"]), 3);
        assert_eq!(count_records(b"a\nb\nc\n"), 3);
    }

    #[test]
    fn test_record_split_mid_line() {
        assert_eq!(count_chunks(&["{\"id\":", "1}\n{\"id\"", ":2}\n"]), 2);
    }

    #[test]
    fn test_trailing_remainder_counted_once() {
        assert_eq!(count_chunks(&["a\nb"]), 2);
        assert_eq!(count_chunks(&["a\n", "b", "c"]), 2);
    }

    #[test]
    fn test_blank_lines_ignored() {
        assert_eq!(count_chunks(&["\n\n", "  \r\n", "a\r\n", "\n"]), 1);
        assert_eq!(count_chunks(&[]), 0);
        assert_eq!(count_chunks(&["", "   "]), 0);
    }

    #[test]
    fn test_whitespace_only_tail_after_split_record() {
        // "x" then " " then newline is a single record
        assert_eq!(count_chunks(&["x", " ", "\n"]), 1);
        // whitespace tail that later gains content is still one record
        assert_eq!(count_chunks(&[" ", "y\n"]), 1);
    }

    #[test]
    fn test_unicode_blank_lines_ignored() {
        assert_eq!(count_records("\u{a0}\n\u{3000}\t\n\u{feff}\n".as_bytes()), 0);
        assert_eq!(count_records("\u{a0}x\u{a0}\n".as_bytes()), 1);
    }

    #[test]
    fn test_character_cut_by_chunk_edge() {
        let mut counter = RecordCounter::new();
        counter.feed(b"\xc2");
        counter.feed(b"\xa0\n");
        assert_eq!(counter.finish(), 0);

        let mut counter = RecordCounter::new();
        counter.feed(b"\xc3");
        counter.feed(b"\xa9\n");
        assert_eq!(counter.finish(), 1);

        let mut counter = RecordCounter::new();
        counter.feed(b"a\n\xe2\x80");
        assert_eq!(counter.complete(), 1);
        assert_eq!(counter.finish(), 2);
    }

    #[test]
    fn test_complete_excludes_pending() {
        let mut counter = RecordCounter::new();
        counter.feed(b"a\nb");
        assert_eq!(counter.complete(), 1);
        assert_eq!(counter.finish(), 2);
    }

    proptest! {
        #[test]
        fn prop_count_invariant_to_chunking(
            lines in proptest::collection::vec("[a-z \u{a0}\u{e9}]{0,6}", 0..20),
            trailing_newline in any::<bool>(),
            cuts in proptest::collection::vec(any::<usize>(), 0..10),
        ) {
            let mut payload = lines.join("\n");
            if trailing_newline {
                payload.push('\n');
            }
            let bytes = payload.as_bytes();
            let expected = count_records(bytes);

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            points.sort_unstable();

            let mut counter = RecordCounter::new();
            let mut start = 0;
            for point in points {
                counter.feed(&bytes[start..point]);
                start = point;
            }
            counter.feed(&bytes[start..]);

            prop_assert_eq!(counter.finish(), expected);
        }
    }
}
