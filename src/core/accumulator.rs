/// Folds raw reply fragments into the running reply text.
///
/// Fragment boundaries are chosen by the transport and may split a
/// multi-byte character. The incomplete tail is held back until the next
/// fragment completes it, so [`text`](Self::text) is always the longest
/// decodable prefix of everything received. Bytes that can never decode
/// become U+FFFD.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    pending: Vec<u8>,
    fragments: usize,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one fragment and returns the updated text.
    pub fn push(&mut self, fragment: &[u8]) -> &str {
        self.fragments += 1;
        self.pending.extend_from_slice(fragment);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    let head = &self.pending[consumed..consumed + valid_len];
                    if let Ok(valid) = std::str::from_utf8(head) {
                        self.text.push_str(valid);
                    }
                    consumed += valid_len;

                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed += bad;
                        }
                        // incomplete sequence at the end: wait for more bytes
                        None => break,
                    }
                }
            }
        }
        self.pending.drain(..consumed);

        &self.text
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn fragments(&self) -> usize {
        self.fragments
    }

    #[must_use]
    pub fn has_pending_bytes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Final text once the source is exhausted.
    #[must_use]
    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            tracing::debug!(
                bytes = self.pending.len(),
                "Reply ended inside a multi-byte character"
            );
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
        }
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_fragments_in_order() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.push(b"Hel"), "Hel");
        assert_eq!(acc.push(b"lo "), "Hello ");
        assert_eq!(acc.push(b"world"), "Hello world");
        assert_eq!(acc.fragments(), 3);
        assert_eq!(acc.finish(), "Hello world");
    }

    #[test]
    fn holds_back_split_multibyte_character() {
        // "fièvre" with the two-byte 'è' split across fragments
        let bytes = "fièvre".as_bytes();
        let split = 3;
        let mut acc = StreamAccumulator::new();

        assert_eq!(acc.push(&bytes[..split]), "fi");
        assert!(acc.has_pending_bytes());
        assert_eq!(acc.push(&bytes[split..]), "fièvre");
        assert!(!acc.has_pending_bytes());
    }

    #[test]
    fn reassembles_four_byte_character_fed_byte_by_byte() {
        let mut acc = StreamAccumulator::new();
        for b in "🩺 ok".as_bytes() {
            acc.push(std::slice::from_ref(b));
        }
        assert_eq!(acc.text(), "🩺 ok");
        assert_eq!(acc.fragments(), 7);
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.push(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn truncated_tail_becomes_replacement_on_finish() {
        let mut acc = StreamAccumulator::new();
        acc.push(b"dose: 5");
        acc.push(&"µ".as_bytes()[..1]);
        assert_eq!(acc.text(), "dose: 5");
        assert_eq!(acc.finish(), "dose: 5\u{FFFD}");
    }

    #[test]
    fn empty_fragments_are_counted_but_change_nothing() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.push(b""), "");
        assert_eq!(acc.fragments(), 1);
        assert_eq!(acc.finish(), "");
    }
}
