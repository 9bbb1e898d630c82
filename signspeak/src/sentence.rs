//! The sentence being assembled from committed gesture words.

/// Spoken when the sentence is empty.
pub const EMPTY_SENTENCE_FALLBACK: &str = "Make a sentence first.";

/// Ordered list of committed words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<String>,
}

impl Sentence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `word` unless it equals the current last word.
    /// Returns true if the sentence changed.
    pub fn append(&mut self, word: &str) -> bool {
        if self.words.last().map(String::as_str) == Some(word) {
            return false;
        }
        self.words.push(word.to_string());
        true
    }

    /// Remove the last word.  No-op on an empty sentence.
    pub fn delete_last(&mut self) -> Option<String> {
        self.words.pop()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    /// What speech output should say: the text, or the fallback phrase.
    pub fn spoken_text(&self) -> String {
        if self.words.is_empty() {
            EMPTY_SENTENCE_FALLBACK.to_string()
        } else {
            self.text()
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Sentence {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_skips_repeat_of_last_word() {
        let mut s: Sentence = ["HELLO"].into_iter().collect();
        assert!(!s.append("HELLO"));
        assert_eq!(s.words(), &["HELLO".to_string()]);
    }

    #[test]
    fn test_append_allows_non_adjacent_repeat() {
        let mut s = Sentence::new();
        assert!(s.append("A"));
        assert!(s.append("B"));
        assert!(s.append("A"));
        assert_eq!(s.text(), "A B A");
    }

    #[test]
    fn test_delete_last() {
        let mut s: Sentence = ["A", "B"].into_iter().collect();
        assert_eq!(s.delete_last().as_deref(), Some("B"));
        assert_eq!(s.words(), &["A".to_string()]);
    }

    #[test]
    fn test_delete_last_on_empty() {
        let mut s = Sentence::new();
        assert_eq!(s.delete_last(), None);
        assert!(s.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut s: Sentence = ["I", "LOVE YOU"].into_iter().collect();
        s.clear();
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_spoken_text_fallback() {
        assert_eq!(Sentence::new().spoken_text(), EMPTY_SENTENCE_FALLBACK);
        let s: Sentence = ["THANK YOU", "HELP"].into_iter().collect();
        assert_eq!(s.spoken_text(), "THANK YOU HELP");
    }
}
