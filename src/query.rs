use std::fmt;

/// Folds text to lowercase words separated by single spaces. Punctuation other than
/// `%` becomes a word break, so `"Hewlett-Packard"` and `"hewlett packard"` agree.
pub fn normalize_words(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '%' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// An incoming query in the forms the classifier needs.
///
/// Phrase checks run against a space-padded word form, so `"bm"` matches the word
/// `bm` but not `ibm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryText {
    raw: String,
    lower: String,
    padded: String,
}

impl QueryText {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        Self {
            raw: trimmed.to_string(),
            lower: trimmed.to_lowercase(),
            padded: format!(" {} ", normalize_words(trimmed)),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased original text, punctuation intact.
    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Normalized words without the padding.
    pub fn words(&self) -> &str {
        self.padded.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.padded.trim().is_empty()
    }

    /// Whole-word phrase match.
    pub fn has_phrase(&self, phrase: &str) -> bool {
        let needle = normalize_words(phrase);
        !needle.is_empty() && self.padded.contains(&format!(" {} ", needle))
    }

    pub fn has_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|phrase| self.has_phrase(phrase))
    }

    /// Position (in the padded form) of the first occurrence of `phrase`.
    pub fn phrase_position(&self, phrase: &str) -> Option<usize> {
        let needle = normalize_words(phrase);
        if needle.is_empty() {
            return None;
        }
        self.padded.find(&format!(" {} ", needle))
    }

    /// A copy with every occurrence of `phrases` blanked out. Longer phrases should
    /// come first so that e.g. "group channel champ" is removed before "channel champ".
    pub fn without(&self, phrases: &[&str]) -> QueryText {
        let mut padded = self.padded.clone();
        for phrase in phrases {
            let needle = normalize_words(phrase);
            if needle.is_empty() {
                continue;
            }
            let pattern = format!(" {} ", needle);
            while padded.contains(&pattern) {
                padded = padded.replacen(&pattern, " ", 1);
            }
        }
        QueryText {
            raw: self.raw.clone(),
            lower: self.lower.clone(),
            padded,
        }
    }

    /// The words of `normalized` as the user typed them, case and all.
    pub fn original_spelling(&self, normalized: &str) -> Option<String> {
        let wanted: Vec<&str> = normalized.split_whitespace().collect();
        if wanted.is_empty() {
            return None;
        }
        let tokens: Vec<&str> = self
            .raw
            .split(|c: char| !(c.is_alphanumeric() || c == '%'))
            .filter(|token| !token.is_empty())
            .collect();
        tokens
            .windows(wanted.len())
            .find(|window| {
                window
                    .iter()
                    .zip(&wanted)
                    .all(|(token, word)| token.to_lowercase() == *word)
            })
            .map(|window| window.join(" "))
    }

    /// Words following the first occurrence of any of `anchors`.
    pub fn words_after(&self, anchors: &[&str]) -> Vec<String> {
        let best = anchors
            .iter()
            .filter_map(|anchor| {
                let needle = normalize_words(anchor);
                self.phrase_position(anchor)
                    .map(|position| position + needle.len() + 1)
            })
            .min();

        match best {
            Some(end) => self.padded[end..]
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for QueryText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_words() {
        assert_eq!(normalize_words("  Hewlett-Packard  (India) "), "hewlett packard india");
        assert_eq!(normalize_words("GM% for FY23?"), "gm% for fy23");
    }

    #[test]
    fn test_phrase_matching_is_word_bounded() {
        let query = QueryText::new("Revenue of IBM for BM Ravi");
        assert!(query.has_phrase("bm"));
        assert!(query.has_phrase("ibm"));
        assert!(!query.has_phrase("ib"));
        assert!(query.has_phrase("revenue of"));
    }

    #[test]
    fn test_without_strips_compounds() {
        let query = QueryText::new("channel revenue for group channel champ Ravi");
        let stripped = query.without(&["group channel champ", "channel champ"]);
        assert!(stripped.has_phrase("channel"));
        assert!(!stripped.has_phrase("channel champ"));

        let only_champ = QueryText::new("channel champ ravi").without(&["channel champ"]);
        assert!(!only_champ.has_phrase("channel"));
    }

    #[test]
    fn test_words_after() {
        let query = QueryText::new("revenue for partner Zeta Corp");
        assert_eq!(query.words_after(&["partner"]), vec!["zeta", "corp"]);
        assert!(query.words_after(&["oem"]).is_empty());
    }

    #[test]
    fn test_original_spelling() {
        let query = QueryText::new("Revenue for partner Zeta-Corp?");
        assert_eq!(query.original_spelling("zeta corp"), Some("Zeta Corp".to_string()));
        assert_eq!(query.original_spelling("acme"), None);
        assert_eq!(query.original_spelling(""), None);
    }
}
