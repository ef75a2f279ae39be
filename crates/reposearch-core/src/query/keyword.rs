//! Keyword interpretation shared by every backend.

use reposearch_types::SearchMode;

/// Largest edit distance fuzzy matching will use.
pub const MAX_FUZZINESS: u8 = 2;

/// Edit distance allowed for a fuzzy keyword: `min(2, len / 4)`.
///
/// Non-ASCII keywords get 0, since distance per byte is meaningless for
/// most non-Latin scripts.
pub fn fuzziness(keyword: &str) -> u8 {
    if !keyword.is_ascii() {
        return 0;
    }
    (keyword.len() / 4).min(MAX_FUZZINESS as usize) as u8
}

/// Strip surrounding double quotes, if the keyword is a quoted phrase.
pub fn quoted_phrase(keyword: &str) -> Option<&str> {
    let inner = keyword.strip_prefix('"')?.strip_suffix('"')?;
    if inner.trim().is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// A keyword resolved to the mode that will actually run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub text: String,
    pub mode: SearchMode,
    /// Edit distance, only meaningful in fuzzy mode
    pub fuzziness: u8,
}

impl Keyword {
    /// Resolve a raw keyword. Returns `None` for a blank keyword.
    ///
    /// A double-quoted keyword is always an exact phrase. Fuzzy keywords
    /// whose allowed distance is 0 fall back to words matching.
    pub fn parse(raw: &str, mode: SearchMode) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if matches!(mode, SearchMode::Exact | SearchMode::Words | SearchMode::Fuzzy) {
            if let Some(phrase) = quoted_phrase(raw) {
                return Some(Self {
                    text: phrase.to_string(),
                    mode: SearchMode::Exact,
                    fuzziness: 0,
                });
            }
        }

        let (mode, fuzziness) = match mode {
            SearchMode::Fuzzy => match fuzziness(raw) {
                0 => (SearchMode::Words, 0),
                d => (SearchMode::Fuzzy, d),
            },
            other => (other, 0),
        };

        Some(Self {
            text: raw.to_string(),
            mode,
            fuzziness,
        })
    }

    /// Whitespace separated tokens of the keyword.
    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Alphanumeric terms of the keyword, the way code tokenizers split text.
    pub fn terms(&self) -> Vec<String> {
        split_terms(&self.text)
    }
}

/// Split text on anything that is not alphanumeric, lowercasing the terms.
pub fn split_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
