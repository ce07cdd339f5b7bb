//! Case-insensitive phrase and regex matchers.

use regex_lite::{NoExpand, Regex};
use std::ops::Range;

/// A compiled text matcher.
///
/// Literal phrases match case-insensitively and tolerate any run of
/// whitespace between words, so "Unlimited\n liability" still matches
/// "unlimited liability".
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    regex: Regex,
}

impl PatternMatcher {
    /// Compile a literal phrase.
    pub fn literal(phrase: &str) -> Result<Self, String> {
        let words: Vec<String> = phrase.split_whitespace().map(regex_lite::escape).collect();
        if words.is_empty() {
            return Err("pattern cannot be empty".into());
        }
        let regex = Regex::new(&format!("(?i){}", words.join(r"\s+"))).map_err(|e| e.to_string())?;
        Ok(Self {
            source: phrase.trim().to_string(),
            regex,
        })
    }

    /// Compile a regular expression (always case-insensitive).
    pub fn regex(pattern: &str) -> Result<Self, String> {
        if pattern.trim().is_empty() {
            return Err("pattern cannot be empty".into());
        }
        let regex = Regex::new(&format!("(?i){pattern}")).map_err(|e| e.to_string())?;
        if regex.is_match("") {
            return Err(format!("pattern '{pattern}' matches the empty string"));
        }
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn new(pattern: &str, is_regex: bool) -> Result<Self, String> {
        if is_regex {
            Self::regex(pattern)
        } else {
            Self::literal(pattern)
        }
    }

    /// The pattern as written in the ruleset.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Byte spans of every non-overlapping match, left to right.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        self.regex.find_iter(text).map(|m| m.range()).collect()
    }

    /// First matched substring, if any.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex.find(text).map(|m| m.as_str())
    }

    /// Replace every match with `replacement` (taken literally).
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        self.regex.replace_all(text, NoExpand(replacement)).into_owned()
    }

    /// Delete every match, swallowing one adjoining space so that
    /// "a X b" becomes "a b" rather than "a  b".
    pub fn remove_all(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.regex.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            let mut end = m.end();
            if (out.is_empty() || out.ends_with(' ')) && text[end..].starts_with(' ') {
                end += 1;
            }
            last = end;
        }
        out.push_str(&text[last..]);
        out
    }
}
