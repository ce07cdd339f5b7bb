//! Token estimation.
//!
//! Uses a byte-length heuristic: ~4 UTF-8 bytes per token, so non-ASCII text
//! counts higher than its character count suggests. It does not track any
//! vendor tokenizer exactly; budgeting only needs the same counter to be used
//! everywhere a total is checked.

use procuresense_core::TokenCounter;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes of UTF-8. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// The default [`TokenCounter`], backed by [`estimate_tokens`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenCounter;

impl TokenCounter for ByteTokenCounter {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(ByteTokenCounter.estimate(""), 0);
    }

    #[test]
    fn four_bytes_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_bytes_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_bytes() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn monotonic_in_length() {
        let mut previous = 0;
        for len in 0..64 {
            let current = estimate_tokens(&"x".repeat(len));
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn counts_bytes_not_chars() {
        // Two chars, four bytes.
        assert_eq!(estimate_tokens("éé"), 1);
        // Three chars, nine bytes.
        assert_eq!(estimate_tokens("€€€"), 3);
    }

    #[test]
    fn estimate_all_sums() {
        let total = ByteTokenCounter.estimate_all(["test", "hello", ""]);
        assert_eq!(total, 3);
    }
}
