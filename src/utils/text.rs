use rand::seq::SliceRandom;
use rand::Rng;

const PLAIN_CHARS: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";
const SYMBOL_CHARS: &[char] = &[
    '∑', '∏', '∫', '∂', '∆', '∇', '√', '∞', '≠', '≤', '≥', '±', '×', '÷', '∈', '∉', '∪', '∩', '⊂',
    '⊃', '⊆', '⊇', '∧', '∨', '¬', '→', '←', '↑', '↓', '↔',
];

pub const RANDOM_TEXT_LEN: usize = 50;
const SYMBOL_PROBABILITY: f64 = 0.2;

pub fn reverse(text: &str) -> String {
    text.chars().rev().collect()
}

/// Sample input for the hash form: mostly printable ASCII with the odd
/// mathematical symbol mixed in.
pub fn random_text(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            if rng.gen_bool(SYMBOL_PROBABILITY) {
                *SYMBOL_CHARS.choose(&mut rng).unwrap_or(&'∑')
            } else {
                char::from(*PLAIN_CHARS.choose(&mut rng).unwrap_or(&b'a'))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse() {
        assert_eq!(reverse("abcd"), "dcba");
        assert_eq!(reverse("a→b"), "b→a");
    }

    #[test]
    fn random_text_has_requested_char_count() {
        let text = random_text(RANDOM_TEXT_LEN);
        assert_eq!(text.chars().count(), RANDOM_TEXT_LEN);
        assert!(text
            .chars()
            .all(|c| (c.is_ascii() && PLAIN_CHARS.contains(&(c as u8))) || SYMBOL_CHARS.contains(&c)));
    }

    #[test]
    fn random_text_varies() {
        assert_ne!(random_text(RANDOM_TEXT_LEN), random_text(RANDOM_TEXT_LEN));
    }
}
