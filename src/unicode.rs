//! Unicode code-point classification for Korean text and emoji.
//!
//! The jamo-only check is a pure string-class test: an input made entirely
//! of standalone jamo (plus whitespace, digits, and common punctuation) is a
//! known attack vector because no composed syllable survives normalization.

/// Hangul Jamo block.
pub const HANGUL_JAMO: (u32, u32) = (0x1100, 0x11FF);
/// Hangul Compatibility Jamo block.
pub const HANGUL_COMPAT_JAMO: (u32, u32) = (0x3130, 0x318F);
/// Hangul Jamo Extended-A block.
pub const HANGUL_JAMO_EXT_A: (u32, u32) = (0xA960, 0xA97F);
/// Hangul Jamo Extended-B block.
pub const HANGUL_JAMO_EXT_B: (u32, u32) = (0xD7B0, 0xD7FF);
/// Composed Hangul syllables.
pub const HANGUL_SYLLABLES: (u32, u32) = (0xAC00, 0xD7A3);

const ZERO_WIDTH_JOINER: u32 = 0x200D;

const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F), // Emoticons
    (0x1F300, 0x1F5FF), // Misc Symbols and Pictographs
    (0x1F680, 0x1F6FF), // Transport and Map
    (0x1F1E0, 0x1F1FF), // Flags
    (0x2600, 0x26FF),   // Misc symbols
    (0x2700, 0x27BF),   // Dingbats
    (0xFE00, 0xFE0F),   // Variation Selectors
    (0x1F900, 0x1F9FF), // Supplemental Symbols and Pictographs
    (0x1FA00, 0x1FA6F), // Chess Symbols
    (0x1FA70, 0x1FAFF), // Symbols and Pictographs Extended-A
];

fn in_range(cp: u32, range: (u32, u32)) -> bool {
    cp >= range.0 && cp <= range.1
}

/// True for any standalone jamo code point (not a composed syllable).
pub fn is_jamo(c: char) -> bool {
    let cp = c as u32;
    in_range(cp, HANGUL_JAMO)
        || in_range(cp, HANGUL_COMPAT_JAMO)
        || in_range(cp, HANGUL_JAMO_EXT_A)
        || in_range(cp, HANGUL_JAMO_EXT_B)
}

/// True for a composed Hangul syllable.
pub fn is_hangul_syllable(c: char) -> bool {
    in_range(c as u32, HANGUL_SYLLABLES)
}

/// True if the code point belongs to one of the emoji blocks or is the
/// zero-width joiner used to compose emoji sequences.
pub fn is_emoji_codepoint(c: char) -> bool {
    let cp = c as u32;
    cp == ZERO_WIDTH_JOINER || EMOJI_RANGES.iter().any(|r| in_range(cp, *r))
}

/// True if the text contains any emoji code point.
pub fn contains_emoji(text: &str) -> bool {
    text.chars().any(is_emoji_codepoint)
}

fn is_jamo_filler(c: char) -> bool {
    // Whitespace, ASCII digits, and common ASCII punctuation are allowed in
    // a jamo-only input without breaking the classification.
    c.is_whitespace() || c.is_ascii_digit() || c.is_ascii_punctuation()
}

/// True if the trimmed text contains at least one jamo and nothing outside
/// the jamo classes plus whitespace/digits/punctuation. Any composed
/// syllable makes this false.
pub fn is_jamo_only(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut saw_jamo = false;
    for c in trimmed.chars() {
        if is_jamo(c) {
            saw_jamo = true;
        } else if !is_jamo_filler(c) {
            return false;
        }
    }
    saw_jamo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jamo_only_basic() {
        assert!(is_jamo_only("ㄱㄴㄷ"));
        assert!(is_jamo_only("ㅏㅑㅓ"));
        assert!(!is_jamo_only("안녕"));
        assert!(!is_jamo_only("hello"));
        assert!(!is_jamo_only(""));
        assert!(!is_jamo_only("   "));
    }

    #[test]
    fn test_jamo_only_invariant_under_spaces_and_digits() {
        assert!(is_jamo_only("ㄱㄴㄷ   123"));
        assert!(is_jamo_only("ㄱ ㄴ ㄷ!!!"));
        assert!(is_jamo_only("12 ㄱㄴㄷ 34"));
    }

    #[test]
    fn test_single_syllable_defeats_jamo_only() {
        assert!(!is_jamo_only("ㄱㄴㄷ가"));
        assert!(!is_jamo_only("가"));
    }

    #[test]
    fn test_digits_alone_not_jamo_only() {
        assert!(!is_jamo_only("123"));
        assert!(!is_jamo_only("!?."));
    }

    #[test]
    fn test_jamo_extended_blocks() {
        // U+1100 (choseong kiyeok) and U+A960 (extended-A)
        assert!(is_jamo('\u{1100}'));
        assert!(is_jamo('\u{A960}'));
        assert!(is_jamo('\u{D7B0}'));
        assert!(!is_jamo('가'));
    }

    #[test]
    fn test_emoji_detection() {
        assert!(contains_emoji("hello 😀 world"));
        assert!(contains_emoji("check ✈ this")); // U+2708, Dingbats-adjacent range
        assert!(contains_emoji("a\u{200D}b")); // ZWJ counts
        assert!(!contains_emoji("plain text 123 한국어"));
    }

    #[test]
    fn test_emoji_range_boundaries() {
        assert!(is_emoji_codepoint('\u{1F600}'));
        assert!(is_emoji_codepoint('\u{1F64F}'));
        assert!(is_emoji_codepoint('\u{2600}'));
        assert!(is_emoji_codepoint('\u{FE0F}'));
        assert!(is_emoji_codepoint('\u{1FAFF}'));
        assert!(!is_emoji_codepoint('\u{25FF}')); // just below 0x2600
        assert!(!is_emoji_codepoint('A'));
    }

    #[test]
    fn test_hangul_syllable_range() {
        assert!(is_hangul_syllable('가'));
        assert!(is_hangul_syllable('힣'));
        assert!(!is_hangul_syllable('ㄱ'));
    }
}
