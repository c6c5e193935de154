//! Text normalization applied before rule evaluation.

use unicode_normalization::UnicodeNormalization;

/// Unicode Cf (format) ranges, including zero-width characters and joiners.
/// Cc (control) is covered by `char::is_control`.
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

fn is_format_char(c: char) -> bool {
    let cp = c as u32;
    FORMAT_RANGES.iter().any(|(lo, hi)| cp >= *lo && cp <= *hi)
}

/// Normalizer names recognized in rule-pack files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    Nfkc,
    StripZeroWidth,
}

impl Normalizer {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nfkc" => Some(Normalizer::Nfkc),
            "strip_zero_width" => Some(Normalizer::StripZeroWidth),
            _ => None,
        }
    }
}

/// Apply NFKC normalization.
pub fn normalize_nfkc(text: &str) -> String {
    text.nfkc().collect()
}

/// Remove format (Cf) and control (Cc) characters.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() && !is_format_char(*c))
        .collect()
}

/// Apply normalizers in order. The default composition is NFKC followed by
/// format/control stripping.
pub fn normalize_text(text: &str, normalizers: &[Normalizer]) -> String {
    let mut result = text.to_string();
    for norm in normalizers {
        result = match norm {
            Normalizer::Nfkc => normalize_nfkc(&result),
            Normalizer::StripZeroWidth => strip_control_chars(&result),
        };
    }
    result
}

/// Default normalizer composition.
pub const DEFAULT_NORMALIZERS: &[Normalizer] = &[Normalizer::Nfkc, Normalizer::StripZeroWidth];
