//! Unicode canonicalization for context matching
//!
//! Models paste curly quotes, long dashes, and non-breaking spaces into
//! patches; the file on disk usually has the ASCII versions. Matching runs
//! over NFC-normalized text with these equivalences collapsed.

use unicode_normalization::UnicodeNormalization;

/// Hyphen and dash variants collapsed to '-'.
const HYPHENS: &[char] = &[
    '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2212}',
];

/// Double-quote variants collapsed to '"'.
const DOUBLE_QUOTES: &[char] = &['\u{201C}', '\u{201D}', '\u{201E}', '\u{00AB}', '\u{00BB}'];

/// Single-quote variants collapsed to '\''.
const SINGLE_QUOTES: &[char] = &['\u{2018}', '\u{2019}', '\u{201B}'];

/// Non-breaking space variants collapsed to ' '.
const SPACES: &[char] = &['\u{00A0}', '\u{202F}'];

/// Canonicalize a line (or joined block) for comparison: NFC, punctuation
/// equivalences, ellipsis expansion, zero-width stripping, and superscript
/// digits mapped to ASCII so things like O(n²) still match O(n2).
pub fn canon(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.nfc() {
        match ch {
            c if HYPHENS.contains(&c) => out.push('-'),
            c if DOUBLE_QUOTES.contains(&c) => out.push('"'),
            c if SINGLE_QUOTES.contains(&c) => out.push('\''),
            c if SPACES.contains(&c) => out.push(' '),
            '\u{2026}' => out.push_str("..."),
            '\u{200B}' | '\u{FEFF}' => {}
            '\u{2070}' => out.push('0'),
            '\u{00B9}' => out.push('1'),
            '\u{00B2}' => out.push('2'),
            '\u{00B3}' => out.push('3'),
            '\u{2074}' => out.push('4'),
            '\u{2075}' => out.push('5'),
            '\u{2076}' => out.push('6'),
            '\u{2077}' => out.push('7'),
            '\u{2078}' => out.push('8'),
            '\u{2079}' => out.push('9'),
            c => out.push(c),
        }
    }
    out
}
