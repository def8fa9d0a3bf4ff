//! Text transcoding for ESC/POS printers
//!
//! Thermal printers render text through a selectable code page. This module
//! maps UTF-8 strings onto the profile's active code page:
//! - ASCII passes through unchanged (it is shared by every code page)
//! - Other characters are encoded through the code page when possible
//! - Unmapped characters fall back to the ASCII folding table (`á` → `a`)
//! - Anything left becomes the placeholder byte (`?` by default)
//!
//! Encoding never fails. It also provides column-width helpers for layout,
//! measured in printed cells (encoded bytes).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::profile::{CapabilityProfile, CodePage};

/// Byte written for characters that cannot be represented at all
pub const DEFAULT_PLACEHOLDER: u8 = b'?';

/// Character set behind a printer code page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    /// 7-bit ASCII only
    #[serde(rename = "ascii")]
    Ascii,
    /// IBM PC code page 437 (printer power-on default)
    #[serde(rename = "cp437")]
    Cp437,
    #[serde(rename = "cp866")]
    Cp866,
    #[serde(rename = "windows-1250")]
    Windows1250,
    #[serde(rename = "windows-1251")]
    Windows1251,
    #[serde(rename = "windows-1252")]
    Windows1252,
    #[serde(rename = "iso-8859-2")]
    Iso8859_2,
    #[serde(rename = "iso-8859-15")]
    Iso8859_15,
    /// Double-byte Chinese encoding, entered with `FS &`
    #[serde(rename = "gbk")]
    Gbk,
}

impl Charset {
    /// Whether the printer must be switched into double-byte (Kanji) mode
    pub fn is_double_byte(self) -> bool {
        matches!(self, Charset::Gbk)
    }

    fn encoding(self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Charset::Ascii | Charset::Cp437 => None,
            Charset::Cp866 => Some(encoding_rs::IBM866),
            Charset::Windows1250 => Some(encoding_rs::WINDOWS_1250),
            Charset::Windows1251 => Some(encoding_rs::WINDOWS_1251),
            Charset::Windows1252 => Some(encoding_rs::WINDOWS_1252),
            Charset::Iso8859_2 => Some(encoding_rs::ISO_8859_2),
            Charset::Iso8859_15 => Some(encoding_rs::ISO_8859_15),
            Charset::Gbk => Some(encoding_rs::GBK),
        }
    }

    /// Encode one character, appending its bytes to `out`.
    ///
    /// Returns `false` (and leaves `out` untouched) when the character has no
    /// representation in this charset.
    pub fn encode_char(self, ch: char, out: &mut Vec<u8>) -> bool {
        if ch.is_ascii() {
            out.push(ch as u8);
            return true;
        }
        if self == Charset::Cp437 {
            return match cp437_byte(ch) {
                Some(b) => {
                    out.push(b);
                    true
                }
                None => false,
            };
        }
        let Some(encoding) = self.encoding() else {
            return false;
        };
        let mut buf = [0u8; 4];
        let (bytes, _, had_errors) = encoding.encode(ch.encode_utf8(&mut buf));
        if had_errors {
            return false;
        }
        // A lone high byte (GBK maps € to 0x80) is not printable in Chinese mode
        if self.is_double_byte() && bytes.len() == 1 && bytes[0] >= 0x80 {
            return false;
        }
        out.extend_from_slice(&bytes);
        true
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Charset::Ascii => "ascii",
            Charset::Cp437 => "cp437",
            Charset::Cp866 => "cp866",
            Charset::Windows1250 => "windows-1250",
            Charset::Windows1251 => "windows-1251",
            Charset::Windows1252 => "windows-1252",
            Charset::Iso8859_2 => "iso-8859-2",
            Charset::Iso8859_15 => "iso-8859-15",
            Charset::Gbk => "gbk",
        };
        f.write_str(name)
    }
}

/// Upper half of code page 437 (bytes 0x80–0xFF)
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

fn cp437_byte(ch: char) -> Option<u8> {
    CP437_HIGH
        .iter()
        .position(|&c| c == ch)
        .map(|idx| 0x80 + idx as u8)
}

/// ASCII fallbacks for characters missing from the active code page.
///
/// An empty replacement drops the character.
#[rustfmt::skip]
pub const FOLD_TABLE: &[(char, &str)] = &[
    // Grave
    ('à', "a"), ('è', "e"), ('ì', "i"), ('ò', "o"), ('ù', "u"),
    ('À', "A"), ('È', "E"), ('Ì', "I"), ('Ò', "O"), ('Ù', "U"),
    // Acute
    ('á', "a"), ('é', "e"), ('í', "i"), ('ó', "o"), ('ú', "u"),
    ('Á', "A"), ('É', "E"), ('Í', "I"), ('Ó', "O"), ('Ú', "U"),
    // Circumflex
    ('â', "a"), ('ê', "e"), ('î', "i"), ('ô', "o"), ('û', "u"),
    ('Â', "A"), ('Ê', "E"), ('Î', "I"), ('Ô', "O"), ('Û', "U"),
    // Diaeresis
    ('ä', "a"), ('ë', "e"), ('ï', "i"), ('ö', "o"), ('ü', "u"), ('ÿ', "y"),
    ('Ä', "A"), ('Ë', "E"), ('Ï', "I"), ('Ö', "O"), ('Ü', "U"),
    // Tilde and ring
    ('ã', "a"), ('õ', "o"), ('Ã', "A"), ('Õ', "O"), ('å', "a"), ('Å', "A"),
    // Iberian and German letters
    ('ç', "c"), ('Ç', "C"), ('ñ', "n"), ('Ñ', "N"), ('ß', "ss"),
    ('º', "o"), ('ª', "a"), ('¿', "?"), ('¡', "!"),
    // Symbols
    ('°', ""), ('€', "EUR"),
    // Typographic punctuation
    ('‘', "'"), ('’', "'"), ('“', "\""), ('”', "\""),
    ('–', "-"), ('—', "-"), ('…', "..."),
];

/// Look up the ASCII fallback for a character
pub fn fold_char(ch: char) -> Option<&'static str> {
    FOLD_TABLE
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, replacement)| *replacement)
}

/// Replace every character found in [`FOLD_TABLE`] with its ASCII fallback.
///
/// Characters outside the table are kept as they are.
pub fn fold_special_chars(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match fold_char(ch) {
            Some(replacement) => result.push_str(replacement),
            None => result.push(ch),
        }
    }
    result
}

/// Encodes text for one code page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcoder {
    code_page: CodePage,
    placeholder: u8,
}

impl Transcoder {
    pub fn new(code_page: CodePage) -> Self {
        Self {
            code_page,
            placeholder: DEFAULT_PLACEHOLDER,
        }
    }

    /// Transcoder for the profile's active code page
    pub fn for_profile(profile: &CapabilityProfile) -> Self {
        Self::new(profile.active_code_page())
    }

    /// Use a different byte for unrepresentable characters
    pub fn with_placeholder(mut self, placeholder: u8) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn code_page(&self) -> CodePage {
        self.code_page
    }

    pub fn placeholder(&self) -> u8 {
        self.placeholder
    }

    /// Encode a string. Never fails.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len());
        let mut substituted = 0usize;
        for ch in text.chars() {
            if !self.encode_char(ch, &mut out) {
                substituted += 1;
            }
        }
        if substituted > 0 {
            debug!(
                charset = %self.code_page.charset,
                substituted,
                "characters outside the code page were folded or replaced"
            );
        }
        out
    }

    /// Returns `false` when the character needed the fold table or placeholder
    fn encode_char(&self, ch: char, out: &mut Vec<u8>) -> bool {
        if self.code_page.charset.encode_char(ch, out) {
            return true;
        }
        match fold_char(ch) {
            Some(replacement) => out.extend_from_slice(replacement.as_bytes()),
            None => out.push(self.placeholder),
        }
        false
    }

    /// Printed width of a string in cells
    ///
    /// Double-byte characters occupy two cells.
    pub fn width(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Truncate a string to fit within `max_width` cells
    pub fn truncate(&self, text: &str, max_width: usize) -> String {
        let mut width = 0;
        let mut result = String::new();
        let mut scratch = Vec::with_capacity(4);
        for ch in text.chars() {
            scratch.clear();
            self.encode_char(ch, &mut scratch);
            if width + scratch.len() > max_width {
                break;
            }
            result.push(ch);
            width += scratch.len();
        }
        result
    }

    /// Pad a string with spaces to exactly `width` cells
    ///
    /// If the string is longer than the width, it will be truncated.
    pub fn pad(&self, text: &str, width: usize, align_right: bool) -> String {
        let current = self.width(text);
        if current >= width {
            return self.truncate(text, width);
        }
        let spaces = " ".repeat(width - current);
        if align_right {
            format!("{spaces}{text}")
        } else {
            format!("{text}{spaces}")
        }
    }
}

/// Encode text with the profile's active code page and default placeholder
pub fn encode(text: &str, profile: &CapabilityProfile) -> Vec<u8> {
    Transcoder::for_profile(profile).encode(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii() -> Transcoder {
        Transcoder::new(CodePage::new(0, Charset::Ascii))
    }

    fn cp437() -> Transcoder {
        Transcoder::new(CodePage::new(0, Charset::Cp437))
    }

    #[test]
    fn test_every_fold_entry_is_applied() {
        let t = ascii();
        for (ch, replacement) in FOLD_TABLE {
            assert_eq!(
                t.encode(&ch.to_string()),
                replacement.as_bytes(),
                "fold of {ch:?}"
            );
            assert_eq!(fold_char(*ch), Some(*replacement));
        }
    }

    #[test]
    fn test_fold_table_targets_are_ascii_and_unique() {
        for (i, (ch, replacement)) in FOLD_TABLE.iter().enumerate() {
            assert!(replacement.is_ascii(), "{ch:?} folds to non-ASCII");
            assert!(
                FOLD_TABLE[i + 1..].iter().all(|(other, _)| other != ch),
                "{ch:?} listed twice"
            );
        }
    }

    #[test]
    fn test_fold_documented_examples() {
        assert_eq!(fold_char('á'), Some("a"));
        assert_eq!(fold_char('Ñ'), Some("N"));
        assert_eq!(fold_char('°'), Some(""));
        assert_eq!(fold_char('ß'), Some("ss"));
        assert_eq!(fold_char('x'), None);
        assert_eq!(fold_special_chars("Café Ñandú 20°C"), "Cafe Nandu 20C");
    }

    #[test]
    fn test_code_page_wins_over_fold() {
        // CP437 has á at 0xA0, so no folding takes place
        assert_eq!(cp437().encode("á"), vec![0xA0]);
        assert_ne!(cp437().encode("á"), cp437().encode("a"));
        // but has no uppercase Á
        assert_eq!(cp437().encode("Á"), b"A");
        assert_eq!(cp437().encode("Ñ°"), vec![0xA5, 0xF8]);
    }

    #[test]
    fn test_placeholder_for_unmappable() {
        assert_eq!(ascii().encode("a✓b"), b"a?b");
        assert_eq!(ascii().with_placeholder(b'*').encode("漢"), b"*");
    }

    #[test]
    fn test_encode_is_total() {
        let samples = [
            "",
            "plain ascii\n",
            "emoji 🦀 and 𝔘𝔫𝔦𝔠𝔬𝔡𝔢",
            "\u{0}\u{7f}\u{80}\u{ffff}\u{10ffff}",
            "Ελληνικά русский עברית",
        ];
        let charsets = [
            Charset::Ascii,
            Charset::Cp437,
            Charset::Cp866,
            Charset::Windows1250,
            Charset::Windows1251,
            Charset::Windows1252,
            Charset::Iso8859_2,
            Charset::Iso8859_15,
            Charset::Gbk,
        ];
        for charset in charsets {
            let t = Transcoder::new(CodePage::new(0, charset));
            for s in samples {
                let out = t.encode(s);
                assert_eq!(s.is_empty(), out.is_empty());
                if charset == Charset::Ascii {
                    assert!(out.is_ascii());
                }
            }
        }
    }

    #[test]
    fn test_single_byte_code_pages() {
        let t = Transcoder::new(CodePage::new(16, Charset::Windows1252));
        assert_eq!(t.encode("€ é"), vec![0x80, b' ', 0xE9]);
        let t = Transcoder::new(CodePage::new(17, Charset::Cp866));
        assert_eq!(t.encode("Да"), vec![0x84, 0xA0]);
        // CP866 has no é, falls back to the fold table
        assert_eq!(t.encode("é"), b"e");
    }

    #[test]
    fn test_gbk_width() {
        let t = Transcoder::new(CodePage::new(255, Charset::Gbk));
        assert_eq!(t.width("hello"), 5);
        assert_eq!(t.width("你好"), 4);
        assert_eq!(t.width("AB中文CD"), 8);
    }

    #[test]
    fn test_gbk_single_high_byte_is_folded() {
        let t = Transcoder::new(CodePage::new(255, Charset::Gbk));
        assert_eq!(t.encode("4€"), b"4EUR");
        assert_eq!(t.encode("€中"), vec![b'E', b'U', b'R', 0xD6, 0xD0]);
        let mut out = Vec::new();
        assert!(!Charset::Gbk.encode_char('€', &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_encode_with_profile() {
        let zj = CapabilityProfile::load("zj-5870").unwrap();
        assert_eq!(encode("桌 4€", &zj), vec![0xD7, 0xC0, b' ', b'4', b'E', b'U', b'R']);
        let ascii = CapabilityProfile::load("ascii").unwrap();
        assert_eq!(encode("Ñandú ★", &ascii), b"Nandu ?");
    }

    #[test]
    fn test_truncate() {
        let t = Transcoder::new(CodePage::new(255, Charset::Gbk));
        assert_eq!(t.truncate("hello world", 5), "hello");
        assert_eq!(t.truncate("你好世界", 4), "你好");
        assert_eq!(t.truncate("AB中文", 4), "AB中");
        assert_eq!(t.truncate("AB中文", 3), "AB");
    }

    #[test]
    fn test_pad() {
        let t = cp437();
        assert_eq!(t.pad("hi", 5, false), "hi   ");
        assert_eq!(t.pad("hi", 5, true), "   hi");
        assert_eq!(t.pad("hello world", 5, false), "hello");
        assert_eq!(t.pad("olé", 4, false), "olé ");
    }
}
