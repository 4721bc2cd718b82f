//! WinAnsiEncoding for the standard 14 PDF fonts
//!
//! Text drawn with a built-in Type1 font is written as single WinAnsi bytes.
//! Characters outside the encoding are folded to their base letter when a
//! canonical decomposition exists (`ş` -> `s`) and replaced with `?` otherwise.

use unicode_normalization::char::decompose_canonical;

/// Substitute written for characters that cannot be encoded at all.
pub const REPLACEMENT: u8 = b'?';

/// Encode one character, if WinAnsiEncoding has a code for it.
pub fn encode_char(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E => return Some(code as u8),
        0xA0..=0xFF => return Some(code as u8),
        _ => {}
    }

    let byte = match ch {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Encode one character, folding or replacing it when there is no exact code.
pub fn encode_char_lossy(ch: char) -> u8 {
    if let Some(byte) = encode_char(ch) {
        return byte;
    }
    match ch {
        // no canonical decomposition for these
        'ı' => return b'i',
        'ł' => return b'l',
        'Ł' => return b'L',
        '\t' => return b' ',
        _ => {}
    }

    let mut base = None;
    decompose_canonical(ch, |part| {
        if base.is_none() {
            base = Some(part);
        }
    });
    base.filter(|&b| b != ch)
        .and_then(encode_char)
        .unwrap_or(REPLACEMENT)
}

/// Convert a Unicode string to WinAnsiEncoding bytes.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars().map(encode_char_lossy).collect()
}

/// True when every character of `text` has an exact WinAnsi code.
pub fn is_encodable(text: &str) -> bool {
    text.chars().all(|ch| encode_char(ch).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let text = "Hello World";
        assert_eq!(encode(text), text.as_bytes());
        assert!(is_encodable(text));
    }

    #[test]
    fn test_latin1_and_punctuation() {
        assert_eq!(encode("ç ö ü"), vec![0xE7, 0x20, 0xF6, 0x20, 0xFC]);
        assert_eq!(encode("\u{201C}€\u{201D}"), vec![0x93, 0x80, 0x94]);
        assert_eq!(encode("–•"), vec![0x96, 0x95]);
    }

    #[test]
    fn test_folding() {
        // Turkish letters outside WinAnsi fold to their base letter
        assert_eq!(encode("şğıİ"), b"sgiI".to_vec());
        assert!(!is_encodable("Şaşkın"));
        assert_eq!(encode("Zamawiającego"), b"Zamawiajacego".to_vec());
    }

    #[test]
    fn test_replacement() {
        assert_eq!(encode("日本"), vec![REPLACEMENT, REPLACEMENT]);
    }
}
