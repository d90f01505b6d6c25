//! Single-byte text encodings
//!
//! Simple fonts on invoices are overwhelmingly WinAnsi-encoded, which is
//! Latin-1 apart from the 0x80..0x9F block. Overlay text is written in the
//! same encoding.

/// Unicode values for WinAnsi codes 0x80..=0x9F (`None` = undefined)
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('€'),
    None,
    Some('‚'),
    Some('ƒ'),
    Some('„'),
    Some('…'),
    Some('†'),
    Some('‡'),
    Some('ˆ'),
    Some('‰'),
    Some('Š'),
    Some('‹'),
    Some('Œ'),
    None,
    Some('Ž'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('•'),
    Some('–'),
    Some('—'),
    Some('˜'),
    Some('™'),
    Some('š'),
    Some('›'),
    Some('œ'),
    None,
    Some('ž'),
    Some('Ÿ'),
];

/// Decode one WinAnsi byte
pub fn win_ansi_to_char(code: u8) -> Option<char> {
    match code {
        0x80..=0x9F => WIN_ANSI_HIGH[(code - 0x80) as usize],
        0x00..=0x1F => None,
        _ => Some(char::from(code)),
    }
}

/// Encode one char as WinAnsi, if representable
pub fn char_to_win_ansi(ch: char) -> Option<u8> {
    let code = ch as u32;
    if (0x20..0x7F).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    WIN_ANSI_HIGH
        .iter()
        .position(|c| *c == Some(ch))
        .map(|i| 0x80 + i as u8)
}

/// Encode a string as WinAnsi bytes; unrepresentable chars become `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| char_to_win_ansi(c).unwrap_or(b'?'))
        .collect()
}

/// Decode a WinAnsi byte string, dropping undefined codes
pub fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes.iter().filter_map(|&b| win_ansi_to_char(b)).collect()
}

/// Resolve an Adobe glyph name from an `/Encoding /Differences` array.
///
/// Covers the names that show up in invoice fonts: single letters, the
/// spelled-out digits and punctuation, accented Latin letters, and the
/// `uniXXXX` / `gXX` conventions.
pub fn glyph_name_to_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }

    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }

    let ch = match name {
        "space" | "nbspace" => ' ',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "period" => '.',
        "comma" => ',',
        "colon" => ':',
        "semicolon" => ';',
        "percent" => '%',
        "hyphen" | "minus" => '-',
        "endash" => '–',
        "emdash" => '—',
        "slash" => '/',
        "backslash" => '\\',
        "parenleft" => '(',
        "parenright" => ')',
        "bracketleft" => '[',
        "bracketright" => ']',
        "braceleft" => '{',
        "braceright" => '}',
        "plus" => '+',
        "equal" => '=',
        "less" => '<',
        "greater" => '>',
        "numbersign" => '#',
        "dollar" => '$',
        "ampersand" => '&',
        "asterisk" => '*',
        "at" => '@',
        "exclam" => '!',
        "question" => '?',
        "quotesingle" => '\'',
        "quotedbl" => '"',
        "quoteright" => '\u{2019}',
        "quoteleft" => '\u{2018}',
        "underscore" => '_',
        "bar" => '|',
        "asciitilde" => '~',
        "asciicircum" => '^',
        "grave" => '`',
        "bullet" => '•',
        "Euro" | "euro" => '€',
        "sterling" => '£',
        "yen" => '¥',
        "cent" => '¢',
        "section" => '§',
        "degree" => '°',
        "copyright" => '©',
        "registered" => '®',
        "germandbls" => 'ß',
        "adieresis" => 'ä',
        "odieresis" => 'ö',
        "udieresis" => 'ü',
        "Adieresis" => 'Ä',
        "Odieresis" => 'Ö',
        "Udieresis" => 'Ü',
        "eacute" => 'é',
        "egrave" => 'è',
        "ecircumflex" => 'ê',
        "aacute" => 'á',
        "agrave" => 'à',
        "acircumflex" => 'â',
        "iacute" => 'í',
        "oacute" => 'ó',
        "uacute" => 'ú',
        "ccedilla" => 'ç',
        "ntilde" => 'ñ',
        "Eacute" => 'É',
        "aring" => 'å',
        "Aring" => 'Å',
        "oslash" => 'ø',
        "Oslash" => 'Ø',
        "ae" => 'æ',
        "AE" => 'Æ',
        _ => return glyph_index_name(name),
    };
    Some(ch)
}

/// Names like `g36` or `G36` produced by some generators map to ASCII codes
fn glyph_index_name(name: &str) -> Option<char> {
    let digits = name.strip_prefix('g').or_else(|| name.strip_prefix('G'))?;
    let code: u32 = digits.parse().ok()?;
    if (32..127).contains(&code) {
        char::from_u32(code)
    } else {
        None
    }
}
