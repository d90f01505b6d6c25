//! ToUnicode CMap parsing
//!
//! Only the parts needed to turn character codes back into text:
//! `codespacerange`, `bfchar` and `bfrange` (both the incrementing and the
//! array form). CID mappings and `usecmap` are ignored.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

#[derive(Debug, Clone)]
enum RangeTarget {
    /// Destination of the first code; later codes increment the last unit
    Start(Vec<u16>),
    /// One destination per code
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct BfRange {
    lo: u32,
    hi: u32,
    target: RangeTarget,
}

/// Parsed `/ToUnicode` stream of a font
#[derive(Debug, Clone, Default)]
pub struct ToUnicodeMap {
    chars: HashMap<u32, String>,
    ranges: Vec<BfRange>,
    code_lengths: Vec<usize>,
}

impl ToUnicodeMap {
    pub fn parse(data: &[u8]) -> ToUnicodeMap {
        let tokens = tokenize(data);
        let mut map = ToUnicodeMap::default();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(_))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        if !map.code_lengths.contains(&lo.len()) {
                            map.code_lengths.push(lo.len());
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        map.chars.insert(code_value(src), utf16_be(dst));
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    loop {
                        let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                            (tokens.get(i), tokens.get(i + 1))
                        else {
                            break;
                        };
                        let (lo, hi) = (code_value(lo), code_value(hi));
                        match tokens.get(i + 2) {
                            Some(Token::Hex(dst)) => {
                                map.ranges.push(BfRange {
                                    lo,
                                    hi,
                                    target: RangeTarget::Start(utf16_units(dst)),
                                });
                                i += 3;
                            }
                            Some(Token::ArrayStart) => {
                                let mut list = Vec::new();
                                i += 3;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    list.push(utf16_be(dst));
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                                map.ranges.push(BfRange {
                                    lo,
                                    hi,
                                    target: RangeTarget::List(list),
                                });
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        map.code_lengths.sort_unstable();
        map
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty() && self.ranges.is_empty()
    }

    /// Byte lengths declared by the codespace ranges, shortest first
    pub fn code_lengths(&self) -> &[usize] {
        &self.code_lengths
    }

    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(text) = self.chars.get(&code) {
            return Some(text.clone());
        }
        let range = self.ranges.iter().find(|r| r.lo <= code && code <= r.hi)?;
        let offset = code - range.lo;
        match &range.target {
            RangeTarget::Start(units) => {
                let mut units = units.clone();
                let last = units.last_mut()?;
                *last = last.wrapping_add(offset as u16);
                Some(String::from_utf16_lossy(&units))
            }
            RangeTarget::List(list) => list.get(offset as usize).cloned(),
        }
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

fn utf16_be(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => {
                tokens.push(Token::Word("<<".to_string()));
                i += 2;
            }
            b'>' if data.get(i + 1) == Some(&b'>') => {
                tokens.push(Token::Word(">>".to_string()));
                i += 2;
            }
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(data.len(), |p| start + p);
                tokens.push(Token::Hex(parse_hex(&data[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'(' => {
                // literal strings only appear in the CMap header
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'(' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                    continue;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }

    tokens
}

fn parse_hex(raw: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (hi << 4) | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}
