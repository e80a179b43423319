//! Font decoding for shown text
//!
//! Turns the bytes of a text-showing operand into glyphs: the characters
//! each code stands for and how far it advances. Composite (Type0) fonts
//! read multi-byte codes, simple fonts one byte per code. A ToUnicode CMap
//! wins over the font encoding; simple fonts without one fall back to
//! WinAnsi plus the `/Differences` of their encoding dictionary.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use crate::object::{number, resolve, resolve_array, resolve_dict, stream_content};

/// Advance used when a font carries no widths, in glyph space units
const DEFAULT_WIDTH: f64 = 500.0;
/// Default `/DW` of CIDFonts
const DEFAULT_CID_WIDTH: f64 = 1000.0;
const DEFAULT_ASCENT: f64 = 0.8;
const DEFAULT_DESCENT: f64 = -0.2;
/// Largest bfrange expanded from a ToUnicode CMap
const MAX_RANGE_CODES: u32 = 0xFFFF;

/// One decoded glyph
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Glyph {
    /// Characters the glyph stands for, empty when unmapped
    pub text: String,
    /// Horizontal advance as a fraction of the font size
    pub width: f64,
    /// Single-byte code 32, the only code that takes word spacing
    pub is_space: bool,
}

#[derive(Debug, Clone, Default)]
enum Widths {
    #[default]
    Unknown,
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    Cid {
        ranges: Vec<CidWidths>,
        default: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct CidWidths {
    start: u32,
    end: u32,
    width: f64,
}

impl Widths {
    fn get(&self, code: u32) -> f64 {
        match self {
            Widths::Unknown => DEFAULT_WIDTH,
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Cid { ranges, default } => ranges
                .iter()
                .find(|r| (r.start..=r.end).contains(&code))
                .map(|r| r.width)
                .unwrap_or(*default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CodeSpace {
    len: usize,
    start: u32,
    end: u32,
}

/// Parsed ToUnicode CMap
#[derive(Debug, Clone, Default)]
pub(crate) struct ToUnicode {
    codespaces: Vec<CodeSpace>,
    map: HashMap<u32, String>,
}

impl ToUnicode {
    pub(crate) fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut i = 0;

        while i < tokens.len() {
            let Token::Word(word) = &tokens[i] else {
                i += 1;
                continue;
            };
            i += 1;
            match word.as_str() {
                "begincodespacerange" => {
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        if !lo.is_empty() && lo.len() == hi.len() && lo.len() <= 4 {
                            cmap.codespaces.push(CodeSpace {
                                len: lo.len(),
                                start: code_value(lo),
                                end: code_value(hi),
                            });
                        }
                        i += 2;
                    }
                }
                "beginbfchar" => {
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.map.insert(code_value(src), utf16_text(dst));
                        i += 2;
                    }
                }
                "beginbfrange" => loop {
                    match (tokens.get(i), tokens.get(i + 1), tokens.get(i + 2)) {
                        (Some(Token::Hex(lo)), Some(Token::Hex(hi)), Some(Token::Hex(dst))) => {
                            let (lo, hi) = (code_value(lo), code_value(hi));
                            for (offset, code) in code_range(lo, hi).enumerate() {
                                cmap.map.insert(code, offset_text(dst, offset as u32));
                            }
                            i += 3;
                        }
                        (Some(Token::Hex(lo)), Some(Token::Hex(hi)), Some(Token::Open)) => {
                            let mut codes = code_range(code_value(lo), code_value(hi));
                            i += 3;
                            while let Some(Token::Hex(dst)) = tokens.get(i) {
                                if let Some(code) = codes.next() {
                                    cmap.map.insert(code, utf16_text(dst));
                                }
                                i += 1;
                            }
                            if tokens.get(i) == Some(&Token::Close) {
                                i += 1;
                            }
                        }
                        _ => break,
                    }
                },
                _ => {}
            }
        }
        cmap
    }

    /// Length of the code starting at `bytes[0]`, per the codespace ranges
    fn code_len(&self, bytes: &[u8]) -> Option<usize> {
        (1..=bytes.len().min(4)).find(|&len| {
            let code = code_value(&bytes[..len]);
            self.codespaces
                .iter()
                .any(|cs| cs.len == len && (cs.start..=cs.end).contains(&code))
        })
    }
}

/// A font from a page's `/Font` resources, reduced to what text location needs
#[derive(Debug, Clone)]
pub(crate) struct PdfFont {
    composite: bool,
    to_unicode: Option<ToUnicode>,
    differences: HashMap<u32, String>,
    widths: Widths,
    /// Glyph box extent above and below the baseline, as fractions of the font size
    pub ascent: f64,
    pub descent: f64,
}

impl Default for PdfFont {
    /// Used when `Tf` names a font missing from the resources
    fn default() -> Self {
        Self {
            composite: false,
            to_unicode: None,
            differences: HashMap::new(),
            widths: Widths::Unknown,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
        }
    }
}

impl PdfFont {
    pub(crate) fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let composite = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Type0")
            .unwrap_or(false);

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
            .map(|stream| ToUnicode::parse(&stream_content(stream)));

        let descendant = if composite {
            font.get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve_array(doc, obj))
                .and_then(|fonts| fonts.first())
                .and_then(|obj| resolve_dict(doc, obj))
        } else {
            None
        };
        let metrics_dict = descendant.unwrap_or(font);
        let descriptor = metrics_dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj));

        let widths = if composite {
            cid_widths(doc, metrics_dict)
        } else {
            simple_widths(doc, font, descriptor)
        };
        let differences = if composite {
            HashMap::new()
        } else {
            font.get(b"Encoding")
                .ok()
                .and_then(|obj| resolve_dict(doc, obj))
                .and_then(|enc| enc.get(b"Differences").ok())
                .and_then(|obj| resolve_array(doc, obj))
                .map(parse_differences)
                .unwrap_or_default()
        };

        let metric = |key: &[u8]| {
            descriptor
                .and_then(|d| d.get(key).ok())
                .and_then(|obj| resolve(doc, obj))
                .and_then(number)
                .map(|v| v / 1000.0)
        };
        let ascent = metric(b"Ascent").filter(|a| *a > 0.0 && *a <= 2.0);
        let descent = metric(b"Descent").filter(|d| *d <= 0.0 && *d >= -1.0);

        Self {
            composite,
            to_unicode,
            differences,
            widths,
            ascent: ascent.unwrap_or(DEFAULT_ASCENT),
            descent: descent.unwrap_or(DEFAULT_DESCENT),
        }
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        if !self.composite && self.to_unicode.is_none() && bytes.starts_with(&[0xFE, 0xFF]) {
            return self.decode_utf16(&bytes[2..]);
        }

        let mut glyphs = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let len = self.code_len(&bytes[i..]);
            let code = code_value(&bytes[i..i + len]);
            i += len;

            let text = self
                .to_unicode
                .as_ref()
                .and_then(|cmap| cmap.map.get(&code).cloned())
                .or_else(|| self.simple_text(code))
                .unwrap_or_default();
            glyphs.push(Glyph {
                text,
                width: self.widths.get(code) / 1000.0,
                is_space: len == 1 && code == 32,
            });
        }
        glyphs
    }

    fn code_len(&self, bytes: &[u8]) -> usize {
        if !self.composite {
            return 1;
        }
        self.to_unicode
            .as_ref()
            .and_then(|cmap| cmap.code_len(bytes))
            .unwrap_or(2)
            .min(bytes.len())
    }

    fn simple_text(&self, code: u32) -> Option<String> {
        if self.composite {
            return None;
        }
        self.differences
            .get(&code)
            .cloned()
            .or_else(|| win_ansi_char(code).map(String::from))
    }

    /// Text strings marked with a byte order mark in fonts that have no map
    fn decode_utf16(&self, bytes: &[u8]) -> Vec<Glyph> {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .chars()
            .map(|c| Glyph {
                text: c.to_string(),
                width: self.widths.get(c as u32) / 1000.0,
                is_space: c == ' ',
            })
            .collect()
    }
}

/// Fonts of one resource dictionary, keyed by resource name
pub(crate) fn load_fonts(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, PdfFont> {
    let Some(fonts) = resources
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, obj)| {
            let dict = resolve_dict(doc, obj)?;
            let font = PdfFont::from_dict(doc, dict);
            debug!(
                font = %String::from_utf8_lossy(name),
                composite = font.composite,
                to_unicode = font.to_unicode.is_some(),
                "loaded font"
            );
            Some((name.clone(), font))
        })
        .collect()
}

fn simple_widths(doc: &Document, font: &Dictionary, descriptor: Option<&Dictionary>) -> Widths {
    let Some(widths) = font
        .get(b"Widths")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
    else {
        return Widths::Unknown;
    };
    let first_char = font
        .get(b"FirstChar")
        .ok()
        .and_then(number)
        .unwrap_or(0.0)
        .max(0.0) as u32;
    let missing = descriptor
        .and_then(|d| d.get(b"MissingWidth").ok())
        .and_then(number)
        .filter(|w| *w > 0.0)
        .unwrap_or(DEFAULT_WIDTH);

    Widths::Simple {
        first_char,
        widths: widths
            .iter()
            .map(|w| resolve(doc, w).and_then(number).unwrap_or(missing))
            .collect(),
        missing,
    }
}

/// `/W` of a CIDFont: `c [w1 w2 ...]` and `c_first c_last w` entries
fn cid_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(number)
        .unwrap_or(DEFAULT_CID_WIDTH);
    let entries: Vec<&Object> = cid_font
        .get(b"W")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
        .map(|items| items.iter().filter_map(|obj| resolve(doc, obj)).collect())
        .unwrap_or_default();

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let Some(start) = number(entries[i]).map(|v| v as u32) else {
            i += 1;
            continue;
        };
        match (entries.get(i + 1), entries.get(i + 2)) {
            (Some(Object::Array(list)), _) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(width) = resolve(doc, w).and_then(number) {
                        let cid = start + offset as u32;
                        ranges.push(CidWidths {
                            start: cid,
                            end: cid,
                            width,
                        });
                    }
                }
                i += 2;
            }
            (Some(end), Some(width)) => {
                if let (Some(end), Some(width)) = (number(end), number(width)) {
                    ranges.push(CidWidths {
                        start,
                        end: end as u32,
                        width,
                    });
                }
                i += 3;
            }
            _ => break,
        }
    }
    Widths::Cid { ranges, default }
}

fn parse_differences(items: &[Object]) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let mut code = 0u32;
    for item in items {
        match item {
            Object::Integer(next) => code = (*next).max(0) as u32,
            Object::Name(name) => {
                if let Some(text) = glyph_name_text(&String::from_utf8_lossy(name)) {
                    map.insert(code, text);
                }
                code += 1;
            }
            _ => {}
        }
    }
    map
}

/// Characters for an Adobe glyph name. Covers `uniXXXX`, `uXXXX[XX]`,
/// single-character names and the common punctuation and ligature names.
fn glyph_name_text(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or(name);
    if let Some(hex) = base.strip_prefix("uni") {
        if hex.len() % 4 == 0 && !hex.is_empty() {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            return units.map(|u| String::from_utf16_lossy(&u));
        }
    }
    if let Some(hex) = base.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                return Some(c.to_string());
            }
        }
    }
    let mut chars = base.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c.to_string());
    }

    let text = match base {
        "space" | "nbspace" => " ",
        "exclam" => "!",
        "quotedbl" => "\"",
        "numbersign" => "#",
        "dollar" => "$",
        "percent" => "%",
        "ampersand" => "&",
        "quotesingle" => "'",
        "parenleft" => "(",
        "parenright" => ")",
        "asterisk" => "*",
        "plus" => "+",
        "comma" => ",",
        "hyphen" | "minus" => "-",
        "period" => ".",
        "slash" => "/",
        "zero" => "0",
        "one" => "1",
        "two" => "2",
        "three" => "3",
        "four" => "4",
        "five" => "5",
        "six" => "6",
        "seven" => "7",
        "eight" => "8",
        "nine" => "9",
        "colon" => ":",
        "semicolon" => ";",
        "less" => "<",
        "equal" => "=",
        "greater" => ">",
        "question" => "?",
        "at" => "@",
        "bracketleft" => "[",
        "backslash" => "\\",
        "bracketright" => "]",
        "underscore" => "_",
        "braceleft" => "{",
        "bar" => "|",
        "braceright" => "}",
        "quoteleft" => "\u{2018}",
        "quoteright" => "\u{2019}",
        "quotedblleft" => "\u{201C}",
        "quotedblright" => "\u{201D}",
        "endash" => "\u{2013}",
        "emdash" => "\u{2014}",
        "bullet" => "\u{2022}",
        "ellipsis" => "\u{2026}",
        "section" => "\u{A7}",
        "paragraph" => "\u{B6}",
        "ff" => "ff",
        "fi" => "fi",
        "fl" => "fl",
        "ffi" => "ffi",
        "ffl" => "ffl",
        _ => return None,
    };
    Some(text.to_string())
}

/// WinAnsiEncoding. Undefined codes in 0x80-0x9F map to nothing.
fn win_ansi_char(code: u32) -> Option<char> {
    let c = match code {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x80..=0x9F => return None,
        0..=0xFF => char::from_u32(code)?,
        _ => return None,
    };
    Some(c)
}

fn code_value(bytes: &[u8]) -> u32 {
    let start = bytes.len().saturating_sub(4);
    bytes[start..]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn code_range(lo: u32, hi: u32) -> impl Iterator<Item = u32> {
    lo..=hi.min(lo.saturating_add(MAX_RANGE_CODES))
}

fn utf16_text(bytes: &[u8]) -> String {
    if bytes.len() % 2 == 1 {
        return bytes.iter().map(|&b| b as char).collect();
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// bfrange destination: the last UTF-16 unit of `base` advanced by `offset`
fn offset_text(base: &[u8], offset: u32) -> String {
    if offset == 0 || base.len() < 2 {
        return utf16_text(base);
    }
    let mut bytes = base.to_vec();
    let n = bytes.len();
    let last = u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]).wrapping_add(offset as u16);
    bytes[n - 2..].copy_from_slice(&last.to_be_bytes());
    utf16_text(&bytes)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b"<>[]()/%{}".contains(&b)
}

/// PostScript-ish tokens of a CMap program. Literal strings and comments are dropped.
fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
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
                let end = data[i + 1..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                tokens.push(Token::Hex(hex_bytes(&data[i + 1..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'(' => {
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
            b if b.is_ascii_whitespace() || b == b'>' || b == b')' => i += 1,
            _ => {
                let start = i;
                i += 1;
                while i < data.len() && !is_delimiter(data[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn hex_bytes(hex: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .iter()
        .filter_map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}
