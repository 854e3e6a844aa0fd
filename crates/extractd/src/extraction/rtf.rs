//! Rich Text Format.
//!
//! A small group-aware tokenizer: destination groups (font tables, styles,
//! pictures, `\*` extensions) are skipped, `\info` fields become metadata and
//! everything else contributes text.

use crate::core::mime::RTF_MIME_TYPE;
use crate::document::{Backing, Metadata, TextDocument};
use crate::{ExtractdError, Result};
use std::iter::Peekable;
use std::str::Chars;

const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "listtable",
    "listoverridetable",
    "revtbl",
    "rsidtbl",
    "generator",
    "pict",
    "object",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "xmlnstbl",
    "mmathPr",
];

const INFO_FIELDS: [(&str, &str); 4] = [
    ("title", "title"),
    ("author", "author"),
    ("subject", "subject"),
    ("keywords", "keywords"),
];

#[derive(Debug, Clone, Default)]
struct Group {
    skip: bool,
    in_info: bool,
    field: Option<&'static str>,
    /// Fallback characters following each `\uN`.
    unicode_skip: usize,
}

/// Parse an RTF payload. Blocking.
pub fn load(backing: Backing) -> Result<TextDocument> {
    let (text, metadata) = {
        let bytes = backing.load()?;
        if !bytes.starts_with(b"{\\rtf") {
            return Err(ExtractdError::parsing("RTF payload does not start with {\\rtf"));
        }
        let content: String = bytes.iter().map(|&b| b as char).collect();
        extract_text_from_rtf(&content)
    };
    Ok(TextDocument::new(RTF_MIME_TYPE, text, metadata, backing))
}

#[inline]
fn hex_digit_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

#[inline]
fn parse_hex_byte(h1: char, h2: char) -> Option<u8> {
    Some((hex_digit_to_u8(h1)? << 4) | hex_digit_to_u8(h2)?)
}

/// Windows-1252 to Unicode for `\'hh` escapes.
fn decode_cp1252(byte: u8) -> char {
    match byte {
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
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => '?',
        _ => byte as char,
    }
}

/// Control word and optional numeric parameter. Consumes the delimiting space.
fn parse_control_word(chars: &mut Peekable<Chars<'_>>) -> (String, Option<i32>) {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }

    let negative = chars.next_if_eq(&'-').is_some();
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    chars.next_if_eq(&' ');

    let value = digits.parse::<i32>().ok().map(|v| if negative { -v } else { v });
    (word, value)
}

/// Skip `count` fallback characters after a `\uN` escape.
fn skip_fallback(chars: &mut Peekable<Chars<'_>>, count: usize) {
    for _ in 0..count {
        match chars.peek() {
            Some('\\') => {
                chars.next();
                if chars.next_if_eq(&'\'').is_some() {
                    chars.next();
                    chars.next();
                } else {
                    parse_control_word(chars);
                }
            }
            Some('{') | Some('}') | None => return,
            Some(_) => {
                chars.next();
            }
        }
    }
}

fn extract_text_from_rtf(content: &str) -> (String, Metadata) {
    let mut text = String::new();
    let mut metadata = Metadata::new();
    let mut field_value = String::new();
    let mut stack: Vec<Group> = Vec::new();
    let mut current = Group {
        unicode_skip: 1,
        ..Default::default()
    };
    let mut group_start = false;
    let mut chars = content.chars().peekable();

    let emit = |c: char, current: &Group, text: &mut String, field_value: &mut String| {
        if current.field.is_some() {
            field_value.push(c);
        } else if !current.skip && !current.in_info {
            text.push(c);
        }
    };

    while let Some(ch) = chars.next() {
        let at_group_start = std::mem::take(&mut group_start);
        match ch {
            '{' => {
                stack.push(current.clone());
                group_start = true;
            }
            '}' => {
                if let Some(field) = current.field {
                    let parent_has_field = stack.last().is_some_and(|g| g.field == Some(field));
                    if !parent_has_field {
                        let value = field_value.trim();
                        if !value.is_empty() {
                            metadata.insert(field.to_string(), value.to_string());
                        }
                        field_value.clear();
                    }
                }
                match stack.pop() {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            '\\' => match chars.peek().copied() {
                Some(c @ ('\\' | '{' | '}')) => {
                    chars.next();
                    emit(c, &current, &mut text, &mut field_value);
                }
                Some('\'') => {
                    chars.next();
                    if let (Some(h1), Some(h2)) = (chars.next(), chars.next())
                        && let Some(byte) = parse_hex_byte(h1, h2)
                    {
                        emit(decode_cp1252(byte), &current, &mut text, &mut field_value);
                    }
                }
                Some('*') => {
                    chars.next();
                    current.skip = true;
                }
                Some('~') => {
                    chars.next();
                    emit('\u{00A0}', &current, &mut text, &mut field_value);
                }
                Some('_') => {
                    chars.next();
                    emit('-', &current, &mut text, &mut field_value);
                }
                Some('\n') | Some('\r') => {
                    chars.next();
                    emit('\n', &current, &mut text, &mut field_value);
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let (word, value) = parse_control_word(&mut chars);
                    match word.as_str() {
                        "u" => {
                            if let Some(code) = value {
                                let code = if code < 0 { code + 65536 } else { code };
                                if let Some(c) = u32::try_from(code).ok().and_then(char::from_u32) {
                                    emit(c, &current, &mut text, &mut field_value);
                                }
                            }
                            skip_fallback(&mut chars, current.unicode_skip);
                        }
                        "uc" => current.unicode_skip = value.and_then(|v| usize::try_from(v).ok()).unwrap_or(1),
                        "par" | "line" | "sect" | "page" => emit('\n', &current, &mut text, &mut field_value),
                        "tab" | "cell" => emit('\t', &current, &mut text, &mut field_value),
                        "row" => emit('\n', &current, &mut text, &mut field_value),
                        "emdash" => emit('\u{2014}', &current, &mut text, &mut field_value),
                        "endash" => emit('\u{2013}', &current, &mut text, &mut field_value),
                        "bullet" => emit('\u{2022}', &current, &mut text, &mut field_value),
                        "lquote" => emit('\u{2018}', &current, &mut text, &mut field_value),
                        "rquote" => emit('\u{2019}', &current, &mut text, &mut field_value),
                        "ldblquote" => emit('\u{201C}', &current, &mut text, &mut field_value),
                        "rdblquote" => emit('\u{201D}', &current, &mut text, &mut field_value),
                        "info" if at_group_start => current.in_info = true,
                        word if at_group_start && current.in_info => {
                            current.field = INFO_FIELDS
                                .iter()
                                .find(|(name, _)| *name == word)
                                .map(|(_, key)| *key);
                            if current.field.is_none() {
                                current.skip = true;
                            }
                        }
                        word if at_group_start && SKIPPED_DESTINATIONS.contains(&word) => current.skip = true,
                        _ => {}
                    }
                }
                _ => {}
            },
            '\r' | '\n' => {}
            c => emit(c, &current, &mut text, &mut field_value),
        }
    }

    (normalize_whitespace(&text), metadata)
}

/// Trim trailing spaces per line and collapse runs of blank lines.
fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut blank_run = 0;
    for line in s.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_matches('\n').to_string()
}
