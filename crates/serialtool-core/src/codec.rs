//! Byte / hex / text conversions
//!
//! Stateless helpers shared by the send and receive paths. Nothing here
//! touches I/O, so every function is safe to call from any thread.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

/// Default number of bytes per row in [`format_hex_dump`]
pub const DEFAULT_BYTES_PER_LINE: usize = 16;

/// Errors produced by codec conversions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Invalid hex format: {0}")]
    InvalidFormat(#[from] hex::FromHexError),
}

/// Text encoding used when converting between bytes and text.
///
/// Decoding never fails: bytes that are not valid in the encoding become
/// U+FFFD. Encoding never fails either: characters the encoding cannot
/// represent become `?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8
    #[default]
    Utf8,
    /// 7-bit US-ASCII
    Ascii,
    /// ISO-8859-1, one byte per code point U+0000..=U+00FF
    Latin1,
}

impl TextEncoding {
    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(format!("unknown text encoding '{}'", other)),
        }
    }
}

/// Render bytes as uppercase hex pairs joined by `separator`.
///
/// The separator only goes between bytes, never at either end.
pub fn bytes_to_hex(bytes: &[u8], separator: &str) -> String {
    let mut out = String::with_capacity(bytes.len() * (2 + separator.len()));
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        // Writing into a String cannot fail
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Strip space and hyphen separators and uppercase
fn normalize_hex(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ' ' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Parse hex text such as `"01 02 FF"`, `"01-02-ff"` or `"0102FF"`.
///
/// Blank input decodes to an empty vector. Only spaces and hyphens are
/// separators; odd digit counts and any other character (tabs and line
/// breaks included) fail with [`CodecError::InvalidFormat`].
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(hex::decode(normalize_hex(text))?)
}

/// True iff [`hex_to_bytes`] would succeed on `text`
pub fn is_valid_hex(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let digits = normalize_hex(text);
    digits.len() % 2 == 0 && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decode bytes as text
pub fn bytes_to_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Ascii => bytes
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    char::from(b)
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Encode text as bytes
pub fn text_to_bytes(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Ascii => text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect(),
        TextEncoding::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect(),
    }
}

/// Classic offset / hex / ASCII dump, one row per `bytes_per_line` bytes.
///
/// ```text
/// 00000000: 48 65 6C 6C 6F 0D 0A                             Hello..
/// ```
pub fn format_hex_dump(bytes: &[u8], bytes_per_line: usize) -> String {
    let per_line = if bytes_per_line == 0 {
        DEFAULT_BYTES_PER_LINE
    } else {
        bytes_per_line
    };

    let mut out = String::new();
    for (row, chunk) in bytes.chunks(per_line).enumerate() {
        let _ = write!(out, "{:08X}: ", row * per_line);

        for j in 0..per_line {
            match chunk.get(j) {
                Some(b) => {
                    let _ = write!(out, "{:02X} ", b);
                }
                None => out.push_str("   "),
            }
        }

        out.push(' ');
        out.extend(chunk.iter().map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                char::from(b)
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}
