//! Decoding of playlist and dictionary files.
//!
//! Sources arrive as UTF-8, GBK or some single-byte encoding. Decoding is
//! tried in that order and never fails: Latin-1 maps every byte.

use encoding_rs::GBK;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode raw bytes, trying UTF-8 (BOM stripped), then GBK, then Latin-1.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let (text, had_errors) = GBK.decode_without_bom_handling(bytes);
    if !had_errors {
        return text.into_owned();
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Read a file as trimmed lines. Missing or unreadable files are `None`.
pub fn read_lines(path: &Path) -> Option<Vec<String>> {
    let bytes = std::fs::read(path).ok()?;
    Some(
        decode(&bytes)
            .lines()
            .map(|l| l.trim().to_string())
            .collect(),
    )
}
