// Plain-text reader

use crate::extraction::{normalize, RawContent};
use crate::types::{AppError, AppResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const SNIFF_WINDOW: usize = 8192;

/// No NUL bytes and valid UTF-8 in the leading window
pub fn looks_like_text(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if window.contains(&0) {
        return false;
    }
    match std::str::from_utf8(window) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the window edge is still text
        Err(e) => e.error_len().is_none(),
    }
}

pub(crate) fn read(bytes: &[u8]) -> AppResult<RawContent> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.contains(&0) {
        return Err(AppError::Validation("text document contains binary data".to_string()));
    }

    let text = String::from_utf8_lossy(bytes).into_owned();
    let tables = normalize::detect_tables(&text);
    Ok(RawContent {
        text,
        tables,
        page_count: None,
    })
}
