// PDF reader backed by lopdf

use lopdf::Document;
use tracing::warn;

use crate::extraction::RawContent;
use crate::types::{AppError, AppResult};

const HEADER_WINDOW: usize = 1024;

/// `%PDF-` must appear within the first kilobyte
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

pub(crate) fn read(bytes: &[u8]) -> AppResult<RawContent> {
    if !has_pdf_header(bytes) {
        return Err(AppError::Validation("not a PDF file: missing %PDF- header".to_string()));
    }

    let document = Document::load_mem(bytes)
        .map_err(|e| AppError::Extraction(format!("corrupt PDF: {e}")))?;
    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(AppError::Extraction("PDF has no pages".to_string()));
    }

    let mut text = String::new();
    for &page_number in pages.keys() {
        match document.extract_text(&[page_number]) {
            Ok(page_text) => {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&page_text);
            }
            Err(e) => warn!(page = page_number, error = %e, "Skipping unreadable PDF page"),
        }
    }

    Ok(RawContent {
        text,
        tables: Vec::new(),
        page_count: Some(pages.len()),
    })
}
