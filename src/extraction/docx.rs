// DOCX reader backed by docx-rust

use std::io::Cursor;

use docx_rust::document::{BodyContent, Paragraph, TableCellContent, TableRowContent};
use docx_rust::DocxFile;

use crate::extraction::{RawContent, Table};
use crate::types::{AppError, AppResult};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn has_zip_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

pub(crate) fn read(bytes: &[u8]) -> AppResult<RawContent> {
    if !has_zip_magic(bytes) {
        return Err(AppError::Validation("not a DOCX file: missing ZIP container header".to_string()));
    }

    let file = DocxFile::from_reader(Cursor::new(bytes))
        .map_err(|e| AppError::Extraction(format!("unreadable DOCX container: {e:?}")))?;
    let docx = file
        .parse()
        .map_err(|e| AppError::Extraction(format!("invalid DOCX document: {e:?}")))?;

    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();

    for content in &docx.document.body.content {
        match content {
            BodyContent::Paragraph(paragraph) => {
                let text = paragraph_text(paragraph);
                if !text.trim().is_empty() {
                    paragraphs.push(text);
                }
            }
            BodyContent::Table(table) => {
                let rows: Table = table
                    .rows
                    .iter()
                    .map(|row| {
                        row.cells
                            .iter()
                            .filter_map(|cell| match cell {
                                TableRowContent::TableCell(cell) => Some(
                                    cell.content
                                        .iter()
                                        .filter_map(|c| match c {
                                            TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                            #[allow(unreachable_patterns)]
                                            _ => None,
                                        })
                                        .collect::<Vec<_>>()
                                        .join(" ")
                                        .trim()
                                        .to_string(),
                                ),
                                #[allow(unreachable_patterns)]
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                    })
                    .filter(|row| row.iter().any(|cell| !cell.is_empty()))
                    .collect();
                if !rows.is_empty() {
                    tables.push(rows);
                }
            }
            _ => {}
        }
    }

    Ok(RawContent {
        text: paragraphs.join("\n\n"),
        tables,
        page_count: None,
    })
}

fn paragraph_text(paragraph: &Paragraph<'_>) -> String {
    paragraph.iter_text().fold(String::new(), |mut text, run| {
        text.push_str(run);
        text
    })
}
