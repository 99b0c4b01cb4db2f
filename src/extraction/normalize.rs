// Text normalization and structural hints shared by every reader

use std::mem;

use serde::Serialize;

use crate::extraction::{DocumentKind, ExtractOptions, ExtractedDocument, RawContent, Table};

const MAX_HEADING_CHARS: usize = 80;
const LIST_MARKERS: [&str; 5] = ["- ", "* ", "• ", "· ", "– "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Heading,
    Paragraph,
    ListItem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedElement {
    pub text: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
}

impl FormattedElement {
    fn new(element_type: ElementType, text: String) -> Self {
        Self {
            text,
            element_type,
            heading_level: None,
        }
    }
}

/// Drop control characters and collapse whitespace runs to a single space
pub fn clean_line(line: &str) -> String {
    line.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cleaned lines grouped into paragraphs; blank lines and form feeds separate paragraphs
pub fn paragraphs(raw: &str) -> Vec<Vec<String>> {
    let unified = raw
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{0C}', "\n\n");

    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in unified.lines() {
        let cleaned = clean_line(line);
        if cleaned.is_empty() {
            if !current.is_empty() {
                out.push(mem::take(&mut current));
            }
        } else {
            current.push(cleaned);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Heading heuristic for a cleaned line.
///
/// Markdown `#` prefixes give their own level; otherwise short lines without
/// a trailing period count as level 1 when fully uppercase and level 2 when
/// they end with a colon.
pub fn heading_level(line: &str) -> Option<u8> {
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS || line.contains('|') {
        return None;
    }
    if line.starts_with('#') {
        let hashes = line.chars().take_while(|c| *c == '#').count();
        if line[hashes..].trim().is_empty() {
            return None;
        }
        return Some(hashes.min(6) as u8);
    }
    if line.ends_with('.') {
        return None;
    }
    let has_letters = line.chars().any(char::is_alphabetic);
    if has_letters && !line.chars().any(char::is_lowercase) {
        return Some(1);
    }
    if line.ends_with(':') {
        return Some(2);
    }
    None
}

/// Item text when the line starts with a bullet or `1.` / `1)` marker
pub fn list_item(line: &str) -> Option<&str> {
    for marker in LIST_MARKERS {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if (1..=3).contains(&digits) {
        let rest = &line[digits..];
        if let Some(item) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(item.trim());
        }
    }
    None
}

/// Runs of at least two pipe- or tab-delimited lines; markdown separator rows are skipped
pub fn detect_tables(raw: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut current: Table = Vec::new();

    for line in raw.lines() {
        match split_row(line.trim()) {
            Some(cells) => {
                if !is_separator_row(&cells) {
                    current.push(cells);
                }
            }
            None => flush_table(&mut tables, &mut current),
        }
    }
    flush_table(&mut tables, &mut current);
    tables
}

fn split_row(line: &str) -> Option<Vec<String>> {
    let cells: Vec<String> = if line.contains('|') {
        line.trim_matches('|').split('|').map(clean_line).collect()
    } else if line.contains('\t') {
        line.split('\t').map(clean_line).collect()
    } else {
        return None;
    };
    (cells.len() >= 2).then_some(cells)
}

fn is_separator_row(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|c| matches!(c, '-' | ':' | '+' | '=')))
}

fn flush_table(tables: &mut Vec<Table>, current: &mut Table) {
    if current.len() >= 2 {
        tables.push(mem::take(current));
    } else {
        current.clear();
    }
}

/// Builds the element list, list groups and output text for one document
#[derive(Default)]
struct Assembler {
    elements: Vec<FormattedElement>,
    lists: Vec<Vec<String>>,
    blocks: Vec<String>,
    prose: Vec<String>,
    list: Vec<String>,
    headings: usize,
}

impl Assembler {
    fn flush_prose(&mut self) {
        if !self.prose.is_empty() {
            let text = mem::take(&mut self.prose).join(" ");
            self.elements.push(FormattedElement::new(ElementType::Paragraph, text));
        }
    }

    fn flush_list(&mut self) {
        if !self.list.is_empty() {
            self.lists.push(mem::take(&mut self.list));
        }
    }

    fn push_paragraph(&mut self, lines: Vec<String>, annotate_headers: bool) {
        let mut block = Vec::with_capacity(lines.len());

        for line in lines {
            if let Some(item) = list_item(&line) {
                self.flush_prose();
                self.list.push(item.to_string());
                self.elements.push(FormattedElement::new(ElementType::ListItem, item.to_string()));
                block.push(line);
                continue;
            }
            self.flush_list();

            match heading_level(&line) {
                Some(level) => {
                    self.flush_prose();
                    self.headings += 1;
                    let title = line.trim_start_matches('#').trim().to_string();
                    block.push(if annotate_headers {
                        format!("{} {}", "#".repeat(level as usize), title)
                    } else {
                        line
                    });
                    self.elements.push(FormattedElement {
                        text: title,
                        element_type: ElementType::Heading,
                        heading_level: Some(level),
                    });
                }
                None => {
                    self.prose.push(line.clone());
                    block.push(line);
                }
            }
        }

        self.flush_prose();
        self.flush_list();
        self.blocks.push(block.join("\n"));
    }
}

pub(crate) fn assemble(kind: DocumentKind, raw: RawContent, options: ExtractOptions) -> ExtractedDocument {
    let mut assembler = Assembler::default();
    for paragraph in paragraphs(&raw.text) {
        assembler.push_paragraph(paragraph, options.annotate_headers);
    }

    let page_or_section_count = raw.page_count.unwrap_or(assembler.headings + 1);
    ExtractedDocument {
        kind,
        text: assembler.blocks.join("\n\n"),
        formatted_elements: assembler.elements,
        has_tables: !raw.tables.is_empty(),
        tables: raw.tables,
        lists: assembler.lists,
        page_or_section_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_line_collapses_whitespace_and_controls() {
        assert_eq!(clean_line("  a \t b\u{7}c   d  "), "a b c d");
        assert_eq!(clean_line("\u{1b}"), "");
    }

    #[test]
    fn test_paragraph_breaks_preserved() {
        let paras = paragraphs("first line\r\nsecond   line\r\n\r\n\r\n\nthird\u{0C}fourth");
        assert_eq!(
            paras,
            vec![
                vec!["first line".to_string(), "second line".to_string()],
                vec!["third".to_string()],
                vec!["fourth".to_string()],
            ]
        );
    }

    #[test]
    fn test_heading_heuristic() {
        assert_eq!(heading_level("PROJECT ALPHA"), Some(1));
        assert_eq!(heading_level("## Timeline"), Some(2));
        assert_eq!(heading_level("Deliverables:"), Some(2));
        assert_eq!(heading_level("THIS IS A SENTENCE."), None);
        assert_eq!(heading_level("Ordinary sentence in lowercase"), None);
        assert_eq!(heading_level("2025"), None);
        assert_eq!(heading_level(&"A".repeat(120)), None);
        assert_eq!(heading_level("| A | B |"), None);
    }

    #[test]
    fn test_list_items() {
        assert_eq!(list_item("- dig"), Some("dig"));
        assert_eq!(list_item("• pour"), Some("pour"));
        assert_eq!(list_item("12) review"), Some("review"));
        assert_eq!(list_item("3. ship"), Some("ship"));
        assert_eq!(list_item("2025-01-01 kickoff"), None);
        assert_eq!(list_item("-dash"), None);
    }

    #[test]
    fn test_tab_separated_tables() {
        let tables = detect_tables("Task\tOwner\tDue\nDig\tAnn\t2025-01-10\n\nnot a table");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 2);
        assert_eq!(tables[0][0], vec!["Task", "Owner", "Due"]);
    }

    #[test]
    fn test_single_delimited_line_is_not_a_table() {
        assert!(detect_tables("a | b\nplain text").is_empty());
    }

    #[test]
    fn test_assemble_structure() {
        let raw = RawContent {
            text: "OVERVIEW\nThe plan covers\ntwo phases.\n\nSteps:\n1. Design\n2. Build\nDone soon".to_string(),
            tables: Vec::new(),
            page_count: None,
        };
        let doc = assemble(DocumentKind::Text, raw, ExtractOptions { annotate_headers: true });

        assert_eq!(
            doc.text,
            "# OVERVIEW\nThe plan covers\ntwo phases.\n\n## Steps:\n1. Design\n2. Build\nDone soon"
        );
        assert_eq!(doc.lists, vec![vec!["Design".to_string(), "Build".to_string()]]);
        assert_eq!(doc.page_or_section_count, 3);
        assert!(!doc.has_tables);

        let kinds: Vec<ElementType> = doc.formatted_elements.iter().map(|e| e.element_type).collect();
        assert_eq!(
            kinds,
            vec![
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::Heading,
                ElementType::ListItem,
                ElementType::ListItem,
                ElementType::Paragraph,
            ]
        );
        assert_eq!(doc.formatted_elements[1].text, "The plan covers two phases.");
    }

    #[test]
    fn test_annotation_can_be_disabled() {
        let raw = RawContent { text: "SUMMARY\nbody".to_string(), tables: Vec::new(), page_count: Some(4) };
        let doc = assemble(DocumentKind::Pdf, raw, ExtractOptions { annotate_headers: false });
        assert_eq!(doc.text, "SUMMARY\nbody");
        assert_eq!(doc.page_or_section_count, 4);
        assert_eq!(doc.formatted_elements[0].heading_level, Some(1));
    }
}
