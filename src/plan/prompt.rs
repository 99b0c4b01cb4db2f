// Prompt construction for plan generation

use crate::extraction::{DocumentKind, ExtractedDocument, Table};
use crate::settings::ProcessingSettings;
use crate::types::{GenerationOptions, GenerationPrompt};

const SYSTEM_PROMPT: &str = r#"You are a project planning assistant. You read a document and extract the project plan it describes.

Respond with ONLY a single JSON object. Do not add explanations, prose or markdown code fences.
The object must match this schema:
{
  "title": "string (required)",
  "description": "string",
  "deadline": "YYYY-MM-DD or null",
  "phases": [
    {
      "id": "string (required)",
      "name": "string (required)",
      "description": "string",
      "startDate": "YYYY-MM-DD or null",
      "endDate": "YYYY-MM-DD or null",
      "tasks": [
        {
          "id": "string (required)",
          "name": "string (required)",
          "description": "string",
          "startDate": "YYYY-MM-DD or null",
          "endDate": "YYYY-MM-DD or null",
          "responsiblePersons": [{"name": "string", "role": "string", "contact": "string"}],
          "dependencies": ["task id"],
          "status": "planned | in_progress | completed"
        }
      ]
    }
  ]
}
Rules:
- "phases" must contain at least one phase; group loose tasks into a single phase if the document has none.
- Use ISO dates (YYYY-MM-DD). Leave a date null when the document does not state it.
- Ids must be unique; dependencies refer to task ids.
- Do not invent people, dates or tasks that the document does not mention."#;

const TRUNCATION_MARKER: &str = "\n\n[... document truncated ...]";

/// Prompt plus notes about how the document was fitted into it
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub prompt: GenerationPrompt,
    pub options: GenerationOptions,
    pub truncated: bool,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_chars: usize,
    preserve_structure: bool,
}

impl PromptBuilder {
    pub fn new(settings: &ProcessingSettings) -> Self {
        Self {
            max_chars: settings.max_prompt_chars.max(1),
            preserve_structure: settings.preserve_structure,
        }
    }

    pub fn build(&self, document: &ExtractedDocument) -> BuiltPrompt {
        let mut notes = Vec::new();

        let body = if self.preserve_structure {
            document.text.clone()
        } else {
            flatten_lines(&document.text)
        };
        let (mut body, truncated) = truncate_at_paragraph(&body, self.max_chars);
        if truncated {
            body.push_str(TRUNCATION_MARKER);
            notes.push(format!(
                "Document text was truncated to {} characters before generation",
                self.max_chars
            ));
        }

        let mut user = format!(
            "Source document ({}, {} {}):\n\n{}",
            kind_label(document.kind),
            document.page_or_section_count,
            if document.kind == DocumentKind::Pdf { "page(s)" } else { "section(s)" },
            body
        );

        if self.preserve_structure && document.has_tables {
            user.push_str("\n\nTables found in the document:\n");
            for (i, table) in document.tables.iter().enumerate() {
                user.push_str(&format!("\nTable {}:\n{}", i + 1, render_table(table)));
            }
        }

        user.push_str("\n\nReturn the project plan as a single JSON object.");

        BuiltPrompt {
            prompt: GenerationPrompt {
                system: SYSTEM_PROMPT.to_string(),
                user,
            },
            options: GenerationOptions {
                temperature: None,
                max_tokens: None,
                json_output: true,
            },
            truncated,
            notes,
        }
    }
}

fn kind_label(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => "PDF",
        DocumentKind::Docx => "DOCX",
        DocumentKind::Text => "plain text",
    }
}

/// Keep paragraphs but join the lines inside each one
fn flatten_lines(text: &str) -> String {
    text.split("\n\n")
        .map(|paragraph| paragraph.replace('\n', " "))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut to at most `max_chars` characters, preferring the last paragraph break in the second half
pub fn truncate_at_paragraph(text: &str, max_chars: usize) -> (String, bool) {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };

    let head = &text[..cut];
    let boundary = head
        .rfind("\n\n")
        .filter(|&idx| head[..idx].chars().count() >= max_chars / 2)
        .unwrap_or(cut);
    (text[..boundary].trim_end().to_string(), true)
}

fn render_table(table: &Table) -> String {
    table
        .iter()
        .map(|row| format!("| {} |", row.join(" | ")))
        .collect::<Vec<_>>()
        .join("\n")
}
