//! Document Extraction
//!
//! Turns an uploaded PDF, DOCX or plain-text document into normalized text
//! plus lightweight structural hints (headings, lists, tables). Every reader
//! validates its input before parsing: the file must exist, be non-empty,
//! stay under the format's size ceiling and carry the right container magic.

pub mod docx;
pub mod normalize;
pub mod pdf;
pub mod text;

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::{AppError, AppResult};

pub use normalize::{ElementType, FormattedElement};

const MIB: usize = 1024 * 1024;

/// Rows of cells
pub type Table = Vec<Vec<String>>;

#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Bytes),
}

/// A submitted document awaiting extraction
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    /// Content type declared by the uploader, if any
    pub content_type: Option<String>,
    pub source: DocumentSource,
}

impl Document {
    pub fn from_bytes(filename: impl Into<String>, content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            source: DocumentSource::Bytes(bytes.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, content_type: Option<String>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename,
            content_type,
            source: DocumentSource::Path(path),
        }
    }

    fn load(&self) -> AppResult<Bytes> {
        match &self.source {
            DocumentSource::Bytes(bytes) => Ok(bytes.clone()),
            DocumentSource::Path(path) => {
                if !path.is_file() {
                    return Err(AppError::Validation(format!("file not found: {}", path.display())));
                }
                std::fs::read(path)
                    .map(Bytes::from)
                    .map_err(|e| AppError::Extraction(format!("could not read {}: {e}", path.display())))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    /// Declared content type first, then the file extension, then magic bytes
    pub fn detect(filename: &str, content_type: Option<&str>, bytes: &[u8]) -> AppResult<Self> {
        if let Some(kind) = content_type
            .and_then(|declared| declared.trim().parse::<mime::Mime>().ok())
            .and_then(|declared| Self::from_mime(&declared))
        {
            return Ok(kind);
        }
        if let Some(kind) = mime_guess::from_path(filename)
            .iter()
            .find_map(|guessed| Self::from_mime(&guessed))
        {
            return Ok(kind);
        }
        Self::sniff(bytes).ok_or_else(|| {
            AppError::Validation(format!("unsupported document type: {filename}"))
        })
    }

    fn from_mime(content_type: &mime::Mime) -> Option<Self> {
        let subtype = content_type.subtype();
        if content_type.type_() == mime::TEXT {
            return Some(Self::Text);
        }
        if content_type.type_() != mime::APPLICATION {
            return None;
        }
        match subtype.as_str() {
            "pdf" => Some(Self::Pdf),
            "vnd.openxmlformats-officedocument.wordprocessingml.document" => Some(Self::Docx),
            "json" => Some(Self::Text),
            // application/octet-stream and friends say nothing about the format
            _ => None,
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        if pdf::has_pdf_header(bytes) {
            Some(Self::Pdf)
        } else if docx::has_zip_magic(bytes) {
            Some(Self::Docx)
        } else if text::looks_like_text(bytes) {
            Some(Self::Text)
        } else {
            None
        }
    }

    pub fn max_bytes(self) -> usize {
        match self {
            Self::Pdf => 50 * MIB,
            Self::Docx => 25 * MIB,
            Self::Text => 10 * MIB,
        }
    }
}

/// Normalized text plus structural hints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub kind: DocumentKind,
    pub text: String,
    pub formatted_elements: Vec<FormattedElement>,
    pub tables: Vec<Table>,
    pub lists: Vec<Vec<String>>,
    pub has_tables: bool,
    pub page_or_section_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Prefix detected heading lines with `#` markers in the output text
    pub annotate_headers: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { annotate_headers: true }
    }
}

/// What a format reader hands back before normalization
#[derive(Debug, Default)]
pub(crate) struct RawContent {
    pub text: String,
    pub tables: Vec<Table>,
    /// Page count for paginated formats; otherwise derived from headings
    pub page_count: Option<usize>,
}

/// Validate and extract a document synchronously
pub fn extract_document(document: &Document, options: ExtractOptions) -> AppResult<ExtractedDocument> {
    let bytes = document.load()?;
    if bytes.is_empty() {
        return Err(AppError::Validation(format!("{} is empty", document.filename)));
    }

    let kind = DocumentKind::detect(&document.filename, document.content_type.as_deref(), &bytes)?;
    if bytes.len() > kind.max_bytes() {
        return Err(AppError::Validation(format!(
            "{} is {} bytes, the limit for {:?} documents is {} bytes",
            document.filename,
            bytes.len(),
            kind,
            kind.max_bytes()
        )));
    }
    debug!(filename = %document.filename, ?kind, size = bytes.len(), "Extracting document");

    let raw = match kind {
        DocumentKind::Pdf => pdf::read(&bytes)?,
        DocumentKind::Docx => docx::read(&bytes)?,
        DocumentKind::Text => text::read(&bytes)?,
    };

    let extracted = normalize::assemble(kind, raw, options);
    if extracted.text.trim().is_empty() {
        return Err(AppError::Extraction("document contains no extractable text".to_string()));
    }

    info!(
        filename = %document.filename,
        ?kind,
        chars = extracted.text.chars().count(),
        tables = extracted.tables.len(),
        units = extracted.page_or_section_count,
        "Document extracted"
    );
    Ok(extracted)
}

/// Run extraction on the blocking pool, abandoning it if `cancel` fires first
pub async fn extract(
    document: Document,
    options: ExtractOptions,
    cancel: &CancellationToken,
) -> AppResult<ExtractedDocument> {
    let task = tokio::task::spawn_blocking(move || extract_document(&document, options));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        joined = task => joined.map_err(|e| AppError::Internal(format!("extraction task failed: {e}")))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_prefers_declared_type() {
        let kind = DocumentKind::detect("notes.txt", Some("application/pdf"), b"hello").unwrap();
        assert_eq!(kind, DocumentKind::Pdf);

        let kind = DocumentKind::detect("scan.pdf", Some("Text/Plain; charset=utf-8"), b"hello").unwrap();
        assert_eq!(kind, DocumentKind::Text);
    }

    #[test]
    fn test_detect_falls_back_to_extension_then_magic() {
        assert_eq!(
            DocumentKind::detect("plan.docx", Some("application/octet-stream"), b"").unwrap(),
            DocumentKind::Docx
        );
        assert_eq!(DocumentKind::detect("plan.md", None, b"# Plan").unwrap(), DocumentKind::Text);
        assert_eq!(DocumentKind::detect("upload", None, b"%PDF-1.7\n").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::detect("upload", None, b"PK\x03\x04rest").unwrap(), DocumentKind::Docx);
        assert!(matches!(
            DocumentKind::detect("upload", None, &[0u8, 159, 146, 150]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_document_rejected() {
        let doc = Document::from_bytes("empty.txt", None, Vec::new());
        assert!(matches!(extract_document(&doc, ExtractOptions::default()), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_missing_file_rejected() {
        let doc = Document::from_path("/definitely/not/here.pdf", None);
        let err = extract_document(&doc, ExtractOptions::default()).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_size_ceiling_enforced() {
        let big = vec![b'a'; DocumentKind::Text.max_bytes() + 1];
        let doc = Document::from_bytes("big.txt", Some("text/plain".to_string()), big);
        let err = extract_document(&doc, ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_whitespace_only_text_is_extraction_error() {
        let doc = Document::from_bytes("blank.txt", None, b" \n\t\n  ".to_vec());
        let err = extract_document(&doc, ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[test]
    fn test_extract_text_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "PROJECT ALPHA\n\nPhase 1: Foundation\n- Dig the site\n- Pour concrete").unwrap();

        let doc = Document::from_path(file.path(), None);
        let extracted = extract_document(&doc, ExtractOptions::default()).unwrap();
        assert_eq!(extracted.kind, DocumentKind::Text);
        assert!(extracted.text.contains("# PROJECT ALPHA"));
        assert_eq!(extracted.lists, vec![vec!["Dig the site".to_string(), "Pour concrete".to_string()]]);
    }

    #[tokio::test]
    async fn test_cancelled_extraction() {
        let token = CancellationToken::new();
        token.cancel();
        let doc = Document::from_bytes("a.txt", None, b"some text".to_vec());
        let err = extract(doc, ExtractOptions::default(), &token).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }
}
