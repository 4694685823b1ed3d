//! PDF text extraction for uploaded documents.
//!
//! Parsing runs on the blocking pool because `pdf-extract` is synchronous and CPU bound. A
//! failure on any page fails the whole document; there is no per-page recovery.

use thiserror::Error;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Errors raised while turning uploaded bytes into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Upload does not start with a PDF header.
    #[error("file is not a PDF document")]
    NotPdf,
    /// The PDF parser rejected the document.
    #[error("failed to extract text: {0}")]
    Parse(String),
    /// The parser panicked or the blocking task was cancelled.
    #[error("text extraction aborted: {0}")]
    Aborted(String),
}

/// Page texts extracted from a PDF, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Text of each page.
    pub pages: Vec<String>,
}

impl ExtractedDocument {
    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Concatenate the page texts into the document text.
    pub fn text(&self) -> String {
        self.pages.concat()
    }
}

/// Extract the text of every page from PDF bytes.
pub async fn extract_pdf(bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractionError> {
    if !looks_like_pdf(&bytes) {
        return Err(ExtractionError::NotPdf);
    }

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    })
    .await
    .map_err(|error| ExtractionError::Aborted(error.to_string()))?
    .map_err(|error| ExtractionError::Parse(error.to_string()))?;

    let document = ExtractedDocument { pages };
    tracing::debug!(
        pages = document.page_count(),
        "Extracted text from PDF"
    );
    Ok(document)
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    // Some producers emit a BOM or whitespace before the header.
    let header_window = &bytes[..bytes.len().min(1024)];
    header_window
        .windows(PDF_MAGIC.len())
        .any(|window| window == PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_bytes_without_pdf_header() {
        let error = extract_pdf(b"plain text, not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::NotPdf));
    }

    #[tokio::test]
    async fn truncated_pdf_fails_whole_document() {
        let error = extract_pdf(b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ExtractionError::Parse(_) | ExtractionError::Aborted(_)
        ));
    }

    #[tokio::test]
    async fn single_page_pdf_yields_its_text() {
        let bytes = include_bytes!("../../tests/fixtures/alice_cv.pdf").to_vec();
        let document = extract_pdf(bytes).await.expect("extract");
        assert_eq!(document.page_count(), 1);
        assert_eq!(
            document.text().trim(),
            "Alice has 5 years of experience in backend engineering."
        );
    }

    #[test]
    fn header_may_follow_leading_bytes() {
        assert!(looks_like_pdf(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn document_text_concatenates_pages_in_order() {
        let document = ExtractedDocument {
            pages: vec!["First page. ".into(), "Second page.".into()],
        };
        assert_eq!(document.page_count(), 2);
        assert_eq!(document.text(), "First page. Second page.");
    }
}
