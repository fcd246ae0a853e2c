//! PDF text extraction.
//!
//! Uses `pdf-extract` to pull plain text out of every page, in page order.
//! Extraction is CPU-bound; async callers run it under
//! `tokio::task::spawn_blocking`.

use thiserror::Error;

/// File extension accepted for upload, compared case-insensitively.
pub const PDF_EXTENSION: &str = ".pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
}

/// Whether `filename` looks like a PDF. Extension only, no content sniffing.
pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_lowercase().ends_with(PDF_EXTENSION)
}

/// Extract the full text of a PDF held in memory.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Single-page PDF showing `phrase` in Helvetica, with a correct xref
    /// table so strict parsers accept it.
    pub(crate) fn pdf_with_text(phrase: &str) -> Vec<u8> {
        pdf_with_content(&format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase))
    }

    /// Same document with a raw page content stream; only `/F1` is defined.
    pub(crate) fn pdf_with_content(content: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(
            format!(
                "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content.len(),
                content
            )
            .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn pdf_extension_check_is_case_insensitive() {
        assert!(is_pdf_filename("paper.pdf"));
        assert!(is_pdf_filename("PAPER.PDF"));
        assert!(is_pdf_filename("notes.v2.Pdf"));
        assert!(!is_pdf_filename("paper.pdf.txt"));
        assert!(!is_pdf_filename("paper"));
        assert!(!is_pdf_filename("pdf"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
        assert!(err.to_string().starts_with("Failed to extract text from PDF"));
    }

    #[test]
    fn minimal_pdf_yields_its_text() {
        let text = extract_pdf(&pdf_with_text("docchat test phrase")).unwrap();
        assert!(text.contains("test phrase"), "got: {:?}", text);
    }
}
