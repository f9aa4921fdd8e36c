//! Per-type text extraction for the indexing pipeline.
//!
//! Plain text and Markdown are read verbatim; PDF and DOCX get real
//! extractors; everything else (notably legacy `.doc`) falls back to a
//! placeholder string. The pipeline contract is a single function, so new
//! extractors slot in per extension without touching the pipeline.

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Never panics; a failed extraction fails that one
/// document's pipeline run and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extracts searchable text from a stored file, dispatching on the original
/// filename's extension.
pub fn extract_text(
    path: &Path,
    original_name: &str,
    mime_type: &str,
) -> Result<String, ExtractError> {
    let ext = crate::models::file_extension(original_name);
    match ext.as_str() {
        ".txt" | ".md" => read_verbatim(path),
        _ if mime_type.starts_with("text/") => read_verbatim(path),
        ".pdf" => extract_pdf(&std::fs::read(path)?),
        ".docx" => extract_docx(&std::fs::read(path)?),
        // Extension point: per-type extractors plug in above this arm.
        _ => Ok(format!("Content from {}", original_name)),
    }
}

fn read_verbatim(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Collects the text runs (`<w:t>` elements) of a WordprocessingML body.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                in_text_run = e.local_name().as_ref() == b"t";
            }
            Ok(quick_xml::events::Event::Text(text)) if in_text_run => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(_)) => in_text_run = false,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
