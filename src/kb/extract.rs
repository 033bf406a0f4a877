// src/kb/extract.rs
// Full-text extraction for the three mime kinds the knowledge base
// supports (design doc §4.2 step 3: "provider-specific extraction for
// doc/pdf/sheet"). The document provider itself is an external
// collaborator (§1); this module only turns whatever bytes it returns
// into plain text.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{CoreError, CoreResult};

use super::types::MimeKind;

/// Office Open XML documents (docx/xlsx) are zip archives of XML parts.
/// `document_xml_path` picks which part holds the visible text.
fn extract_ooxml_text(bytes: &[u8], document_xml_path: &str) -> CoreResult<String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| CoreError::UpstreamPermanent(format!("not a valid office document: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(document_xml_path)
        .map_err(|e| CoreError::UpstreamPermanent(format!("missing {document_xml_path}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                if let Ok(unescaped) = t.unescape() {
                    text.push_str(&unescaped);
                    text.push(' ');
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CoreError::Internal(format!("xml parse error: {e}"))),
        }
    }

    Ok(text.trim().to_string())
}

fn extract_docx_text(bytes: &[u8]) -> CoreResult<String> {
    extract_ooxml_text(bytes, "word/document.xml")
}

/// Xlsx stores cell text in a shared strings table plus per-sheet
/// references; for a knowledge-base chunker we only need readable text,
/// so concatenate every shared string rather than reconstructing cells.
fn extract_xlsx_text(bytes: &[u8]) -> CoreResult<String> {
    extract_ooxml_text(bytes, "xl/sharedStrings.xml")
}

fn extract_pdf_text(bytes: &[u8]) -> CoreResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| CoreError::UpstreamPermanent(format!("pdf extraction failed: {e}")))
}

fn extract_plain_text(bytes: &[u8]) -> CoreResult<String> {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if had_errors {
        let (latin1_text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        return Ok(latin1_text.into_owned());
    }
    Ok(text.into_owned())
}

/// Normalize raw provider bytes into plain text (design doc §4.2 step 4).
/// Falls back to a lossy plain-text decode for any doc kind whose
/// structured extraction fails, since a partial document is still useful
/// KB context and the sync protocol treats failures as per-document, not
/// fatal to the whole run.
pub fn extract_text(bytes: &[u8], mime_kind: MimeKind, content_type_hint: Option<&str>) -> CoreResult<String> {
    let is_zip = bytes.len() >= 4 && &bytes[0..2] == b"PK";

    match mime_kind {
        MimeKind::Pdf => extract_pdf_text(bytes),
        MimeKind::Sheet if is_zip => extract_xlsx_text(bytes).or_else(|_| extract_plain_text(bytes)),
        MimeKind::Doc if is_zip || content_type_hint == Some("docx") => {
            extract_docx_text(bytes).or_else(|_| extract_plain_text(bytes))
        }
        _ => extract_plain_text(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trips_utf8() {
        let bytes = "battery SOC threshold is 20%".as_bytes();
        let text = extract_text(bytes, MimeKind::Doc, None).unwrap();
        assert_eq!(text, "battery SOC threshold is 20%");
    }

    #[test]
    fn invalid_zip_falls_back_to_plain_text_for_sheet() {
        let bytes = b"PKnot actually a zip but starts like one";
        let text = extract_text(bytes, MimeKind::Sheet, None).unwrap();
        assert!(text.contains("not actually a zip"));
    }
}
