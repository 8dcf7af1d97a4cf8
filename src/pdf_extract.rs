// src/pdf_extract.rs

use lopdf::Document;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{error, info, warn};

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned / image-only — there is nothing to read.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

impl PdfContent {
    /// The extracted text, or an empty string for anything unreadable.
    pub fn into_text(self) -> String {
        match self {
            PdfContent::Text(text) => text,
            PdfContent::ScannedImage | PdfContent::Error(_) => String::new(),
        }
    }
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages above which the whole document counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

/// Main entry point: takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // pdf-extract panics on some malformed font dictionaries
    let extracted =
        catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(pdf_bytes)));

    match extracted {
        Ok(Ok(text)) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short — treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = text.chars().count(), "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            PdfContent::Error(e.to_string())
        }
        Err(panic_info) => {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!(panic = %msg, "pdf-extract panicked on malformed PDF");
            PdfContent::Error(format!("text extraction panicked: {msg}"))
        }
    }
}

/// Heuristic: inspect the PDF object tree for signs that the pages
/// are just images with no text operators.
///
/// A page whose `Resources` carry XObject images but **no** Font
/// entries is almost certainly a scan.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell — let text extraction try
    }

    let resource = |page_dict: &lopdf::Dictionary, key: &[u8]| -> bool {
        page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .and_then(|res| res.get(key).ok())
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .is_some_and(|d| !d.is_empty())
    };

    let image_only_pages = pages
        .values()
        .filter_map(|id| doc.get_object(*id).ok())
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|page| resource(*page, b"XObject") && !resource(*page, b"Font"))
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}
