//! The decoder port boundary (§4.2.1): the raw binary decoders (PDF
//! rendering, OCR, DOC/PPTX conversion, spreadsheet parsing) are out of
//! scope, so the dispatch table and the adaptive tiling policy are exercised
//! against these traits instead.

use crate::error::Result;

/// A rendered page of a document. `width_px`/`height_px` are what the
/// adaptive-tiling policy (`crate::tiling`) needs to decide tile layout;
/// `bytes` is the page image handed to C1 vision for OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_index: usize,
    pub width_px: u32,
    pub height_px: u32,
    pub bytes: Vec<u8>,
}

impl RenderedPage {
    pub fn area_px(&self) -> u64 {
        self.width_px as u64 * self.height_px as u64
    }

    pub fn max_edge_px(&self) -> u32 {
        self.width_px.max(self.height_px)
    }
}

/// Decodes a byte blob directly to text, for formats with no visual layout.
pub trait TextDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<String>;
}

/// Renders a document to a sequence of pages, for formats that need OCR
/// (pdf, doc, docx, odt, pptx after conversion).
pub trait PageRenderer: Send + Sync {
    fn render_pages(&self, bytes: &[u8]) -> Result<Vec<RenderedPage>>;
}

/// Splits a spreadsheet workbook into per-sheet `(virtual file name, csv
/// text)` pairs (§4.2, xls/xlsx row).
pub trait SheetSplitter: Send + Sync {
    fn split(&self, bytes: &[u8]) -> Result<Vec<(String, String)>>;
}
