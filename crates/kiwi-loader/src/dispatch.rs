//! Extension-keyed dispatch and the [`FileLoader`] that turns one physical
//! file into one or more token-bounded text streams (§4.2).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kiwi_ai::AiClient;
use kiwi_core::config::LoaderConfig;

use crate::chunk::{chunk_text, count_tokens, Chunk};
use crate::csv_decoder::CsvDecoder;
use crate::decoder::{PageRenderer, SheetSplitter, TextDecoder};
use crate::error::{LoaderError, Result};
use crate::plain::PlainBytesDecoder;
use crate::tiling::{plan_tiles, Tile, TilePlan};

/// Which family of decoder a file extension routes to (§4.2 dispatch table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PlainText,
    Csv,
    Spreadsheet,
    DocumentOcr,
    Pdf,
    Image,
    Audio,
}

/// Looks up the route for a lowercased file extension. Unknown extensions
/// fall back to plain text, matching the `txt, md, (unknown)` row.
pub fn route_for_extension(ext: &str) -> Route {
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "md" => Route::PlainText,
        "csv" => Route::Csv,
        "xls" | "xlsx" => Route::Spreadsheet,
        "doc" | "docx" | "odt" | "pptx" => Route::DocumentOcr,
        "pdf" => Route::Pdf,
        "jpg" | "jpeg" | "png" | "tiff" | "tif" | "webp" | "gif" | "bmp" => Route::Image,
        "mp3" | "wav" | "m4a" | "ogg" | "webm" | "mpeg" | "mp4" | "flac" => Route::Audio,
        _ => Route::PlainText,
    }
}

/// One logical file produced by loading a physical file: the input itself,
/// or (for xls/xlsx) one virtual file per sheet named `{id}-sheet-{n}`.
#[derive(Debug, Clone)]
pub struct LogicalFile {
    pub name: String,
    pub chunks: Vec<Chunk>,
}

fn ocr_prompt(page_index: usize, tile: Option<&Tile>) -> String {
    match tile {
        Some(t) => format!(
            "Transcribe all visible text on page {} within the region x={}, y={}, \
             width={}, height={}. Output plain text only, in reading order.",
            page_index + 1,
            t.x,
            t.y,
            t.width,
            t.height
        ),
        None => format!(
            "Transcribe all visible text on page {}. Output plain text only, in reading order.",
            page_index + 1
        ),
    }
}

/// Loads physical files into chunked text. The three decoder traits are
/// injected so the dispatch logic is testable without real PDF/OCR/office
/// conversion backends.
pub struct FileLoader {
    ai: Arc<AiClient>,
    config: LoaderConfig,
    text_decoder: Arc<dyn TextDecoder>,
    page_renderer: Option<Arc<dyn PageRenderer>>,
    sheet_splitter: Option<Arc<dyn SheetSplitter>>,
}

impl FileLoader {
    pub fn new(ai: Arc<AiClient>, config: LoaderConfig) -> Self {
        Self {
            ai,
            config,
            text_decoder: Arc::new(PlainBytesDecoder),
            page_renderer: None,
            sheet_splitter: None,
        }
    }

    pub fn with_page_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.page_renderer = Some(renderer);
        self
    }

    pub fn with_sheet_splitter(mut self, splitter: Arc<dyn SheetSplitter>) -> Self {
        self.sheet_splitter = Some(splitter);
        self
    }

    /// Loads one physical file identified by `id` (used to name spreadsheet
    /// virtual files) and `name` (used only for the extension lookup).
    pub async fn load(
        &self,
        id: &str,
        name: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<LogicalFile>> {
        let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match route_for_extension(&ext) {
            Route::PlainText => {
                let text = self.text_decoder.decode(bytes)?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&text, self.config.max_tokens_per_unit)?,
                }])
            }
            Route::Csv => {
                let text = CsvDecoder.decode(bytes)?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&text, self.config.max_tokens_per_unit)?,
                }])
            }
            Route::Spreadsheet => {
                let splitter = self
                    .sheet_splitter
                    .as_ref()
                    .ok_or_else(|| LoaderError::Decode("no sheet splitter configured".into()))?;
                let sheets = splitter.split(bytes)?;
                let mut out = Vec::with_capacity(sheets.len());
                for (n, (_sheet_name, csv_text)) in sheets.into_iter().enumerate() {
                    let rendered = CsvDecoder.decode(csv_text.as_bytes())?;
                    out.push(LogicalFile {
                        name: format!("{id}-sheet-{n}"),
                        chunks: chunk_text(&rendered, self.config.max_tokens_per_unit)?,
                    });
                }
                Ok(out)
            }
            Route::DocumentOcr => {
                let text = self.ocr_document(bytes, cancel, false).await?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&text, self.config.max_tokens_per_unit)?,
                }])
            }
            Route::Pdf => {
                let text = self.ocr_document(bytes, cancel, true).await?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&text, self.config.max_tokens_per_unit)?,
                }])
            }
            Route::Image => {
                let description = self
                    .ai
                    .describe_image(
                        "Transcribe all visible text in this image, then briefly describe it. \
                         Output plain text only.",
                        bytes,
                        cancel,
                    )
                    .await?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&description, self.config.max_tokens_per_unit)?,
                }])
            }
            Route::Audio => {
                let transcript = self.ai.transcribe_audio(bytes, None, cancel).await?;
                Ok(vec![LogicalFile {
                    name: name.to_string(),
                    chunks: chunk_text(&transcript, self.config.max_tokens_per_unit)?,
                }])
            }
        }
    }

    /// Renders a doc-like file to pages and OCRs each one, applying the
    /// adaptive tiling policy only when `allow_tiling` (the `pdf` route).
    async fn ocr_document(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
        allow_tiling: bool,
    ) -> Result<String> {
        let renderer = self
            .page_renderer
            .as_ref()
            .ok_or_else(|| LoaderError::Decode("no page renderer configured".into()))?;
        let pages = renderer.render_pages(bytes)?;

        let mut out = String::new();
        for page in &pages {
            if cancel.is_cancelled() {
                return Err(LoaderError::Cancelled);
            }
            let plan = if allow_tiling {
                plan_tiles(page, &self.config)
            } else {
                TilePlan::Whole
            };
            match plan {
                TilePlan::Whole => {
                    let text = self
                        .ai
                        .describe_image(&ocr_prompt(page.page_index, None), &page.bytes, cancel)
                        .await?;
                    out.push_str(&text);
                    out.push('\n');
                }
                TilePlan::Tiles(tiles) => {
                    for tile in &tiles {
                        let text = self
                            .ai
                            .describe_image(
                                &ocr_prompt(page.page_index, Some(tile)),
                                &page.bytes,
                                cancel,
                            )
                            .await?;
                        out.push_str(&text);
                        out.push('\n');
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Token count an already-decoded file's full text would occupy, for
/// populating `ProjectFile.token_count` ahead of chunking.
pub fn full_text_token_count(text: &str) -> i64 {
    count_tokens(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RenderedPage;
    use async_trait::async_trait;
    use kiwi_ai::{AiClient, AiClientConfig, ProviderMetrics};
    use std::sync::Arc;

    #[test]
    fn routes_known_extensions() {
        assert_eq!(route_for_extension("TXT"), Route::PlainText);
        assert_eq!(route_for_extension("csv"), Route::Csv);
        assert_eq!(route_for_extension("xlsx"), Route::Spreadsheet);
        assert_eq!(route_for_extension("docx"), Route::DocumentOcr);
        assert_eq!(route_for_extension("pdf"), Route::Pdf);
        assert_eq!(route_for_extension("png"), Route::Image);
        assert_eq!(route_for_extension("mp3"), Route::Audio);
    }

    #[test]
    fn unknown_extension_falls_back_to_plain_text() {
        assert_eq!(route_for_extension("xyz"), Route::PlainText);
        assert_eq!(route_for_extension(""), Route::PlainText);
    }

    struct FakeRenderer {
        pages: Vec<RenderedPage>,
    }

    impl PageRenderer for FakeRenderer {
        fn render_pages(&self, _bytes: &[u8]) -> Result<Vec<RenderedPage>> {
            Ok(self.pages.clone())
        }
    }

    struct FakeSplitter;

    impl SheetSplitter for FakeSplitter {
        fn split(&self, _bytes: &[u8]) -> Result<Vec<(String, String)>> {
            Ok(vec![
                ("Sheet1".into(), "a,b\n1,2\n".into()),
                ("Sheet2".into(), "c,d\n3,4\n".into()),
            ])
        }
    }

    fn test_ai() -> Arc<AiClient> {
        struct NoopProvider;
        #[async_trait]
        impl kiwi_ai::AiPort for NoopProvider {
            fn provider_name(&self) -> &str {
                "noop"
            }
            fn embed_dim(&self) -> usize {
                8
            }
            async fn send(&self, _req: &kiwi_ai::port::ChatRequest) -> kiwi_ai::Result<kiwi_ai::types::ChatOutcome> {
                unimplemented!()
            }
            async fn embed_raw(&self, _text: &str) -> kiwi_ai::Result<Vec<f32>> {
                unimplemented!()
            }
            async fn describe_image(&self, _prompt: &str, _image: &[u8]) -> kiwi_ai::Result<String> {
                Ok("page text".to_string())
            }
            async fn transcribe_audio(&self, _bytes: &[u8], _language: Option<&str>) -> kiwi_ai::Result<String> {
                Ok("audio transcript".to_string())
            }
        }
        Arc::new(AiClient::new(
            Arc::new(NoopProvider),
            Arc::new(ProviderMetrics::default()),
            AiClientConfig {
                default_model: "test".into(),
                default_temperature_complete: 0.3,
                default_temperature_structured: 0.1,
                default_temperature_chat: 0.2,
                embed_dim: 8,
                chat_concurrency: 1,
                embed_concurrency: 1,
                image_concurrency: 1,
                timeout: None,
            },
        ))
    }

    #[tokio::test]
    async fn plain_text_round_trips_through_chunker() {
        let loader = FileLoader::new(test_ai(), LoaderConfig::default());
        let files = loader
            .load("f1", "notes.txt", b"hello world", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].chunks[0].text, "hello world");
    }

    #[tokio::test]
    async fn spreadsheet_produces_one_virtual_file_per_sheet() {
        let loader = FileLoader::new(test_ai(), LoaderConfig::default())
            .with_sheet_splitter(Arc::new(FakeSplitter));
        let files = loader
            .load("f1", "book.xlsx", b"irrelevant", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "f1-sheet-0");
        assert_eq!(files[1].name, "f1-sheet-1");
    }

    #[tokio::test]
    async fn spreadsheet_without_splitter_errors() {
        let loader = FileLoader::new(test_ai(), LoaderConfig::default());
        let err = loader
            .load("f1", "book.xlsx", b"irrelevant", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Decode(_)));
    }

    #[tokio::test]
    async fn pdf_route_ocrs_each_page() {
        let renderer = FakeRenderer {
            pages: vec![
                RenderedPage { page_index: 0, width_px: 800, height_px: 600, bytes: vec![1] },
                RenderedPage { page_index: 1, width_px: 800, height_px: 600, bytes: vec![2] },
            ],
        };
        let loader = FileLoader::new(test_ai(), LoaderConfig::default())
            .with_page_renderer(Arc::new(renderer));
        let files = loader
            .load("f1", "report.pdf", b"irrelevant", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        let full: String = files[0].chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(full.matches("page text").count(), 2);
    }

    #[tokio::test]
    async fn image_route_calls_describe_image() {
        let loader = FileLoader::new(test_ai(), LoaderConfig::default());
        let files = loader
            .load("f1", "scan.png", b"irrelevant", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files[0].chunks[0].text, "page text");
    }

    #[tokio::test]
    async fn audio_route_calls_transcribe_audio() {
        let loader = FileLoader::new(test_ai(), LoaderConfig::default());
        let files = loader
            .load("f1", "memo.mp3", b"irrelevant", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files[0].chunks[0].text, "audio transcript");
    }
}
