use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use scrollpdf_core::{
    file_name_for_path, DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider,
    PageSize, PageSurface, RenderRequest, TextLine,
};
use tracing::{debug, instrument, warn};

const PDF_MAGIC: &[u8] = b"%PDF-";
const LIBRARY_PATH_ENV: &str = "SCROLLPDF_PDFIUM_LIBRARY_PATH";

/// True for files with a `.pdf` extension that start with the PDF header.
pub fn is_pdf_file(path: &Path) -> Result<bool> {
    let has_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !has_extension {
        return Ok(false);
    }
    let mut file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut header = [0u8; 5];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == PDF_MAGIC),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to read {:?}", path)),
    }
}

/// Splits extracted page text into lines positioned evenly down the page.
/// Blank lines keep their slot so paragraphs stay apart.
pub fn layout_text_lines(text: &str) -> Vec<TextLine> {
    let lines: Vec<&str> = text.lines().collect();
    let count = lines.len().max(1) as f32;
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| TextLine {
            text: line.trim_end().to_owned(),
            top: idx as f32 / count,
        })
        .collect()
}

pub struct PdfiumDocumentProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocumentProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumDocumentProvider {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        if !is_pdf_file(&absolute)? {
            bail!("{:?} is not a PDF document", path);
        }
        let document = PdfiumDocument::extract(&self.pdfium, absolute)?;
        Ok(Arc::new(document))
    }
}

struct ExtractedPage {
    size: PageSize,
    text: String,
}

/// A document whose page sizes and text were pulled out of Pdfium once at
/// open time.
struct PdfiumDocument {
    info: DocumentInfo,
    pages: Vec<ExtractedPage>,
}

impl PdfiumDocument {
    fn extract(pdfium: &Pdfium, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let text = match page.text() {
                Ok(text) => text.all(),
                Err(err) => {
                    warn!(?err, page = index + 1, "failed to extract page text");
                    String::new()
                }
            };
            pages.push(ExtractedPage {
                size: PageSize {
                    width: page.width().value,
                    height: page.height().value,
                },
                text,
            });
        }

        let metadata = document.metadata();
        let title = metadata
            .get(PdfDocumentMetadataTagType::Title)
            .map(|tag| tag.value().to_owned());
        let author = metadata
            .get(PdfDocumentMetadataTagType::Author)
            .map(|tag| tag.value().to_owned());

        debug!(path = %path.display(), pages = pages.len(), "extracted document");
        Ok(Self {
            info: DocumentInfo {
                file_name: file_name_for_path(&path),
                page_count: pages.len(),
                path,
                metadata: DocumentMetadata { title, author },
            },
            pages,
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<PageSurface> {
        let page = self
            .pages
            .get(request.page_index)
            .ok_or_else(|| anyhow!("page {} out of range", request.page_index + 1))?;
        let scale = request.scale.max(0.1);
        Ok(PageSurface {
            page_index: request.page_index,
            size: PageSize {
                width: page.size.width * scale,
                height: page.size.height * scale,
            },
            lines: layout_text_lines(&page.text),
        })
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(LIBRARY_PATH_ENV).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from {} ({}): {}",
                LIBRARY_PATH_ENV, path, err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sniffs_extension_and_header() {
        let dir = tempdir().unwrap();

        let real = dir.path().join("paper.PDF");
        std::fs::write(&real, b"%PDF-1.7\n%fake body").unwrap();
        assert!(is_pdf_file(&real).unwrap());

        let renamed = dir.path().join("notes.pdf");
        std::fs::write(&renamed, b"just some text").unwrap();
        assert!(!is_pdf_file(&renamed).unwrap());

        let short = dir.path().join("tiny.pdf");
        std::fs::write(&short, b"%PD").unwrap();
        assert!(!is_pdf_file(&short).unwrap());

        let wrong_extension = dir.path().join("paper.txt");
        std::fs::write(&wrong_extension, b"%PDF-1.4").unwrap();
        assert!(!is_pdf_file(&wrong_extension).unwrap());

        assert!(is_pdf_file(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn lines_are_spread_down_the_page() {
        let lines = layout_text_lines("Title\r\n\r\nBody text  \nEnd");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].text, "Title");
        assert_eq!(lines[1].text, "");
        assert_eq!(lines[2].text, "Body text");
        assert_eq!(lines[3].top, 0.75);
        assert!(layout_text_lines("").is_empty());
    }

    #[test]
    fn render_scales_page_size() {
        let document = PdfiumDocument {
            info: DocumentInfo {
                path: PathBuf::from("a.pdf"),
                file_name: "a.pdf".into(),
                page_count: 1,
                metadata: DocumentMetadata::default(),
            },
            pages: vec![ExtractedPage {
                size: PageSize {
                    width: 612.0,
                    height: 792.0,
                },
                text: "hello\nworld".into(),
            }],
        };
        let surface = document
            .render_page(RenderRequest {
                page_index: 0,
                scale: 1.5,
            })
            .unwrap();
        assert_eq!(surface.size.width, 918.0);
        assert_eq!(surface.size.height, 1188.0);
        assert_eq!(surface.lines[1].text, "world");
        assert!(document
            .render_page(RenderRequest {
                page_index: 1,
                scale: 1.0,
            })
            .is_err());
    }
}
