use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::Document;
use lopdf::Document as PdfDocument;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn into_document(self, source: &str) -> Document {
        Document::new(self.text)
            .with_page(self.number)
            .with_source(source)
    }
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            PdfDocument::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            let text = normalize_whitespace(&text);

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text: text.trim().to_string(),
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}
