use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunking::{split_documents, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::gateway::VectorGateway;
use crate::models::{
    Collection, Document, IngestionOptions, IngestionReport, SkippedPdf, StoredPdf,
};
use crate::summarize::Summarizer;

/// A PDF handed to the pipeline as raw bytes, as received from an upload.
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedPdf {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Turns uploaded PDFs into a summary, overlapping chunks and raw pages, and
/// stores each in its own collection.
pub struct IngestionPipeline {
    gateway: Arc<VectorGateway>,
    summarizer: Summarizer,
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(
        gateway: Arc<VectorGateway>,
        summarizer: Summarizer,
        extractor: Arc<dyn PdfExtractor>,
        options: &IngestionOptions,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            gateway,
            summarizer,
            extractor,
            chunking: ChunkingConfig::try_from(options)?,
        })
    }

    /// Stops at the first file that fails. Collections already written for
    /// earlier files, or earlier steps of the failing file, are kept.
    pub async fn load_and_store(&self, files: &[UploadedPdf]) -> Result<IngestionReport, IngestError> {
        ensure_files(files)?;
        let mut report = IngestionReport::default();
        for file in files {
            report.stored.push(self.ingest_one(file).await?);
        }
        Ok(report)
    }

    /// Like [`load_and_store`](Self::load_and_store) but records failing
    /// files in the report and carries on.
    pub async fn load_and_store_best_effort(
        &self,
        files: &[UploadedPdf],
    ) -> Result<IngestionReport, IngestError> {
        ensure_files(files)?;
        let mut report = IngestionReport::default();
        for file in files {
            match self.ingest_one(file).await {
                Ok(stored) => report.stored.push(stored),
                Err(error) => {
                    warn!(file = %file.file_name, error = %error, "skipping pdf");
                    report.skipped_files.push(SkippedPdf {
                        file_name: file.file_name.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    pub async fn ingest_one(&self, file: &UploadedPdf) -> Result<StoredPdf, IngestError> {
        if file.file_name.trim().is_empty() {
            return Err(IngestError::MissingFileName("<upload>".to_string()));
        }

        let pages = self.extract_pages(file).await?;
        let summary = self.summarizer.summarize(&pages).await?;
        let chunks = split_documents(&pages, self.chunking);

        let summary_ids = self
            .gateway
            .store_embeddings(vec![summary], Collection::Summary)
            .await?;
        let chunk_ids = self
            .gateway
            .store_embeddings(chunks, Collection::SplitedText)
            .await?;
        let page_ids = self
            .gateway
            .store_embeddings(pages, Collection::Documents)
            .await?;

        info!(
            file = %file.file_name,
            pages = page_ids.len(),
            chunks = chunk_ids.len(),
            "pdf ingested"
        );
        Ok(StoredPdf {
            file_name: file.file_name.clone(),
            checksum: digest_bytes(&file.bytes),
            page_ids,
            summary_ids,
            chunk_ids,
            ingested_at: Utc::now(),
        })
    }

    /// Writes the upload to a scoped `.pdf` temp file and parses it there.
    /// The temp file is removed when the blocking task ends, on every path.
    async fn extract_pages(&self, file: &UploadedPdf) -> Result<Vec<Document>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let bytes = file.bytes.clone();

        let pages = tokio::task::spawn_blocking(move || {
            let mut temp = tempfile::Builder::new()
                .prefix("pdf-qa-")
                .suffix(".pdf")
                .tempfile()?;
            temp.write_all(&bytes)?;
            temp.flush()?;
            extractor.extract_pages(temp.path())
        })
        .await
        .map_err(|error| IngestError::Io(std::io::Error::other(error)))??;

        Ok(pages
            .into_iter()
            .map(|page| page.into_document(&file.file_name))
            .collect())
    }
}

fn ensure_files(files: &[UploadedPdf]) -> Result<(), IngestError> {
    if files.is_empty() {
        return Err(IngestError::InvalidArgument("no pdf files to ingest".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{digest_bytes, discover_pdf_files, IngestionPipeline, UploadedPdf};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{IngestError, QaError};
    use crate::extractor::fixtures::text_pdf;
    use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
    use crate::gateway::VectorGateway;
    use crate::models::{Collection, IngestionOptions};
    use crate::prompt::PromptBuilder;
    use crate::stores::InMemoryVectorStore;
    use crate::summarize::Summarizer;
    use crate::test_support::{FaultyStore, ScriptedModel};
    use crate::traits::VectorStore;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Returns fixed pages and remembers which temp file it was given.
    struct FixedPages {
        pages: Vec<String>,
        fail: bool,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FixedPages {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages,
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn seen(&self) -> Vec<PathBuf> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            assert!(path.exists());
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(path.to_path_buf());
            }
            if self.fail {
                return Err(IngestError::PdfParse("unreadable test pdf".to_string()));
            }
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.clone(),
                })
                .collect())
        }
    }

    fn pipeline(
        store: Arc<dyn VectorStore>,
        extractor: Arc<dyn PdfExtractor>,
    ) -> Result<IngestionPipeline, IngestError> {
        let gateway = Arc::new(VectorGateway::new(
            store,
            Arc::new(CharacterNgramEmbedder::default()),
        ));
        let summarizer = Summarizer::new(
            Arc::new(ScriptedModel::fixed("A short summary.")),
            PromptBuilder::new(),
            400_000,
        );
        IngestionPipeline::new(gateway, summarizer, extractor, &IngestionOptions::default())
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"skip me")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[tokio::test]
    async fn from_path_keeps_file_name() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let upload = UploadedPdf::from_path(&path).await?;
        assert_eq!(upload.file_name, "report.pdf");
        assert_eq!(upload.bytes, b"%PDF-1.4");
        Ok(())
    }

    #[tokio::test]
    async fn three_page_pdf_fills_all_collections() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryVectorStore::new());
        let pages = vec![words(200), words(200), words(200)];
        let total: usize = pages.iter().map(|page| page.chars().count()).sum();
        let extractor = Arc::new(FixedPages::new(pages));
        let pipeline = pipeline(store.clone(), extractor.clone())?;

        let report = pipeline
            .load_and_store(&[UploadedPdf::new("report.pdf", b"%PDF".to_vec())])
            .await?;

        assert_eq!(report.stored.len(), 1);
        assert_eq!(store.point_count(Collection::Summary.name()).await, 1);
        assert_eq!(store.point_count(Collection::Documents.name()).await, 3);

        let chunk_count = store.point_count(Collection::SplitedText.name()).await;
        let expected = total.div_ceil(450);
        assert!(chunk_count >= expected && chunk_count <= expected + 3);
        assert_eq!(report.stored[0].chunk_ids.len(), chunk_count);

        let page_payloads = store.payloads(Collection::Documents.name()).await;
        assert!(page_payloads
            .iter()
            .all(|payload| payload["metadata"]["source"] == "report.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn temp_file_is_removed_after_ingestion() -> Result<(), Box<dyn std::error::Error>> {
        let extractor = Arc::new(FixedPages::new(vec!["only page".to_string()]));
        let pipeline = pipeline(Arc::new(InMemoryVectorStore::new()), extractor.clone())?;

        pipeline
            .load_and_store(&[UploadedPdf::new("a.pdf", b"%PDF".to_vec())])
            .await?;

        let seen = extractor.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].extension().and_then(|ext| ext.to_str()), Some("pdf"));
        assert!(!seen[0].exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_page_store_keeps_earlier_collections_and_removes_temp_file(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(FaultyStore::rejecting_upserts_to(Collection::Documents.name()));
        let extractor = Arc::new(FixedPages::new(vec![words(50), words(50)]));
        let pipeline = pipeline(store.clone(), extractor.clone())?;

        let result = pipeline
            .load_and_store(&[UploadedPdf::new("report.pdf", b"%PDF".to_vec())])
            .await;

        assert!(matches!(
            result,
            Err(IngestError::Pipeline(QaError::Provider { status: 400, .. }))
        ));
        assert_eq!(store.inner.point_count(Collection::Summary.name()).await, 1);
        assert!(store.inner.point_count(Collection::SplitedText.name()).await >= 2);
        assert_eq!(store.inner.point_count(Collection::Documents.name()).await, 0);

        let seen = extractor.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|path| !path.exists()));
        Ok(())
    }

    #[tokio::test]
    async fn temp_file_is_removed_when_extraction_fails() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryVectorStore::new());
        let extractor = Arc::new(FixedPages::failing());
        let pipeline = pipeline(store.clone(), extractor.clone())?;

        let report = pipeline
            .load_and_store_best_effort(&[UploadedPdf::new("bad.pdf", b"%PDF".to_vec())])
            .await?;

        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.stored.is_empty());
        let seen = extractor.seen();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
        assert!(store.collection_names().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn real_pdf_is_parsed_from_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LopdfExtractor))?;
        let bytes = text_pdf(&["Revenue grew", "Costs fell", "Outlook stable"]);

        let report = pipeline
            .load_and_store(&[UploadedPdf::new("q3.pdf", bytes.clone())])
            .await?;

        assert_eq!(report.stored[0].page_ids.len(), 3);
        assert_eq!(report.stored[0].checksum, digest_bytes(&bytes));
        Ok(())
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_bad_file() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LopdfExtractor))?;
        let files = [
            UploadedPdf::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec()),
            UploadedPdf::new("good.pdf", text_pdf(&["Fine page"])),
        ];

        let result = pipeline.load_and_store(&files).await;

        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        assert_eq!(store.point_count(Collection::Documents.name()).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn best_effort_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(store.clone(), Arc::new(LopdfExtractor))?;
        let files = [
            UploadedPdf::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec()),
            UploadedPdf::new("good.pdf", text_pdf(&["Fine page"])),
        ];

        let report = pipeline.load_and_store_best_effort(&files).await?;

        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored[0].file_name, "good.pdf");
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].file_name, "broken.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn ingestion_fails_without_files() -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = pipeline(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(LopdfExtractor),
        )?;
        assert!(matches!(
            pipeline.load_and_store_best_effort(&[]).await,
            Err(IngestError::InvalidArgument(_))
        ));
        Ok(())
    }
}
