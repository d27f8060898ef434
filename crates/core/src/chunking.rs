use crate::error::IngestError;
use crate::models::{Document, IngestionOptions};

/// Separators tried from coarsest to finest. The empty separator splits
/// into single characters, so every piece eventually fits.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Collapses runs of spaces and tabs inside each line while keeping line and
/// paragraph breaks, which the splitter uses as boundaries.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .replace("\r\n", "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `text` into chunks of at most `chunk_size` characters, repeating up
/// to `chunk_overlap` characters of context between neighbours.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|piece| !piece.is_empty()).collect()
    };

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) <= config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, separator, config));
            pending.clear();
        }

        if finer.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, finer, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, separator, config));
    }

    chunks
}

/// Greedily packs pieces into chunks, carrying trailing pieces of the
/// previous chunk forward while they fit inside the overlap.
fn merge_pieces(pieces: &[&str], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        let joined_len = if window.is_empty() { 0 } else { separator_len };

        if total + piece_len + joined_len > config.chunk_size && !window.is_empty() {
            chunks.push(window.iter().copied().collect::<Vec<_>>().join(separator));

            while let Some(front) = window.front() {
                let gap = if window.len() > 1 { separator_len } else { 0 };
                let over_overlap = total > config.chunk_overlap;
                let still_too_big = total + piece_len + separator_len > config.chunk_size;
                if !(over_overlap || (still_too_big && total > 0)) {
                    break;
                }
                total -= char_len(front) + gap;
                window.pop_front();
            }
        }

        total += piece_len + if window.is_empty() { 0 } else { separator_len };
        window.push_back(piece);
    }

    if !window.is_empty() {
        chunks.push(window.iter().copied().collect::<Vec<_>>().join(separator));
    }

    chunks
}

/// Splits page documents into chunk documents. Each chunk inherits the page
/// number and source of the page it came from.
pub fn split_documents(pages: &[Document], config: ChunkingConfig) -> Vec<Document> {
    pages
        .iter()
        .flat_map(|page| {
            split_text(&page.content, config).into_iter().map(move |text| {
                let mut chunk = Document::new(text);
                chunk.metadata.page = page.metadata.page;
                chunk.metadata.source = page.metadata.source.clone();
                chunk
            })
        })
        .collect()
}
