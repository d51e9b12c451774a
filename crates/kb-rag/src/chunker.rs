//! Heading- and paragraph-aware document chunker

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use kb_core::{Chunk, ChunkingConfig};

/// Markdown ATX heading: one to six `#`, blank space, then the title
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").expect("heading pattern is valid"));

/// One or more blank lines between paragraphs
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("paragraph pattern is valid")
});

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Sentence terminators honoured when trimming overlap text
const SENTENCE_ENDS: [char; 3] = ['。', '？', '！'];

/// A span of the document under one heading
#[derive(Debug)]
struct Section<'a> {
    title: Option<String>,
    content: &'a str,
    /// Character offset of `content` in the document
    start: usize,
}

/// Converts increasing byte offsets to character offsets without rescanning
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// Splits documents into ordered chunks of bounded size.
///
/// Sections start at Markdown headings and carry the heading text as their
/// title. Sections longer than `max_size` characters are packed greedily
/// from whole paragraphs; a paragraph is never split, so a single oversized
/// paragraph becomes an oversized chunk. Consecutive chunks of one section
/// share up to `overlap` trailing characters.
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    config: ChunkingConfig,
}

impl DocumentChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk `content`. `source_ref` only labels log lines.
    pub fn chunk_document(&self, content: &str, source_ref: &str) -> Vec<Chunk> {
        if content.trim().is_empty() {
            debug!(source = source_ref, "blank document, nothing to chunk");
            return Vec::new();
        }

        let mut chunks = Vec::new();
        for section in split_sections(content) {
            self.chunk_section(&section, &mut chunks);
        }

        debug!(source = source_ref, chunks = chunks.len(), "document chunked");
        chunks
    }

    fn chunk_section(&self, section: &Section<'_>, chunks: &mut Vec<Chunk>) {
        let max_size = self.config.max_size;
        let section_len = section.content.chars().count();

        if section_len <= max_size {
            push_chunk(chunks, section.content.to_string(), section.start, &section.title);
            return;
        }

        let mut buffer = String::new();
        let mut buffer_len = 0;
        let mut start = section.start;

        for paragraph in split_paragraphs(section.content) {
            let paragraph_len = paragraph.chars().count();

            if !buffer.is_empty() && buffer_len + paragraph_len > max_size {
                let content = buffer.trim().to_string();
                let content_len = content.chars().count();

                // Seed overlap only when it cannot push the next chunk past
                // max_size + overlap; an oversized paragraph stands alone
                let overlap = if paragraph_len + PARAGRAPH_SEPARATOR.len() > max_size {
                    String::new()
                } else {
                    self.overlap_text(&content)
                };
                let overlap_len = overlap.chars().count();

                push_chunk(chunks, content, start, &section.title);

                start = (start + content_len).saturating_sub(overlap_len);
                buffer.clear();
                buffer_len = 0;
                if !overlap.is_empty() {
                    buffer.push_str(&overlap);
                    buffer.push_str(PARAGRAPH_SEPARATOR);
                    buffer_len = overlap_len + PARAGRAPH_SEPARATOR.len();
                }
            }

            buffer.push_str(paragraph);
            buffer.push_str(PARAGRAPH_SEPARATOR);
            buffer_len += paragraph_len + PARAGRAPH_SEPARATOR.len();
        }

        let rest = buffer.trim();
        if !rest.is_empty() {
            push_chunk(chunks, rest.to_string(), start, &section.title);
        }
    }

    /// Trailing text of a flushed chunk that seeds the next one
    fn overlap_text(&self, text: &str) -> String {
        let text_len = text.chars().count();
        let size = self.config.overlap.min(text_len);
        if size == 0 {
            return String::new();
        }

        let window: Vec<char> = text.chars().skip(text_len - size).collect();
        let sentence_end = window.iter().rposition(|c| SENTENCE_ENDS.contains(c));

        match sentence_end {
            Some(pos) if pos > size / 2 => {
                window[pos + 1..].iter().collect::<String>().trim().to_string()
            }
            _ => window.iter().collect::<String>().trim().to_string(),
        }
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, content: String, start: usize, title: &Option<String>) {
    let len = content.chars().count();
    chunks.push(Chunk {
        content,
        start_index: start,
        end_index: start + len,
        chunk_index: chunks.len(),
        title: title.clone(),
    });
}

/// Split at heading lines; each heading line opens the section it titles
fn split_sections(content: &str) -> Vec<Section<'_>> {
    let mut boundaries: Vec<(usize, Option<String>)> = vec![(0, None)];
    for caps in HEADING.captures_iter(content) {
        let (Some(line), Some(title)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let title = Some(title.as_str().trim().to_string());
        if line.start() == 0 {
            boundaries[0].1 = title;
        } else {
            boundaries.push((line.start(), title));
        }
    }

    let mut cursor = CharCursor::new(content);
    let mut sections = Vec::with_capacity(boundaries.len());

    for (i, (begin, title)) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).map_or(content.len(), |(next, _)| *next);
        let raw = &content[*begin..end];
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let leading = raw.len() - raw.trim_start().len();
        sections.push(Section {
            title: title.clone(),
            content: trimmed,
            start: cursor.advance_to(begin + leading),
        });
    }

    sections
}

fn split_paragraphs(section: &str) -> impl Iterator<Item = &str> {
    PARAGRAPH_BREAK
        .split(section)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}
