//! Markdown heading-aware chunker.
//!
//! Splits a document's Markdown body into [`Chunk`]s: first on heading
//! boundaries (`^#{1,6}\s+…`), tagging each resulting section with its
//! enclosing heading, then into overlapping fixed-size windows within
//! each section to keep individual chunks small and context-preserving.
//!
//! Each chunk receives a UUID, assigned here; the indexer derives the
//! owning document's id separately, as a stable hash of its source path.
//!
//! # Algorithm
//!
//! 1. Walk the text line by line; a line matching a heading pattern opens
//!    a new section tagged with that heading's text. Content before the
//!    first heading is tagged `"Introduction"`.
//! 2. Within each section, slide a `chunk_size`-character window forward
//!    `chunk_size - chunk_overlap` characters at a time.
//! 3. Discard any window with fewer than 20 non-whitespace characters.
//! 4. Guarantee at least one chunk is returned for non-empty input.

use uuid::Uuid;

use crate::models::{Chunk, NodeType};

const MIN_NON_WHITESPACE: usize = 20;

struct Section {
    heading: String,
    content: String,
}

/// Split `text` (the body of `document_name`) into overlapping,
/// heading-tagged chunks.
///
/// `chunk_size` and `chunk_overlap` are counted in Unicode characters.
/// `chunk_overlap` must be less than `chunk_size`; if it is not, it is
/// treated as zero.
pub fn chunk_markdown(
    document_id: &str,
    document_name: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let overlap = if chunk_overlap < chunk_size {
        chunk_overlap
    } else {
        0
    };

    let sections = split_sections(text);
    let mut chunks = Vec::new();

    for section in &sections {
        for window in window_section(&section.content, chunk_size.max(1), overlap) {
            let non_ws = window.chars().filter(|c| !c.is_whitespace()).count();
            if non_ws < MIN_NON_WHITESPACE {
                continue;
            }
            chunks.push(make_chunk(
                document_id,
                document_name,
                &section.heading,
                window,
            ));
        }
    }

    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(make_chunk(document_id, document_name, "Introduction", text.trim()));
    }

    chunks
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading = "Introduction".to_string();
    let mut buf = String::new();

    for line in text.lines() {
        if let Some(h) = heading_text(line) {
            if !buf.trim().is_empty() {
                sections.push(Section {
                    heading: heading.clone(),
                    content: std::mem::take(&mut buf),
                });
            } else {
                buf.clear();
            }
            heading = h;
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }

    if !buf.trim().is_empty() {
        sections.push(Section {
            heading,
            content: buf,
        });
    }

    sections
}

/// Returns the heading text if `line` is a Markdown ATX heading (`#`
/// through `######` followed by whitespace).
fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') && !rest.is_empty() {
        return None;
    }
    Some(rest.trim().to_string())
}

fn window_section(content: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let len = trimmed.len();
    if trimmed.chars().count() <= chunk_size {
        return vec![trimmed];
    }

    let step_chars = chunk_size - overlap;
    let mut windows = Vec::new();
    let mut start_char = 0usize;

    loop {
        let start_byte = char_index_to_byte(trimmed, start_char);
        if start_byte >= len {
            break;
        }
        let end_char = start_char + chunk_size;
        let end_byte = char_index_to_byte(trimmed, end_char).min(len);
        let piece = &trimmed[start_byte..end_byte];
        if !piece.is_empty() {
            windows.push(piece);
        }
        if end_byte >= len {
            break;
        }
        start_char += step_chars.max(1);
    }

    windows
}

fn char_index_to_byte(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

fn make_chunk(document_id: &str, document_name: &str, section: &str, content: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        document_name: document_name.to_string(),
        section: section.to_string(),
        content: content.to_string(),
        embedding: Vec::new(),
        level: 0,
        parent_id: String::new(),
        node_type: NodeType::Leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_markdown("doc1", "doc.md", "Hello, world! This text is long enough.", 700, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "Introduction");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk_markdown("doc1", "doc.md", "", 700, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn headings_tag_sections() {
        let text = "intro text here that is long enough to keep\n\n# Section One\n\nthis is the body of section one and is long enough\n\n## Section Two\n\nthis is the body of section two and is long enough";
        let chunks = chunk_markdown("doc1", "doc.md", text, 700, 50);
        let sections: Vec<&str> = chunks.iter().map(|c| c.section.as_str()).collect();
        assert!(sections.contains(&"Introduction"));
        assert!(sections.contains(&"Section One"));
        assert!(sections.contains(&"Section Two"));
    }

    #[test]
    fn short_chunks_are_discarded() {
        let chunks = chunk_markdown("doc1", "doc.md", "# H\n\nhi", 700, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn overlapping_windows_within_large_section() {
        let body = "word ".repeat(200);
        let chunks = chunk_markdown("doc1", "doc.md", &body, 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= 100);
        }
    }

    #[test]
    fn multibyte_utf8_section() {
        let text = "# 标题\n\n这是一个测试文本，用来验证多字节字符的分块是否安全可靠。".repeat(1);
        let chunks = chunk_markdown("doc1", "doc.md", &text, 20, 5);
        for c in &chunks {
            assert!(c.content.is_char_boundary(0));
        }
    }

    #[test]
    fn deterministic_section_split() {
        let text = "# A\n\nalpha bravo charlie delta echo foxtrot golf\n\n# B\n\nhotel india juliet kilo lima mike";
        let c1 = chunk_markdown("doc1", "doc.md", text, 700, 50);
        let c2 = chunk_markdown("doc1", "doc.md", text, 700, 50);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.section, b.section);
        }
    }
}
