//! Indexing pipeline: download/extract → walk → chunk → embed → insert.
//!
//! Mirrors the reference app's connector-driven sync flow (walk the
//! tree with `walkdir`, process items, report counts), but the only
//! "connector" here is the filesystem: a directory already on disk, or
//! a ZIP archive fetched from a URL and extracted with zip-slip
//! protection.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use ragforge_core::chunk::chunk_markdown;
use ragforge_core::models::Chunk;
use ragforge_core::store::VectorStore;

use crate::config::Config;
use crate::llm::LLMProvider;

pub struct IndexReport {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_written: usize,
    /// Document ids successfully indexed, handed to the caller so it
    /// can schedule tree building per document.
    pub document_ids: Vec<String>,
}

/// Downloads `url` into `data_dir`, extracts it if it is a ZIP archive
/// (zip-slip protected), then indexes the resulting directory.
pub async fn index_from_url(
    config: &Config,
    llm: Arc<dyn LLMProvider>,
    store: Arc<dyn VectorStore>,
    url: &str,
    data_dir: &Path,
) -> Result<IndexReport> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let response = reqwest::get(url).await.with_context(|| format!("failed to download {url}"))?;
    if !response.status().is_success() {
        bail!("download of {url} failed with status {}", response.status());
    }
    let bytes = response.bytes().await.with_context(|| format!("failed to read body of {url}"))?;

    let target_dir = if is_zip(&bytes) {
        let extract_root = data_dir.join("extracted");
        extract_zip_safely(&bytes, &extract_root)?;
        extract_root
    } else {
        let file_name = url.rsplit('/').next().unwrap_or("downloaded.md");
        let dest = data_dir.join(file_name);
        std::fs::write(&dest, &bytes)?;
        data_dir.to_path_buf()
    };

    index_directory(config, llm, store, &target_dir).await
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[0..4] == b"PK\x03\x04"
}

/// Extracts a ZIP archive's entries under `root`, rejecting any entry
/// whose name resolves outside it (zip-slip).
fn extract_zip_safely(bytes: &[u8], root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("not a valid zip archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping zip entry with unsafe path");
            continue;
        };
        let out_path = root.join(enclosed);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

/// Walks `dir` for files matching `config.chunking.file_extensions`,
/// chunks and embeds them in batches, and inserts into `store`.
///
/// Per-file parse/embed failures are logged and skipped; the overall
/// operation only fails if the directory itself cannot be read or the
/// collection cannot be created.
pub async fn index_directory(
    config: &Config,
    llm: Arc<dyn LLMProvider>,
    store: Arc<dyn VectorStore>,
    dir: &Path,
) -> Result<IndexReport> {
    if !dir.is_dir() {
        bail!("index path is not a directory: {}", dir.display());
    }
    store
        .create_collection(&config.vectorstore.collection, config.vectorstore.dim)
        .await
        .context("failed to create vector store collection")?;

    let files = walk_matching_files(dir, &config.chunking.file_extensions);

    let mut report = IndexReport {
        files_indexed: 0,
        files_failed: 0,
        chunks_written: 0,
        document_ids: Vec::new(),
    };

    for batch in files.chunks(config.llm.embed_batch_size) {
        for path in batch {
            match index_one_file(config, llm.as_ref(), store.as_ref(), path).await {
                Ok((n, document_id)) => {
                    report.files_indexed += 1;
                    report.chunks_written += n;
                    report.document_ids.push(document_id);
                }
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "failed to index file");
                    report.files_failed += 1;
                }
            }
        }
        if config.vectorstore.insert_throttle_secs > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(config.vectorstore.insert_throttle_secs)).await;
        }
    }

    Ok(report)
}

async fn index_one_file(
    config: &Config,
    llm: &dyn LLMProvider,
    store: &dyn VectorStore,
    path: &Path,
) -> Result<(usize, String)> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let document_id = document_id_for_path(path);
    let document_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let mut chunks = chunk_markdown(
        &document_id,
        &document_name,
        &content,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );
    if chunks.is_empty() {
        return Ok((0, document_id));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = llm.embed(&texts).await.context("embedding request failed")?;
    attach_embeddings(&mut chunks, embeddings)?;

    store
        .insert(&config.vectorstore.collection, &chunks)
        .await
        .context("vector store insert failed")?;

    Ok((chunks.len(), document_id))
}

/// Stable document id: SHA-256 of the file's absolute path, so
/// re-indexing the same tree always yields the same ids instead of
/// minting a fresh one per run.
fn document_id_for_path(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(absolute.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn attach_embeddings(chunks: &mut [Chunk], embeddings: Vec<Vec<f32>>) -> Result<()> {
    if embeddings.len() != chunks.len() {
        bail!("embedding provider returned {} vectors for {} chunks", embeddings.len(), chunks.len());
    }
    for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
        chunk.embedding = embedding;
    }
    Ok(())
}

fn walk_matching_files(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_zip_detects_magic_bytes() {
        assert!(is_zip(b"PK\x03\x04rest"));
        assert!(!is_zip(b"not a zip"));
    }

    #[test]
    fn document_id_for_path_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.md");
        std::fs::write(&file, "hello").unwrap();

        let a = document_id_for_path(&file);
        let b = document_id_for_path(&file);
        assert_eq!(a, b);
    }

    #[test]
    fn document_id_for_path_differs_across_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file_a = dir.path().join("a.md");
        let file_b = dir.path().join("b.md");
        std::fs::write(&file_a, "hello").unwrap();
        std::fs::write(&file_b, "hello").unwrap();

        assert_ne!(document_id_for_path(&file_a), document_id_for_path(&file_b));
    }

    #[test]
    fn walk_matching_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.mdx"), "hello").unwrap();

        let files = walk_matching_files(dir.path(), &["md".to_string(), "mdx".to_string()]);
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"a.md".to_string()));
        assert!(names.contains(&"c.mdx".to_string()));
        assert!(!names.contains(&"b.txt".to_string()));
    }

    #[test]
    fn extract_zip_safely_rejects_path_traversal_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
            writer.start_file("../escape.md", opts).unwrap();
            std::io::Write::write_all(&mut writer, b"malicious").unwrap();
            writer.start_file("safe.md", opts).unwrap();
            std::io::Write::write_all(&mut writer, b"fine").unwrap();
            writer.finish().unwrap();
        }

        let root = dir.path().join("extracted");
        extract_zip_safely(&buf, &root).unwrap();

        assert!(root.join("safe.md").exists());
        assert!(!dir.path().join("escape.md").exists());
    }

    #[test]
    fn attach_embeddings_rejects_length_mismatch() {
        let mut chunks = vec![Chunk {
            id: "a".into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "hi".into(),
            embedding: vec![],
            level: 0,
            parent_id: String::new(),
            node_type: ragforge_core::models::NodeType::Leaf,
        }];
        let result = attach_embeddings(&mut chunks, vec![]);
        assert!(result.is_err());
    }
}
