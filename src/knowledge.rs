//! Knowledge Store: official reference text loaded once at startup.
//!
//! Walks the configured folder, keeps files matching `include_globs`, and
//! concatenates their text page by page under a source header:
//!
//! ```text
//!
//! --- SOURCE: ltfrb_fare_matrix.pdf ---
//! <page 1 text>
//!
//! --- SOURCE: ltfrb_fare_matrix.pdf ---
//! <page 2 text>
//! ```
//!
//! PDFs contribute at most `max_pages` pages each; text and Markdown files
//! count as one page. Files are visited in sorted path order. A file that
//! fails to read or extract is skipped with a warning, and a missing root
//! yields an empty store. The store is immutable once built.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;

/// Load statistics for one reference document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDocument {
    pub name: String,
    pub path: PathBuf,
    pub pages: usize,
    pub chars: usize,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    text: String,
    documents: Vec<KnowledgeDocument>,
}

impl KnowledgeStore {
    /// Scan `config.root`. Only an invalid glob pattern is an error.
    pub fn load(config: &KnowledgeConfig) -> Result<Self> {
        let include_set = build_globset(&config.include_globs)?;
        let root = &config.root;

        if !root.exists() {
            warn!(root = %root.display(), "knowledge root does not exist, starting empty");
            return Ok(Self::default());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable knowledge entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if include_set.is_match(relative) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let mut store = Self::default();
        for path in paths {
            match read_pages(&path, config.max_pages) {
                Ok(pages) => store.add_document(&path, pages),
                Err(e) => warn!(path = %path.display(), "skipping knowledge document: {:#}", e),
            }
        }

        info!(
            documents = store.documents.len(),
            chars = store.text.chars().count(),
            "knowledge store loaded"
        );
        Ok(store)
    }

    /// A store holding exactly `text`, with no document stats.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            documents: Vec::new(),
        }
    }

    pub fn reference_text(&self) -> &str {
        &self.text
    }

    pub fn documents(&self) -> &[KnowledgeDocument] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn add_document(&mut self, path: &Path, pages: Vec<String>) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut chars = 0;
        for page in &pages {
            chars += page.chars().count();
            self.text.push_str(&format!("\n--- SOURCE: {} ---\n", name));
            self.text.push_str(page);
            self.text.push('\n');
        }

        self.documents.push(KnowledgeDocument {
            name,
            path: path.to_path_buf(),
            pages: pages.len(),
            chars,
        });
    }
}

fn read_pages(path: &Path, max_pages: usize) -> Result<Vec<String>> {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        let bytes = std::fs::read(path)?;
        let mut pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
        pages.truncate(max_pages);
        Ok(pages)
    } else {
        Ok(vec![std::fs::read_to_string(path)?])
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
