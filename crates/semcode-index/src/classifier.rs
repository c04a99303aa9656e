//! Selects the files of a working tree that are worth embedding.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".jsx", ".tsx", ".php", ".java", ".cpp", ".c", ".h", ".hpp", ".cs",
    ".rb", ".go", ".rs", ".swift", ".kt", ".scala", ".md", ".txt", ".json", ".yaml", ".yml",
    ".xml", ".html", ".css", ".scss", ".sass", ".less", ".sql", ".sh", ".bash", ".zsh",
];

pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "__pycache__",
    ".pytest_cache",
    "venv",
    "env",
    ".env",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Allowed extensions, with or without the leading dot.
    pub extensions: Vec<String>,
    /// Directory names pruned wherever they appear.
    pub ignore_dirs: Vec<String>,
    /// Files strictly larger than this are skipped.
    pub max_file_size_bytes: u64,
    pub respect_gitignore: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|&s| s.to_owned()).collect(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|&s| s.to_owned()).collect(),
            max_file_size_bytes: 2 * 1024 * 1024,
            respect_gitignore: false,
        }
    }
}

/// An eligible file, read and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCandidate {
    /// Path relative to the tree root, `/`-separated.
    pub rel_path: String,
    /// Extension including the leading dot, e.g. `.rs`.
    pub extension: String,
    pub size_bytes: u64,
    /// Last modification time, RFC 3339.
    pub modified: String,
    pub content: String,
    /// blake3 of the raw bytes, hex.
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct FileClassifier {
    extensions: HashSet<String>,
    ignore_dirs: Arc<HashSet<String>>,
    max_file_size_bytes: u64,
    respect_gitignore: bool,
}

impl FileClassifier {
    #[must_use]
    pub fn new(config: &ClassifierConfig) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|e| {
                if e.starts_with('.') {
                    e.clone()
                } else {
                    format!(".{e}")
                }
            })
            .collect();
        Self {
            extensions,
            ignore_dirs: Arc::new(config.ignore_dirs.iter().cloned().collect()),
            max_file_size_bytes: config.max_file_size_bytes,
            respect_gitignore: config.respect_gitignore,
        }
    }

    /// Lazily walk `root`, yielding eligible files in path order.
    ///
    /// Each call starts a fresh walk. Rejected files are logged at debug level
    /// and skipped; the iterator never fails.
    pub fn select<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = FileCandidate> + 'a {
        let ignore_dirs = Arc::clone(&self.ignore_dirs);
        ignore::WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_global(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|n| ignore_dirs.contains(n)))
            })
            .build()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::debug!("walk error: {err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(move |e| self.classify(root, e.path()))
    }

    fn classify(&self, root: &Path, path: &Path) -> Option<FileCandidate> {
        let extension = format!(".{}", path.extension()?.to_str()?);
        if !self.extensions.contains(&extension) {
            return None;
        }

        let meta = std::fs::metadata(path)
            .inspect_err(|e| tracing::debug!(path = %path.display(), "stat failed: {e}"))
            .ok()?;
        let size_bytes = meta.len();
        if size_bytes > self.max_file_size_bytes {
            tracing::debug!(
                path = %path.display(),
                size_bytes,
                max = self.max_file_size_bytes,
                "skipping oversized file"
            );
            return None;
        }
        if size_bytes == 0 {
            return None;
        }

        let bytes = std::fs::read(path)
            .inspect_err(|e| tracing::debug!(path = %path.display(), "read failed: {e}"))
            .ok()?;
        if looks_binary(&bytes) {
            tracing::debug!(path = %path.display(), "skipping binary file");
            return None;
        }

        let content_hash = blake3::hash(&bytes).to_hex().to_string();
        let content = decode(bytes);
        if content.is_empty() {
            return None;
        }

        let modified = meta
            .modified()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        Some(FileCandidate {
            rel_path: relative_path(root, path)?,
            extension,
            size_bytes,
            modified,
            content,
            content_hash,
        })
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// UTF-8 first, Latin-1 otherwise. Latin-1 maps every byte, so this never fails.
fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Count of candidates per extension.
#[must_use]
pub fn language_histogram<'a, I>(candidates: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a FileCandidate>,
{
    let mut histogram = BTreeMap::new();
    for c in candidates {
        *histogram.entry(c.extension.clone()).or_insert(0) += 1;
    }
    histogram
}
