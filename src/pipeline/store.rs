//! Page store: the on-disk naming convention for captured pages.
//!
//! Page `i` lives at `<dir>/page_<i:04>.png`. Resume is nothing more than
//! "does that file exist", so this module is the only place allowed to
//! build or parse page file names.
//!
//! Four digits of zero padding keep lexical and natural order identical up
//! to page 9999. Beyond that the names grow a fifth digit; natural ordering
//! (see [`natural_cmp`]) still sorts them correctly, plain `ls` does not.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-name prefix for captured pages.
pub const PAGE_PREFIX: &str = "page_";

/// Extension of captured pages.
pub const PAGE_EXTENSION: &str = "png";

/// Zero-padding width of the page index.
pub const INDEX_WIDTH: usize = 4;

/// Raster formats the build stage accepts, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "webp"];

/// File name for page `index`, e.g. `page_0042.png`.
pub fn page_file_name(index: usize) -> String {
    format!("{PAGE_PREFIX}{index:0width$}.{PAGE_EXTENSION}", width = INDEX_WIDTH)
}

/// Path of page `index` inside `dir`.
pub fn page_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(page_file_name(index))
}

/// Parse a page index back out of a file name produced by [`page_file_name`].
pub fn page_index_of(file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_suffix(PAGE_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether a page file is already on disk.
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Whether `path` carries one of [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// All raster images directly inside `dir`, in natural file-name order.
///
/// Non-recursive. An empty directory yields an empty list.
pub fn list_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| natural_cmp(&file_name_lossy(a), &file_name_lossy(b)));
    debug!("Found {} images in {}", files.len(), dir.display());
    Ok(files)
}

/// Captured page files (names matching the page scheme) inside `dir`.
///
/// A missing directory has no pages.
pub fn existing_pages(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut pages: Vec<(usize, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(index) = page_index_of(&file_name_lossy(&path)) {
            pages.push((index, path));
        }
    }
    pages.sort_by_key(|(index, _)| *index);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// Write `bytes` to `path` through a sibling temp file and a rename.
///
/// A crash mid-write leaves a stray temp file, never a truncated page that
/// resume would mistake for a finished one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Natural ordering ─────────────────────────────────────────────────────

/// One run of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    /// Case-folded non-digit run.
    Text(String),
    /// Digit run with leading zeros stripped, compared by numeric value.
    Number(String),
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Number(a), KeyPart::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            (KeyPart::Number(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split `s` into alternating text and digit runs.
///
/// The key always starts with a (possibly empty) text run, so two keys
/// compare text against text and number against number position by
/// position. Digit runs of any length compare by value without overflow.
pub fn natural_key(s: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            if digits.is_empty() {
                parts.push(KeyPart::Text(std::mem::take(&mut text).to_lowercase()));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                parts.push(number_part(std::mem::take(&mut digits)));
            }
            text.push(ch);
        }
    }
    if !digits.is_empty() {
        parts.push(number_part(digits));
    }
    parts.push(KeyPart::Text(text.to_lowercase()));
    parts
}

fn number_part(digits: String) -> KeyPart {
    let trimmed = digits.trim_start_matches('0');
    KeyPart::Number(trimmed.to_string())
}

/// Total order on file names: natural key first, raw string as tie-break.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a)
        .cmp(&natural_key(b))
        .then_with(|| a.cmp(b))
}
