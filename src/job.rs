//! Editable list of input files
//!
//! Front ends keep the user's selection in a [`FileList`] and turn it into
//! a [`MergeJob`] when the user asks for a merge.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::pdf::merge::MergeJob;

/// Ordered list of unique PDF paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    paths: Vec<PathBuf>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entries, skipping non-PDF and already listed paths
    ///
    /// Entries may still carry the `{...}` braces drag and drop puts around
    /// paths with spaces. The `.pdf` extension is matched case-insensitively,
    /// so `B.PDF` is accepted too. Returns how many paths were added.
    pub fn add_files<I, S>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.paths.len();
        for entry in entries {
            let entry = entry.as_ref().trim().trim_start_matches('{').trim_end_matches('}');
            if entry.is_empty() {
                continue;
            }
            let path = PathBuf::from(entry);
            if !is_pdf(&path) {
                debug!(path = %path.display(), "skipping non-PDF file");
                continue;
            }
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
        self.paths.len() - before
    }

    /// Split a drag and drop payload into paths
    ///
    /// Paths are separated by whitespace; a path containing spaces is
    /// wrapped in braces.
    pub fn parse_drop_payload(payload: &str) -> Vec<String> {
        let mut paths = Vec::new();
        let mut chars = payload.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if c == '{' {
                chars.next();
                let path: String = chars.by_ref().take_while(|&c| c != '}').collect();
                paths.push(path);
            } else {
                let mut path = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    path.push(c);
                    chars.next();
                }
                paths.push(path);
            }
        }
        paths
    }

    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        (index < self.paths.len()).then(|| self.paths.remove(index))
    }

    /// Move an entry by `delta` places
    ///
    /// Returns the new index, or `None` (leaving the list alone) when either
    /// position is out of range.
    pub fn move_by(&mut self, index: usize, delta: isize) -> Option<usize> {
        let target = index.checked_add_signed(delta)?;
        if index >= self.paths.len() || target >= self.paths.len() {
            return None;
        }
        let path = self.paths.remove(index);
        self.paths.insert(target, path);
        Some(target)
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Build a merge job from the current list
    pub fn to_job(
        &self,
        watermark: Option<PathBuf>,
        password: Option<String>,
        compress: bool,
    ) -> Result<MergeJob> {
        if self.paths.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(MergeJob {
            inputs: self.paths.clone(),
            watermark,
            stamp_text: None,
            password,
            compress,
        })
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> FileList {
        let mut files = FileList::new();
        files.add_files(entries);
        files
    }

    #[test]
    fn test_add_files_filters_and_dedupes() {
        let mut files = FileList::new();
        let added = files.add_files(["a.pdf", "notes.txt", "B.PDF", "a.pdf", "{my file.pdf}", ""]);

        assert_eq!(added, 3);
        assert_eq!(
            files.paths(),
            [PathBuf::from("a.pdf"), PathBuf::from("B.PDF"), PathBuf::from("my file.pdf")]
        );
    }

    #[test]
    fn test_parse_drop_payload() {
        let payload = "/tmp/a.pdf {/tmp/with space.pdf}  /tmp/b.pdf";
        assert_eq!(
            FileList::parse_drop_payload(payload),
            vec!["/tmp/a.pdf", "/tmp/with space.pdf", "/tmp/b.pdf"]
        );
        assert!(FileList::parse_drop_payload("   ").is_empty());
    }

    #[test]
    fn test_remove() {
        let mut files = list(&["a.pdf", "b.pdf"]);
        assert_eq!(files.remove(5), None);
        assert_eq!(files.remove(0), Some(PathBuf::from("a.pdf")));
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_move_by_bounds() {
        let mut files = list(&["a.pdf", "b.pdf", "c.pdf"]);

        assert_eq!(files.move_by(0, -1), None);
        assert_eq!(files.move_by(2, 1), None);
        assert_eq!(files.move_by(7, -1), None);
        assert_eq!(files.paths()[0], PathBuf::from("a.pdf"));

        assert_eq!(files.move_by(0, 2), Some(2));
        assert_eq!(
            files.paths(),
            [PathBuf::from("b.pdf"), PathBuf::from("c.pdf"), PathBuf::from("a.pdf")]
        );
        assert_eq!(files.move_by(2, -1), Some(1));
        assert_eq!(files.paths()[1], PathBuf::from("a.pdf"));
    }

    #[test]
    fn test_to_job() {
        assert!(matches!(FileList::new().to_job(None, None, false), Err(Error::EmptyInput)));

        let job = list(&["a.pdf", "b.pdf"])
            .to_job(Some("w.pdf".into()), Some("pw".into()), true)
            .unwrap();
        assert_eq!(job.inputs.len(), 2);
        assert_eq!(job.watermark, Some(PathBuf::from("w.pdf")));
        assert_eq!(job.password(), Some("pw"));
        assert!(job.compress);
    }
}
