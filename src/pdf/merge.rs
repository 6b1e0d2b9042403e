//! The merge pipeline
//!
//! A [`MergeJob`] lists input files in output order plus the optional
//! watermark, password and compression settings. [`run`] turns it into the
//! bytes of a single PDF; nothing is written to disk until the caller hands
//! those bytes to [`write_output`].

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pdf::compose::{check_overlay, compose};
use crate::pdf::compress::FlateCompressor;
use crate::pdf::crypt::StandardEncryptor;
use crate::pdf::document::{Document, Page};
use crate::pdf::stamp::{text_watermark, StampOptions};
use crate::pdf::writer::{FinishOptions, OutputDocument};

/// Options for merging PDFs
///
/// # Example
///
/// ```no_run
/// use pdf_collate::pdf::{merge_to_file, MergeJob};
/// use std::path::Path;
///
/// let job = MergeJob::new(vec!["1. intro.pdf".into(), "2. details.pdf".into()])
///     .with_watermark("draft.pdf")
///     .with_compression(true);
///
/// merge_to_file(&job, Path::new("handout.pdf")).expect("Failed to merge");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeJob {
    /// Input PDF file paths in the order they should be merged
    pub inputs: Vec<PathBuf>,
    /// PDF whose first page is stamped on every output page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<PathBuf>,
    /// Text stamped diagonally on every output page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp_text: Option<String>,
    /// User password for the output; empty means no encryption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Recompress content streams
    pub compress: bool,
}

impl MergeJob {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    pub fn with_watermark(mut self, path: impl Into<PathBuf>) -> Self {
        self.watermark = Some(path.into());
        self
    }

    pub fn with_stamp_text(mut self, text: impl Into<String>) -> Self {
        self.stamp_text = Some(text.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// The password to encrypt with, if any
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Check the job can be attempted at all
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.watermark.is_some() && self.stamp_text.is_some() {
            return Err(Error::InvalidJob(
                "a watermark file and stamp text cannot be combined".to_string(),
            ));
        }
        Ok(())
    }

    /// Read a job from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the job to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_output(json.as_bytes(), path)
    }
}

/// Where input bytes come from
pub trait Source {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads inputs from the file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl Source for FsSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

/// Run a job against the file system and return the merged PDF
pub fn run(job: &MergeJob) -> Result<Vec<u8>> {
    run_with(job, &FsSource)
}

/// Run a job, reading every file through `source`
pub fn run_with<S: Source + ?Sized>(job: &MergeJob, source: &S) -> Result<Vec<u8>> {
    job.validate()?;

    let overlay = load_overlay(job, source)?;
    if let Some(overlay) = &overlay {
        check_overlay(overlay)?;
    }

    let mut output = OutputDocument::new();
    for path in &job.inputs {
        let doc = read_input(path, source)?;
        if doc.page_count() == 0 {
            warn!(path = %path.display(), "input has no pages");
        }
        debug!(path = %path.display(), pages = doc.page_count(), "adding input");

        for page in doc.into_pages() {
            let page = match &overlay {
                Some(overlay) => compose(&page, overlay)?,
                None => page,
            };
            output.push_page(page);
        }
    }

    let mut options = FinishOptions::new();
    if job.compress {
        options = options.compress_with(FlateCompressor::default());
    }
    if let Some(password) = job.password() {
        options = options.encrypt_with(StandardEncryptor::new(password));
    }

    let pages = output.page_count();
    let bytes = output.finish(&options)?;
    info!(
        inputs = job.inputs.len(),
        pages,
        bytes = bytes.len(),
        encrypted = options.encrypts(),
        compressed = options.compresses(),
        "merged document"
    );
    Ok(bytes)
}

/// Run a job and write the result to `output`
///
/// The file is only created once the whole merge succeeded.
pub fn merge_to_file(job: &MergeJob, output: &Path) -> Result<()> {
    let bytes = run(job)?;
    write_output(&bytes, output)
}

/// Write bytes to `path`, creating parent directories as needed
pub fn write_output(bytes: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// The overlay template, from the watermark file or the stamp text
fn load_overlay<S: Source + ?Sized>(job: &MergeJob, source: &S) -> Result<Option<Page>> {
    if let Some(text) = &job.stamp_text {
        let doc = text_watermark(text, &StampOptions::default())?;
        return Ok(doc.into_pages().into_iter().next());
    }

    let path = match &job.watermark {
        Some(path) => path,
        None => return Ok(None),
    };
    let fail = |reason: String| Error::WatermarkParse {
        path: path.clone(),
        reason,
    };

    let bytes = source.read(path).map_err(|e| fail(e.to_string()))?;
    let doc = Document::parse(&bytes).map_err(|e| fail(describe(e)))?;
    let page = doc
        .into_pages()
        .into_iter()
        .next()
        .ok_or_else(|| fail("document has no pages".to_string()))?;
    debug!(path = %path.display(), width = page.width(), height = page.height(), "loaded watermark");
    Ok(Some(page))
}

fn read_input<S: Source + ?Sized>(path: &Path, source: &S) -> Result<Document> {
    let bytes = source.read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::InputParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    Document::parse(&bytes).map_err(|e| Error::InputParse {
        path: path.to_path_buf(),
        reason: describe(e),
    })
}

fn describe(error: Error) -> String {
    match error {
        Error::Parse(reason) => reason,
        Error::Authorization => "document is password protected".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    use crate::geometry::Rect;

    /// In-memory files
    struct MemorySource(HashMap<PathBuf, Vec<u8>>);

    impl Source for MemorySource {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn stamp_pdf(text: &str, page: Rect) -> Vec<u8> {
        text_watermark(text, &StampOptions::default().with_page(page))
            .unwrap()
            .serialize()
            .unwrap()
    }

    fn source() -> MemorySource {
        MemorySource(HashMap::from([
            (PathBuf::from("a.pdf"), stamp_pdf("A", Rect::letter())),
            (PathBuf::from("b.pdf"), stamp_pdf("B", Rect::a4())),
            (PathBuf::from("junk.pdf"), b"%PDF-1.4 junk".to_vec()),
            (PathBuf::from("flat.pdf"), stamp_pdf("F", Rect::from_size(100.0, 100.0))),
        ]))
    }

    fn texts(bytes: &[u8]) -> Vec<Vec<u8>> {
        Document::parse(bytes)
            .unwrap()
            .pages()
            .iter()
            .map(|page| {
                page.operations()
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .flat_map(|op| op.operands[0].as_str().unwrap().to_vec())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = run_with(&MergeJob::default(), &source());
        assert!(matches!(result, Err(Error::EmptyInput)));
    }

    #[test]
    fn test_order_follows_inputs() {
        let job = MergeJob::new(vec!["b.pdf".into(), "a.pdf".into()]);
        let bytes = run_with(&job, &source()).unwrap();
        assert_eq!(texts(&bytes), vec![b"B".to_vec(), b"A".to_vec()]);
    }

    #[test]
    fn test_missing_input_is_reported() {
        let job = MergeJob::new(vec!["a.pdf".into(), "gone.pdf".into()]);
        let err = run_with(&job, &source()).unwrap_err();
        assert!(matches!(&err, Error::FileNotFound(p) if p == Path::new("gone.pdf")));
    }

    #[test]
    fn test_unparsable_input_names_the_file() {
        let job = MergeJob::new(vec!["a.pdf".into(), "junk.pdf".into()]);
        let err = run_with(&job, &source()).unwrap_err();
        assert_eq!(err.path(), Some(Path::new("junk.pdf")));
        assert!(matches!(err, Error::InputParse { .. }));
    }

    #[test]
    fn test_bad_watermark() {
        let job = MergeJob::new(vec!["a.pdf".into()]).with_watermark("junk.pdf");
        let err = run_with(&job, &source()).unwrap_err();
        assert!(matches!(err, Error::WatermarkParse { .. }));

        let job = MergeJob::new(vec!["a.pdf".into()]).with_watermark("nowhere.pdf");
        let err = run_with(&job, &source()).unwrap_err();
        assert!(matches!(err, Error::WatermarkParse { .. }));
    }

    #[test]
    fn test_watermark_is_stamped_on_every_page() {
        let job = MergeJob::new(vec!["a.pdf".into(), "b.pdf".into()]).with_watermark("flat.pdf");
        let bytes = run_with(&job, &source()).unwrap();
        assert_eq!(texts(&bytes), vec![b"AF".to_vec(), b"BF".to_vec()]);
    }

    #[test]
    fn test_stamp_text_and_watermark_conflict() {
        let job = MergeJob::new(vec!["a.pdf".into()])
            .with_watermark("flat.pdf")
            .with_stamp_text("DRAFT");
        assert!(matches!(run_with(&job, &source()), Err(Error::InvalidJob(_))));
    }

    #[test]
    fn test_empty_password_means_no_encryption() {
        let job = MergeJob::new(vec!["a.pdf".into()]).with_password("");
        assert_eq!(job.password(), None);
        let bytes = run_with(&job, &source()).unwrap();
        assert!(Document::parse(&bytes).is_ok());
    }

    #[test]
    fn test_job_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs").join("handout.json");
        let job = MergeJob::new(vec!["a.pdf".into(), "b.pdf".into()])
            .with_stamp_text("DRAFT")
            .with_compression(true);

        job.save(&path).unwrap();
        assert_eq!(MergeJob::load(&path).unwrap(), job);
    }

    #[test]
    fn test_job_file_defaults() {
        let job: MergeJob = serde_json::from_str(r#"{"inputs": ["x.pdf"]}"#).unwrap();
        assert_eq!(job.inputs, vec![PathBuf::from("x.pdf")]);
        assert!(!job.compress);
        assert!(job.watermark.is_none());
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.pdf");
        write_output(b"%PDF-", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-");
    }
}
