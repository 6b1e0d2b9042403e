//! PDF Collate Library
//!
//! Merges an ordered list of PDF files into one document. This library
//! provides functionality to:
//! - Merge PDF files page by page, in list order
//! - Stamp every page with a watermark page or a text label, scaled to fit
//! - Recompress content streams
//! - Password-protect the output (standard security handler, RC4)
//! - Extract metadata (page counts, sizes, title)
//!
//! # Example
//!
//! ```no_run
//! use pdf_collate::pdf::{merge_to_file, MergeJob};
//! use std::path::Path;
//!
//! let job = MergeJob::new(vec!["1. intro.pdf".into(), "2. advanced.pdf".into()])
//!     .with_password("secret");
//!
//! merge_to_file(&job, Path::new("merged.pdf")).expect("Failed to merge PDFs");
//! ```

pub mod error;
pub mod geometry;
pub mod job;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result, Stage};
pub use job::FileList;
pub use pdf::{MergeJob, OutputDocument};
