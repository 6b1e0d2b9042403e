//! PDF manipulation module

pub mod compose;
pub mod compress;
pub mod crypt;
pub mod document;
pub mod merge;
pub mod metadata;
pub mod objects;
pub mod stamp;
pub mod writer;

// Re-export commonly used items
pub use compose::{compose, fit_transform};
pub use compress::{Compressor, FlateCompressor};
pub use crypt::{Encryptor, StandardEncryptor};
pub use document::{Document, Page};
pub use merge::{merge_to_file, run, run_with, write_output, FsSource, MergeJob, Source};
pub use metadata::{count_pages, inspect, inspect_path, PdfMetadata};
pub use stamp::{text_watermark, StampOptions};
pub use writer::{FinishOptions, OutputDocument};
