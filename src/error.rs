//! Error types for the PDF collate library

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF collate library
#[derive(Error, Debug)]
pub enum Error {
    /// Bytes are not a structurally valid PDF
    #[error("Malformed PDF: {0}")]
    Parse(String),

    /// An input document could not be read or parsed
    #[error("Failed to read input {}: {reason}", .path.display())]
    InputParse { path: PathBuf, reason: String },

    /// The watermark document could not be read or parsed
    #[error("Failed to read watermark {}: {reason}", .path.display())]
    WatermarkParse { path: PathBuf, reason: String },

    /// A page with zero width or height was used as an overlay
    #[error("Cannot scale a page of size {width} x {height}")]
    DegenerateGeometry { width: f32, height: f32 },

    /// Nothing to merge
    #[error("No input files provided")]
    EmptyInput,

    /// Encryption setup or decryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Password missing or incorrect for an encrypted document
    #[error("Incorrect or missing password")]
    Authorization,

    /// Stream compression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// The output document could not be produced
    #[error("Cannot write output: {0}")]
    Serialization(String),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Job description rejected
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// PDF object layer error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Job file (de)serialization error
    #[error("Job file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stage of a merge run an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Watermark,
    Compose,
    Encrypt,
    Compress,
    Serialize,
    Job,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "reading inputs",
            Stage::Watermark => "reading watermark",
            Stage::Compose => "stamping pages",
            Stage::Encrypt => "encrypting",
            Stage::Compress => "compressing",
            Stage::Serialize => "writing output",
            Stage::Job => "preparing job",
        };
        f.write_str(name)
    }
}

impl Error {
    /// The stage this error is reported from
    pub fn stage(&self) -> Stage {
        match self {
            Error::Parse(_) | Error::InputParse { .. } | Error::FileNotFound(_) => Stage::Input,
            Error::Authorization => Stage::Input,
            Error::WatermarkParse { .. } => Stage::Watermark,
            Error::DegenerateGeometry { .. } => Stage::Compose,
            Error::Encryption(_) => Stage::Encrypt,
            Error::Compression(_) => Stage::Compress,
            Error::Serialization(_) | Error::Pdf(_) | Error::Io(_) => Stage::Serialize,
            Error::EmptyInput | Error::InvalidJob(_) | Error::Json(_) => Stage::Job,
        }
    }

    /// Path of the offending file, when the error names one
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::InputParse { path, .. }
            | Error::WatermarkParse { path, .. }
            | Error::FileNotFound(path) => Some(path),
            _ => None,
        }
    }
}
