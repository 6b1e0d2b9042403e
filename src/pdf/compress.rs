//! Content stream compression
//!
//! Streams are re-encoded with zlib through flate2. A stream is only
//! replaced when the new encoding is strictly smaller; anything else is
//! left exactly as it was.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Object, Stream};

use crate::error::{Error, Result};

/// Something that can shrink a stream losslessly
pub trait Compressor {
    /// Returns whether the stream was changed
    fn compress(&self, stream: &mut Stream) -> Result<bool>;
}

/// Flate (zlib) compressor
#[derive(Debug, Clone, Copy)]
pub struct FlateCompressor {
    level: u32,
}

impl FlateCompressor {
    /// Compression level 0 to 9
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for FlateCompressor {
    fn default() -> Self {
        Self::new(9)
    }
}

impl Compressor for FlateCompressor {
    fn compress(&self, stream: &mut Stream) -> Result<bool> {
        if !stream.allows_compression {
            return Ok(false);
        }

        let plain = match current_encoding(stream) {
            Encoding::Plain => stream.content.clone(),
            Encoding::Flate => match inflate(&stream.content) {
                Some(plain) => plain,
                None => return Ok(false),
            },
            Encoding::Other => return Ok(false),
        };

        let encoded = deflate(&plain, self.level)?;
        if encoded.len() >= stream.content.len() {
            return Ok(false);
        }

        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        stream.dict.remove(b"DecodeParms");
        stream.set_content(encoded);
        Ok(true)
    }
}

enum Encoding {
    Plain,
    Flate,
    Other,
}

fn current_encoding(stream: &Stream) -> Encoding {
    let filter = match stream.dict.get(b"Filter") {
        Err(_) => return Encoding::Plain,
        Ok(filter) => filter,
    };
    // Predictors change the byte layout; leave those streams alone
    if stream.dict.has(b"DecodeParms") {
        return Encoding::Other;
    }

    let names: Vec<&[u8]> = match filter {
        Object::Name(name) => vec![name.as_slice()],
        Object::Array(items) => items.iter().filter_map(|o| o.as_name().ok()).collect(),
        _ => return Encoding::Other,
    };
    match names.as_slice() {
        [] => Encoding::Plain,
        [b"FlateDecode"] => Encoding::Flate,
        _ => Encoding::Other,
    }
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).ok()?;
    Some(out)
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| Error::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn repetitive_content() -> Vec<u8> {
        b"0 0 m 100 100 l S\n".repeat(200)
    }

    #[test]
    fn test_compresses_plain_stream() {
        let original = repetitive_content();
        let mut stream = Stream::new(dictionary! {}, original.clone());

        assert!(FlateCompressor::default().compress(&mut stream).unwrap());
        assert!(stream.content.len() < original.len());
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
        assert_eq!(inflate(&stream.content).unwrap(), original);
    }

    #[test]
    fn test_recompresses_weak_flate_stream() {
        let original = repetitive_content();
        let weak = deflate(&original, 1).unwrap();
        let mut stream = Stream::new(dictionary! { "Filter" => "FlateDecode" }, weak.clone());

        let changed = FlateCompressor::new(9).compress(&mut stream).unwrap();

        assert_eq!(inflate(&stream.content).unwrap(), original);
        assert!(stream.content.len() <= weak.len());
        assert_eq!(changed, stream.content != weak);
    }

    #[test]
    fn test_incompressible_stream_is_unchanged() {
        let mut stream = Stream::new(dictionary! {}, b"q Q".to_vec());
        assert!(!FlateCompressor::default().compress(&mut stream).unwrap());
        assert_eq!(stream.content, b"q Q".to_vec());
        assert!(!stream.dict.has(b"Filter"));
    }

    #[test]
    fn test_foreign_filters_are_left_alone() {
        let mut stream = Stream::new(dictionary! { "Filter" => "DCTDecode" }, vec![0xFF; 512]);
        assert!(!FlateCompressor::default().compress(&mut stream).unwrap());
        assert_eq!(stream.content, vec![0xFF; 512]);
    }

    #[test]
    fn test_corrupt_flate_stream_is_left_alone() {
        let mut stream = Stream::new(dictionary! { "Filter" => "FlateDecode" }, vec![1, 2, 3, 4]);
        assert!(!FlateCompressor::default().compress(&mut stream).unwrap());
        assert_eq!(stream.content, vec![1, 2, 3, 4]);
    }
}
