//! Content-type detection and gzip handling for OTLP request bodies.

use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::OtlpError;

/// First two bytes of any gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wire encoding of an OTLP payload, derived from the Content-Type header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Protobuf,
    Unknown,
}

/// Classify a Content-Type header value.
///
/// `application/x-protobuf` and `application/protobuf` are both seen in the
/// wild; parameters (`; charset=...`) are ignored.
#[must_use]
pub fn detect_content_type(header: Option<&str>) -> ContentKind {
    let Some(raw) = header else {
        return ContentKind::Unknown;
    };
    let mime = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => ContentKind::Json,
        "application/x-protobuf" | "application/protobuf" => ContentKind::Protobuf,
        _ => ContentKind::Unknown,
    }
}

/// Whether a body announces itself as gzip via its magic bytes.
#[must_use]
pub fn has_gzip_magic(body: &[u8]) -> bool {
    body.len() >= 2 && body[..2] == GZIP_MAGIC
}

/// Decompress the body when EITHER the Content-Encoding header says gzip OR
/// the payload starts with the gzip magic number.
///
/// Exporters routinely compress without setting the header, so the header
/// alone is never trusted. A body that claims gzip but fails to inflate is
/// a whole-request error carrying the inflate message.
pub fn decompress_if_gzip(body: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, OtlpError> {
    let header_says_gzip = content_encoding
        .map(|enc| enc.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    if !header_says_gzip && !has_gzip_magic(body) {
        return Ok(body.to_vec());
    }

    let mut decoder = GzDecoder::new(body);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| OtlpError::Decompress(e.to_string()))?;
    Ok(decompressed)
}
