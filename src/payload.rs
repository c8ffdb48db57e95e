//! Snapshot payload decoding.
//!
//! The bulk snapshot is served either as plain JSON or as a compressed blob
//! (LZ4 frame or gzip) without a reliable content type, so the leading bytes
//! decide whether decompression is attempted at all.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use lz4_flex::frame::FrameDecoder;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    PlainJson,
    Lz4Frame,
    Gzip,
    Unknown,
}

impl PayloadEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainJson => "json",
            Self::Lz4Frame => "lz4",
            Self::Gzip => "gzip",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8 ({encoding}): {source}")]
    Utf8 {
        encoding: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("payload is not valid JSON ({encoding}): {source}")]
    Json {
        encoding: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn looks_like_json(bytes: &[u8]) -> bool {
    matches!(
        bytes.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

pub fn decompress(bytes: &[u8]) -> Option<(PayloadEncoding, Vec<u8>)> {
    if let Some(out) = read_all(FrameDecoder::new(bytes)) {
        return Some((PayloadEncoding::Lz4Frame, out));
    }
    if let Some(out) = read_all(MultiGzDecoder::new(bytes)) {
        return Some((PayloadEncoding::Gzip, out));
    }
    None
}

pub fn decode_json_payload(bytes: &[u8]) -> Result<(PayloadEncoding, Value), PayloadError> {
    if looks_like_json(bytes) {
        return parse_json(PayloadEncoding::PlainJson, bytes);
    }

    match decompress(bytes) {
        Some((encoding, decompressed)) => {
            debug!(
                component = "payload",
                event = "payload.decompressed",
                encoding = encoding.as_str(),
                compressed_bytes = bytes.len(),
                decompressed_bytes = decompressed.len()
            );
            parse_json(encoding, &decompressed)
        }
        None => parse_json(PayloadEncoding::Unknown, bytes),
    }
}

fn read_all(mut reader: impl Read) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match reader.read_to_end(&mut out) {
        Ok(_) if !out.is_empty() => Some(out),
        _ => None,
    }
}

fn parse_json(encoding: PayloadEncoding, bytes: &[u8]) -> Result<(PayloadEncoding, Value), PayloadError> {
    let text = std::str::from_utf8(bytes).map_err(|source| PayloadError::Utf8 {
        encoding: encoding.as_str(),
        source,
    })?;
    let value = serde_json::from_str(text).map_err(|source| PayloadError::Json {
        encoding: encoding.as_str(),
        source,
    })?;
    Ok((encoding, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};
    use lz4_flex::frame::FrameEncoder;
    use serde_json::json;

    const BODY: &str = r#"[{"name":"Alpha","apr":0.12},{"name":"Beta","tvl":"1000"}]"#;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn lz4(bytes: &[u8]) -> Vec<u8> {
        let mut enc = FrameEncoder::new(Vec::new());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn sniffing_skips_leading_whitespace() {
        assert!(looks_like_json(b"  \n[1]"));
        assert!(looks_like_json(b"{\"a\":1}"));
        assert!(!looks_like_json(b"\x04\x22\x4d\x18"));
        assert!(!looks_like_json(b"   "));
        assert!(!looks_like_json(b""));
    }

    #[test]
    fn plain_json_is_parsed_without_decompression() {
        let (encoding, value) = decode_json_payload(BODY.as_bytes()).unwrap();
        assert_eq!(encoding, PayloadEncoding::PlainJson);
        assert_eq!(value[0]["name"], "Alpha");
    }

    #[test]
    fn lz4_and_gzip_payloads_decode_to_the_same_value() {
        let expected: Value = serde_json::from_str(BODY).unwrap();

        let (encoding, value) = decode_json_payload(&lz4(BODY.as_bytes())).unwrap();
        assert_eq!(encoding, PayloadEncoding::Lz4Frame);
        assert_eq!(value, expected);

        let (encoding, value) = decode_json_payload(&gzip(BODY.as_bytes())).unwrap();
        assert_eq!(encoding, PayloadEncoding::Gzip);
        assert_eq!(value, expected);
    }

    #[test]
    fn concatenated_gzip_members_are_read_in_full() {
        let mut bytes = gzip(br#"[{"name":"Alpha"},"#);
        bytes.extend(gzip(br#"{"name":"Beta"}]"#));

        let (encoding, value) = decode_json_payload(&bytes).unwrap();
        assert_eq!(encoding, PayloadEncoding::Gzip);
        assert_eq!(value, json!([{ "name": "Alpha" }, { "name": "Beta" }]));
    }

    #[test]
    fn undecodable_bytes_fall_back_to_raw_parse_and_fail() {
        let err = decode_json_payload(b"not json at all").unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Json {
                encoding: "unknown",
                ..
            }
        ));
    }

    #[test]
    fn raw_scalar_json_still_parses_when_not_compressed() {
        let (encoding, value) = decode_json_payload(b"42").unwrap();
        assert_eq!(encoding, PayloadEncoding::Unknown);
        assert_eq!(value, json!(42));
    }
}
