//! Segment encoding: base64url without padding, three `.`-joined segments.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{Error, Result};

/// Encode one segment.
#[inline]
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode one segment.
#[inline]
pub fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::malformed(format!("base64 ({e})")))
}

/// Split `raw` into header, claims and signature segments.
///
/// Exactly two separators are required.
pub fn split(raw: &str) -> Result<(&str, &str, &str)> {
    let dots = raw.bytes().filter(|b| *b == b'.').count();
    if dots != 2 {
        return Err(Error::malformed(format!(
            "token contains {} segments, expected 3",
            dots + 1
        )));
    }
    let mut parts = raw.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s)) => Ok((h, c, s)),
        _ => Err(Error::malformed("token segments")),
    }
}
