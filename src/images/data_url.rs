//! Decoding of inline `data:` URLs (RFC 2397), used for embedded chart icons.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("not a data url")]
    NotDataUrl,
    #[error("data url has no payload separator")]
    MissingComma,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// A decoded data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Returns true when `s` is an inline data URL.
pub fn is_data_url(s: &str) -> bool {
    s.trim_start()
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

impl DataUrl {
    /// Decodes `data:[<mediatype>][;base64],<data>`.
    pub fn decode(s: &str) -> Result<Self, DataUrlError> {
        if !is_data_url(s) {
            return Err(DataUrlError::NotDataUrl);
        }
        let rest = &s.trim_start()[5..];
        let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingComma)?;

        let mut params = header.split(';').map(str::trim);
        let media_type = params
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("text/plain")
            .to_ascii_lowercase();
        let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

        let data = if is_base64 {
            // Whitespace and line breaks are common in hand-written Chart.yaml icons
            let compact: String = percent_decode_str(payload)
                .decode_utf8_lossy()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(&compact)
                .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
                .map_err(|e| DataUrlError::InvalidBase64(e.to_string()))?
        } else {
            percent_decode_str(payload).collect()
        };

        Ok(Self { media_type, data })
    }
}
