//! Opaque continuation tokens.
//!
//! A token is the lowercase hex of the cursor's JSON encoding. Callers treat
//! it as an opaque string; only this module knows its shape.

use crate::{error::InternalError, key::CompositeKey};
use serde::{Deserialize, Serialize};

/// Longest token accepted from callers, in hex characters.
pub const MAX_TOKEN_LEN: usize = 8 * 1024;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

///
/// TokenError
///
/// Why a caller-supplied token could not be turned back into bytes.
///

#[derive(Debug, Eq, thiserror::Error, PartialEq)]
pub enum TokenError {
    #[error("continuation token is blank")]
    Blank,

    #[error("continuation token is {len} characters long, limit is {max}")]
    Oversized { len: usize, max: usize },

    #[error("continuation token has an odd length ({len})")]
    OddLength { len: usize },

    #[error("continuation token has non-hex character {found:?} at offset {offset}")]
    NotHex { offset: usize, found: char },
}

/// Hex-encode token bytes.
#[must_use]
pub fn encode_token(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|&byte| [byte >> 4, byte & 0x0f])
        .map(|nibble| char::from(HEX_DIGITS[usize::from(nibble)]))
        .collect()
}

/// Decode a hex token; surrounding whitespace and either letter case are
/// accepted.
pub fn decode_token(token: &str) -> Result<Vec<u8>, TokenError> {
    let token = token.trim();
    match token.len() {
        0 => return Err(TokenError::Blank),
        len if len > MAX_TOKEN_LEN => {
            return Err(TokenError::Oversized {
                len,
                max: MAX_TOKEN_LEN,
            });
        }
        len if !len.is_multiple_of(2) => return Err(TokenError::OddLength { len }),
        _ => {}
    }

    token
        .as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(pair, digits)| {
            let high = nibble(digits[0], pair * 2)?;
            let low = nibble(digits[1], pair * 2 + 1)?;
            Ok::<u8, TokenError>((high << 4) | low)
        })
        .collect()
}

fn nibble(digit: u8, offset: usize) -> Result<u8, TokenError> {
    char::from(digit)
        .to_digit(16)
        .and_then(|value| u8::try_from(value).ok())
        .ok_or_else(|| TokenError::NotHex {
            offset,
            found: char::from(digit),
        })
}

///
/// ContinuationCursor
///
/// Resume point of the next page: the first row at or after
/// `(start_key, start_doc_id)` in merge order. `start_doc_id == None`
/// admits every id at `start_key`.
///
/// Without deduplication one document can surface from several partitions
/// at the same `(key, id)`; `skip` counts those copies already returned.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContinuationCursor {
    pub start_key: CompositeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skip: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(count: &usize) -> bool {
    *count == 0
}

impl ContinuationCursor {
    #[must_use]
    pub const fn new(start_key: CompositeKey, start_doc_id: Option<String>) -> Self {
        Self {
            start_key,
            start_doc_id,
            skip: 0,
        }
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Opaque token handed to callers.
    pub fn encode(&self) -> Result<String, InternalError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|err| InternalError::serialize_internal(err.to_string()))?;

        Ok(encode_token(&bytes))
    }

    /// Parse a token produced by [`Self::encode`].
    pub fn decode(token: &str) -> Result<Self, InternalError> {
        let bytes = decode_token(token).map_err(|err| {
            InternalError::cursor_invariant(format!("invalid continuation cursor: {err}"))
        })?;

        serde_json::from_slice(&bytes).map_err(|err| {
            InternalError::cursor_invariant(format!("invalid continuation cursor payload: {err}"))
        })
    }
}
