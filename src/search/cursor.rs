//! Opaque pagination cursors.
//!
//! A cursor is URL-safe base64 of the JSON rank key of the last item on the
//! previous page. The next page starts strictly after that key, so items
//! inserted or removed between requests never duplicate or shift results.

use std::cmp::Ordering;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Invalid cursor: {0}")]
    Malformed(String),

    #[error("Cursor belongs to a different result ordering")]
    ModeMismatch,
}

/// Position of an item in a result ordering.
///
/// Ordered by `primary` desc, `secondary` desc, `created_at` desc, then `id`
/// asc. Scored results use the score as `primary`; browse results use the
/// counters of the selected sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankKey {
    pub primary: f64,
    pub secondary: f64,
    /// Microseconds since the epoch
    pub created_at: i64,
    pub id: String,
}

impl RankKey {
    /// Ordering of two keys in a result list
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .primary
            .total_cmp(&self.primary)
            .then_with(|| other.secondary.total_cmp(&self.secondary))
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    /// "scored" or the browse sort order
    pub mode: String,
    #[serde(flatten)]
    pub key: RankKey,
}

impl PageCursor {
    pub fn new(mode: &str, key: RankKey) -> Self {
        Self {
            mode: mode.to_string(),
            key,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing plain numbers and strings cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| CursorError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CursorError::Malformed(e.to_string()))
    }

    /// Decode and check the cursor was issued for `mode`
    pub fn decode_for(encoded: &str, mode: &str) -> Result<RankKey, CursorError> {
        let cursor = Self::decode(encoded)?;
        if cursor.mode != mode {
            return Err(CursorError::ModeMismatch);
        }
        Ok(cursor.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(primary: f64, created_at: i64, id: &str) -> RankKey {
        RankKey {
            primary,
            secondary: 0.0,
            created_at,
            id: id.to_string(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let cursor = PageCursor::new("scored", key(17.5, 1_700_000_000_000_000, "tpl-1"));
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            PageCursor::decode("not a cursor!"),
            Err(CursorError::Malformed(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(PageCursor::decode(&not_json).is_err());
    }

    #[test]
    fn test_mode_mismatch() {
        let encoded = PageCursor::new("popular", key(1.0, 0, "a")).encode();
        assert!(matches!(
            PageCursor::decode_for(&encoded, "scored"),
            Err(CursorError::ModeMismatch)
        ));
    }

    #[test]
    fn test_rank_order() {
        let mut keys = vec![
            key(5.0, 10, "b"),
            key(9.0, 1, "z"),
            key(5.0, 20, "c"),
            key(5.0, 10, "a"),
        ];
        keys.sort_by(|a, b| a.rank_cmp(b));

        let ids: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "c", "a", "b"]);
    }
}
