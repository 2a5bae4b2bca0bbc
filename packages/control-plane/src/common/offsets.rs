//! Opaque pagination offsets for list endpoints.
//!
//! An offset names the first row of the next page as a `(creation_time, id)`
//! pair, base64-encoded so callers treat it as an opaque token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::common::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffset {
    pub next_creation_time: i64,
    pub next_id: String,
}

impl ListOffset {
    pub fn serialise(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{},{}", self.next_creation_time, self.next_id))
    }

    /// Decode an offset previously produced by [`ListOffset::serialise`].
    ///
    /// Any malformed input (bad base64, missing comma, non-numeric time)
    /// fails with [`ApiError::OffsetIsInvalid`].
    pub fn deserialise(offset_str: &str) -> Result<Self, ApiError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(offset_str)
            .map_err(|_| ApiError::OffsetIsInvalid)?;
        let decoded = String::from_utf8(bytes).map_err(|_| ApiError::OffsetIsInvalid)?;

        let (time_str, id) = decoded.split_once(',').ok_or(ApiError::OffsetIsInvalid)?;
        let next_creation_time: i64 = time_str.parse().map_err(|_| ApiError::OffsetIsInvalid)?;

        Ok(ListOffset {
            next_creation_time,
            next_id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let offset = ListOffset {
            next_creation_time: 1700000000,
            next_id: "inv-0123456789abcdef".to_string(),
        };
        let encoded = offset.serialise();
        assert_eq!(ListOffset::deserialise(&encoded).unwrap(), offset);
    }

    #[test]
    fn id_may_contain_commas() {
        let offset = ListOffset {
            next_creation_time: 5,
            next_id: "odd,id".to_string(),
        };
        let back = ListOffset::deserialise(&offset.serialise()).unwrap();
        assert_eq!(back.next_id, "odd,id");
    }

    #[test]
    fn malformed_offsets_are_rejected() {
        assert!(matches!(
            ListOffset::deserialise("not base64!!"),
            Err(ApiError::OffsetIsInvalid)
        ));

        let no_comma = URL_SAFE_NO_PAD.encode("12345");
        assert!(matches!(
            ListOffset::deserialise(&no_comma),
            Err(ApiError::OffsetIsInvalid)
        ));

        let bad_time = URL_SAFE_NO_PAD.encode("abc,inv-1");
        assert!(matches!(
            ListOffset::deserialise(&bad_time),
            Err(ApiError::OffsetIsInvalid)
        ));
    }
}
