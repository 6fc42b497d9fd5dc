//! Resumption tokens.
//!
//! A token carries the selective-harvesting arguments of the first request plus the
//! number of matching records already delivered. It is written as URL-safe base64 of
//! a small JSON object, so colons in set names or dates cannot break it. The older
//! colon-joined form `set:from:until:cursor` (with `000` meaning "any set") is still
//! understood.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::*;

/// Set value of a legacy token that selects every set.
pub const ANY_SET: &str = "000";

/// Where a list request resumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionToken {
  /// Requested set
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub set:    Option<String>,
  /// Lower datestamp bound
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from:   Option<String>,
  /// Upper datestamp bound
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub until:  Option<String>,
  /// Matching records delivered so far
  pub cursor: usize,
}

impl ResumptionToken {
  /// The token text.
  pub fn encode(&self) -> String {
    // Serializing a struct of strings and an integer cannot fail.
    let json = serde_json::to_vec(self).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
  }

  /// Parses token text in either form.
  pub fn decode(token: &str) -> Result<Self, Ead2dcError> {
    let token = token.trim();
    if token.contains(':') {
      return Self::decode_legacy(token);
    }
    let json = URL_SAFE_NO_PAD.decode(token).map_err(|_| Ead2dcError::InvalidToken)?;
    serde_json::from_slice(&json).map_err(|_| Ead2dcError::InvalidToken)
  }

  /// Parses `set:from:until:cursor`.
  fn decode_legacy(token: &str) -> Result<Self, Ead2dcError> {
    let parts = token.split(':').collect::<Vec<_>>();
    let [set, from, until, cursor] = parts.as_slice() else {
      return Err(Ead2dcError::InvalidToken);
    };
    let present = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
    Ok(Self {
      set:    present(set).filter(|s| s != ANY_SET),
      from:   present(from),
      until:  present(until),
      cursor: cursor.parse().map_err(|_| Ead2dcError::InvalidToken)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_token_survives_colons() {
    let token = ResumptionToken {
      set:    Some("resource_30".to_string()),
      from:   Some("2020-01-01T00:00:00Z".to_string()),
      until:  None,
      cursor: 250,
    };
    let text = token.encode();
    assert!(!text.contains(':'));
    assert_eq!(ResumptionToken::decode(&text).unwrap(), token);
  }

  #[test]
  fn test_legacy_token() {
    let token = ResumptionToken::decode("000:000-00-00:999-99-99:500").unwrap();
    assert_eq!(token.set, None);
    assert_eq!(token.from.as_deref(), Some("000-00-00"));
    assert_eq!(token.cursor, 500);

    let token = ResumptionToken::decode("resource_30:2020-01-01:2021-01-01:2").unwrap();
    assert_eq!(token.set.as_deref(), Some("resource_30"));
  }

  #[test]
  fn test_bad_tokens() {
    for bad in ["", "not base64!", "a:b:c", "a:b:c:d", "e30"] {
      assert!(matches!(ResumptionToken::decode(bad), Err(Ead2dcError::InvalidToken)), "{bad}");
    }
  }
}
