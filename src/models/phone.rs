// src/models/phone.rs

//! Canonical phone representation and normalization.
//!
//! Every number is stored as the country prefix followed by the nine local
//! digits, with no separators. Normalization is the only way to construct a
//! [`PhoneKey`], so an invalid key never exists downstream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country prefix carried by every canonical key.
pub const COUNTRY_PREFIX: &str = "995";

/// Digits in the local (subscriber) part.
pub const LOCAL_LEN: usize = 9;

/// Total digits in a canonical key.
pub const KEY_LEN: usize = 12;

/// Leading digit of the mobile number range.
const MOBILE_LEAD: char = '5';

/// Canonical phone number used as the uniqueness key.
///
/// Serializes as the bare canonical string; deserialization runs the input
/// back through [`normalize`], so a checkpoint edited or produced elsewhere
/// can never smuggle in an invalid key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PhoneKey(String);

impl PhoneKey {
    /// The full 12-digit canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The nine local digits without the country prefix.
    pub fn local(&self) -> &str {
        &self.0[COUNTRY_PREFIX.len()..]
    }

    /// Human-facing rendering (`+995 571 233 844`).
    ///
    /// Only the export collaborator should use this; the pipeline works with
    /// canonical keys exclusively.
    pub fn display(&self) -> String {
        let local = self.local();
        format!(
            "+{} {} {} {}",
            COUNTRY_PREFIX,
            &local[0..3],
            &local[3..6],
            &local[6..9]
        )
    }
}

impl fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PhoneKey> for String {
    fn from(key: PhoneKey) -> Self {
        key.0
    }
}

impl TryFrom<String> for PhoneKey {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        normalize(&raw).ok_or_else(|| format!("not a canonical phone key: '{raw}'"))
    }
}

/// Normalize a raw candidate string into a canonical key.
///
/// Total and side-effect-free: the same input always yields the same output.
/// `None` means rejected; rejection is an expected outcome for malformed
/// numbers, not an error.
pub fn normalize(raw: &str) -> Option<PhoneKey> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let local = if digits.len() == KEY_LEN && digits.starts_with(COUNTRY_PREFIX) {
        &digits[COUNTRY_PREFIX.len()..]
    } else if digits.len() == LOCAL_LEN {
        digits.as_str()
    } else {
        return None;
    };

    // Mobile range only: local part starts with 5.
    if !local.starts_with(MOBILE_LEAD) {
        return None;
    }

    Some(PhoneKey(format!("{COUNTRY_PREFIX}{local}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_representations_collapse_to_one_key() {
        let forms = [
            "995571233844",
            "571233844",
            "+995 571 233 844",
            "+995-571-233-844",
        ];
        let keys: Vec<PhoneKey> = forms.iter().filter_map(|raw| normalize(raw)).collect();
        assert_eq!(keys.len(), forms.len());
        assert!(keys.iter().all(|k| k == &keys[0]));
        assert_eq!(keys[0].as_str(), "995571233844");
    }

    #[test]
    fn display_round_trips_through_normalize() {
        let key = normalize("571233844").unwrap();
        assert_eq!(key.display(), "+995 571 233 844");
        assert_eq!(normalize(&key.display()), Some(key));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("invalid"), None);
        assert_eq!(normalize("12345"), None);
        // Wrong length even with prefix
        assert_eq!(normalize("99557123384"), None);
        // Local part outside the mobile range
        assert_eq!(normalize("471233844"), None);
        assert_eq!(normalize("995471233844"), None);
        // 12 digits but not the recognized prefix
        assert_eq!(normalize("994571233844"), None);
    }

    #[test]
    fn normalization_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(normalize("+995 571 233 844"), normalize("571233844"));
        }
    }

    #[test]
    fn local_part_accessor() {
        let key = normalize("995571233844").unwrap();
        assert_eq!(key.local(), "571233844");
    }

    #[test]
    fn deserialization_rejects_non_canonical_keys() {
        // Hand-edited or foreign JSON must not construct invalid keys.
        assert!(serde_json::from_str::<PhoneKey>(r#""571""#).is_err());
        assert!(serde_json::from_str::<PhoneKey>(r#""invalid""#).is_err());
        assert!(serde_json::from_str::<PhoneKey>(r#""995471233844""#).is_err());

        let key: PhoneKey = serde_json::from_str(r#""995571233844""#).unwrap();
        assert_eq!(key.as_str(), "995571233844");
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""995571233844""#);
    }

    #[test]
    fn deserialization_canonicalizes_local_form() {
        let key: PhoneKey = serde_json::from_str(r#""571233844""#).unwrap();
        assert_eq!(key.as_str(), "995571233844");
        assert_eq!(key.display(), "+995 571 233 844");
    }
}
