//! Validated text primitives shared across the Health Connect crates.
//!
//! These wrappers are checked once at construction, so downstream code can rely on their
//! invariants without re-validating:
//! - [`NonEmptyText`]: trimmed, non-empty, optionally length-bounded text (display names, URIs)
//! - [`PackageName`]: an application package name that owns medical data sources

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The trimmed input was longer than the permitted maximum
    #[error("Text exceeds maximum length of {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// The input is not a well-formed package name
    #[error("Invalid package name: '{0}'")]
    InvalidPackageName(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a new `NonEmptyText` whose trimmed form is at most `max` characters long.
    ///
    /// Length is counted in Unicode scalar values, not bytes, so that display names in
    /// non-Latin scripts get the same budget as ASCII ones.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::TooLong`] when the
    /// trimmed input exceeds `max`.
    pub fn with_max_len(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        let actual = text.0.chars().count();
        if actual > max {
            return Err(TextError::TooLong { max, actual });
        }
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Maximum length of a package name, in bytes.
pub const MAX_PACKAGE_NAME_LEN: usize = 255;

/// An application package name, such as `com.example.clinic`.
///
/// Package names identify the app that owns a medical data source. The accepted shape is
/// two or more dot-separated segments, each starting with an ASCII letter and continuing with
/// ASCII letters, digits or underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(String);

impl PackageName {
    /// Validates and wraps a package name.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::InvalidPackageName`]
    /// when the input is not a well-formed package name.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(TextError::Empty);
        }
        if Self::is_valid(input) {
            Ok(Self(input.to_owned()))
        } else {
            Err(TextError::InvalidPackageName(input.to_owned()))
        }
    }

    fn is_valid(input: &str) -> bool {
        if input.len() > MAX_PACKAGE_NAME_LEN {
            return false;
        }

        let mut segments = 0usize;
        for segment in input.split('.') {
            let mut bytes = segment.bytes();
            match bytes.next() {
                Some(b) if b.is_ascii_alphabetic() => {}
                _ => return false,
            }
            if !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return false;
            }
            segments += 1;
        }

        segments >= 2
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PackageName {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageName::parse(s)
    }
}

impl serde::Serialize for PackageName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PackageName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PackageName::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Hospital Records  ").unwrap();
        assert_eq!(text.as_str(), "Hospital Records");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   \t"), Err(TextError::Empty));
    }

    #[test]
    fn test_with_max_len_counts_characters_not_bytes() {
        // 4 characters, 8 bytes
        assert!(NonEmptyText::with_max_len("éééé", 4).is_ok());

        let err = NonEmptyText::with_max_len("abcde", 4).unwrap_err();
        assert_eq!(err, TextError::TooLong { max: 4, actual: 5 });
    }

    #[test]
    fn test_non_empty_text_deserialize_rejects_blank() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_package_name_accepts_valid_names() {
        assert!(PackageName::parse("com.example.app").is_ok());
        assert!(PackageName::parse("org.clinic_2.reader").is_ok());
        assert_eq!(
            PackageName::parse("  com.example  ").unwrap().as_str(),
            "com.example"
        );
    }

    #[test]
    fn test_package_name_rejects_malformed_names() {
        for bad in ["example", "com..example", "com.1example", ".com.example", "com.ex-ample"] {
            assert!(
                matches!(PackageName::parse(bad), Err(TextError::InvalidPackageName(_))),
                "expected rejection for {bad}"
            );
        }
        assert_eq!(PackageName::parse(""), Err(TextError::Empty));
    }

    #[test]
    fn test_package_name_round_trips_through_serde() {
        let name = PackageName::parse("com.example.app").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"com.example.app\"");
        let back: PackageName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
