//! User identifier type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`UserId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// The input string is empty (after trimming).
    #[error("user id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("user id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains characters outside `[A-Za-z0-9_-]`.
    #[error("user id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// The identifier of the logged-in user whose cart is being synchronized.
///
/// The backend issues these at login; the client treats them as opaque but
/// rejects values that could not have come from the backend.
///
/// ## Constraints
///
/// - Surrounding whitespace is trimmed
/// - Length: 1-64 characters
/// - Characters: ASCII letters, digits, `_` and `-`
///
/// ## Examples
///
/// ```
/// use cartsync_core::UserId;
///
/// assert!(UserId::parse("user_123").is_ok());
/// assert!(UserId::parse("  user_123 ").is_ok());
///
/// assert!(UserId::parse("").is_err());
/// assert!(UserId::parse("bad id").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Maximum length of a user id.
    pub const MAX_LENGTH: usize = 64;

    /// Parse a `UserId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than
    /// [`Self::MAX_LENGTH`], or contains a character outside `[A-Za-z0-9_-]`.
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(UserIdError::Empty);
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(UserIdError::InvalidCharacter(bad));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the user id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
