//! Recipient identity

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator used in the single-string form of a [`RecipientKey`]
pub const KEY_SEPARATOR: char = '|';

#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    #[error("Recipient key must have three `|`-separated parts: {0}")]
    WrongShape(String),
    #[error("Identifier may not be empty or contain `|`: {0:?}")]
    InvalidId(String),
}

/// Composite identity of a delivery target
///
/// `destination_id` names the chat a message is delivered to. The originator
/// is whoever registered the interest; when it differs from the destination
/// the key lives in a group chat.
///
/// # Examples
/// ```
/// use hub2::store::RecipientKey;
///
/// let key = RecipientKey::new("42", "Alice | Admin", "-1001").unwrap();
/// assert!(key.is_group());
/// let parsed: RecipientKey = key.to_string().parse().unwrap();
/// assert_eq!(parsed, key);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientKey {
    originator_id: String,
    display_name: String,
    destination_id: String,
}

fn check_id(id: &str) -> Result<(), KeyError> {
    if id.is_empty() || id.contains(KEY_SEPARATOR) {
        Err(KeyError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

impl RecipientKey {
    pub fn new(
        originator_id: impl Into<String>,
        display_name: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let originator_id = originator_id.into();
        let destination_id = destination_id.into();
        check_id(&originator_id)?;
        check_id(&destination_id)?;
        Ok(Self {
            originator_id,
            display_name: display_name.into(),
            destination_id,
        })
    }

    /// Key for a one-to-one chat where originator and destination coincide
    pub fn direct(id: impl Into<String>, display_name: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        Self::new(id.clone(), display_name, id)
    }

    pub fn originator_id(&self) -> &str {
        &self.originator_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Group context: deliveries are attributed and sent silently
    pub fn is_group(&self) -> bool {
        self.originator_id != self.destination_id
    }
}

impl fmt::Display for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.originator_id,
            self.display_name,
            self.destination_id,
            sep = KEY_SEPARATOR
        )
    }
}

impl FromStr for RecipientKey {
    type Err = KeyError;

    /// Ids cannot contain the separator, so the display name is whatever
    /// sits between the first and the last one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (originator, rest) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyError::WrongShape(s.to_string()))?;
        let (name, destination) = rest
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyError::WrongShape(s.to_string()))?;
        Self::new(originator, name, destination)
    }
}

impl Serialize for RecipientKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecipientKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
