//! DTMF keys for telephone keypad input.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A DTMF key: `0`-`9`, `*`, `#` or the extended `A`-`D` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "char", into = "char")]
pub struct Digit(char);

impl Digit {
    /// Parse a single keypad character.
    ///
    /// Lowercase `a`-`d` are normalized to uppercase.
    pub fn from_char(ch: char) -> Result<Self> {
        match ch {
            '0'..='9' | '*' | '#' | 'A'..='D' => Ok(Self(ch)),
            'a'..='d' => Ok(Self(ch.to_ascii_uppercase())),
            _ => Err(Error::InvalidDigit(ch)),
        }
    }

    /// Parse a digit string such as `"12#"`.
    ///
    /// Whitespace between keys is ignored.
    pub fn parse_sequence(s: &str) -> Result<Vec<Self>> {
        s.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(Self::from_char)
            .collect()
    }

    /// The keypad character.
    pub fn as_char(self) -> char {
        self.0
    }
}

impl TryFrom<char> for Digit {
    type Error = Error;

    fn try_from(ch: char) -> Result<Self> {
        Self::from_char(ch)
    }
}

impl From<Digit> for char {
    fn from(digit: Digit) -> char {
        digit.0
    }
}

impl std::fmt::Display for Digit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
