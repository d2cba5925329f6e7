use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const ID_PREFIX: &str = "IG18";
pub const ID_LEN: usize = 8;
pub const BASE: usize = 36;
/// Number of distinct values a two character base-36 suffix can hold.
pub const PAIR_SPACE: usize = BASE * BASE;
/// Size of the whole identifier space behind the fixed prefix.
pub const ID_SPACE: usize = PAIR_SPACE * PAIR_SPACE;

const DIGITS: &[u8; BASE] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Ticket identifier: the fixed prefix followed by four `[0-9A-Z]` characters.
///
/// A `TicketId` can only be built from a syntactically valid string, so every
/// value in circulation (including ones read back from storage) has the
/// expected shape. Syntax says nothing about whether the ticket exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    /// Builds an identifier from a clock-derived and a position-derived pair.
    /// Both values are reduced into `0..PAIR_SPACE`.
    pub fn from_pairs(clock_part: usize, position_part: usize) -> Self {
        let mut id = String::with_capacity(ID_LEN);
        id.push_str(ID_PREFIX);
        push_pair(&mut id, clock_part % PAIR_SPACE);
        push_pair(&mut id, position_part % PAIR_SPACE);
        Self(id)
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        if is_valid_id(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(StoreError::InvalidId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pure syntactic check: length, prefix and alphabet of the suffix.
pub fn is_valid_id(value: &str) -> bool {
    value.len() == ID_LEN
        && value.starts_with(ID_PREFIX)
        && value[ID_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

fn push_pair(id: &mut String, value: usize) {
    id.push(DIGITS[value / BASE] as char);
    id.push(DIGITS[value % BASE] as char);
}

impl FromStr for TicketId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TicketId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(StoreError::InvalidId(value))
        }
    }
}

impl From<TicketId> for String {
    fn from(value: TicketId) -> Self {
        value.0
    }
}

impl AsRef<str> for TicketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
