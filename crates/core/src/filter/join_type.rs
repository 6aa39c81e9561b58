use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FilterError;

/// How several values (or several filters) combine.
///
/// The integer encoding is the one the filter UI transmits:
/// `None = 0`, `Any = 1`, `All = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum JoinType {
    /// Match none of the values.
    None,
    /// Match at least one value.
    Any,
    /// Match every value.
    All,
}

impl JoinType {
    /// Join type used by an individual filter when none is given.
    pub const FILTER_DEFAULT: Self = Self::Any;

    /// Join type used to combine the filters of a set when none is given.
    pub const SET_DEFAULT: Self = Self::All;

    /// Decodes the wire integer.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidJoinType` for anything outside `0..=2`.
    pub fn from_i64(value: i64) -> Result<Self, FilterError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Any),
            2 => Ok(Self::All),
            other => Err(FilterError::InvalidJoinType(other)),
        }
    }

    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Any => 1,
            Self::All => 2,
        }
    }
}

impl Default for JoinType {
    fn default() -> Self {
        Self::SET_DEFAULT
    }
}

impl TryFrom<i64> for JoinType {
    type Error = FilterError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_i64(value)
    }
}

impl From<JoinType> for i64 {
    fn from(value: JoinType) -> Self {
        value.as_i64()
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Any => "any",
            Self::All => "all",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_integers_match_ui_encoding() {
        assert_eq!(JoinType::from_i64(0).unwrap(), JoinType::None);
        assert_eq!(JoinType::from_i64(1).unwrap(), JoinType::Any);
        assert_eq!(JoinType::from_i64(2).unwrap(), JoinType::All);
        assert_eq!(JoinType::All.as_i64(), 2);
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        assert_eq!(
            JoinType::from_i64(3).unwrap_err(),
            FilterError::InvalidJoinType(3)
        );
        assert!(serde_json::from_str::<JoinType>("-1").is_err());
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&JoinType::Any).unwrap(), "1");
    }
}
