use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;
use crate::filter::JoinType;

//
// ─── FILTER NAMES ──────────────────────────────────────────────────────────────
//

/// The fixed set of filters the overview table understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterName {
    CourseId,
    BlockInstanceId,
    Groups,
    Groupings,
    Roles,
}

impl FilterName {
    pub const REQUIRED: [Self; 2] = [Self::CourseId, Self::BlockInstanceId];
    pub const OPTIONAL: [Self; 3] = [Self::Groups, Self::Groupings, Self::Roles];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CourseId => "courseid",
            Self::BlockInstanceId => "blockinstanceid",
            Self::Groups => "groups",
            Self::Groupings => "groupings",
            Self::Roles => "roles",
        }
    }

    #[must_use]
    pub fn is_required(self) -> bool {
        Self::REQUIRED.contains(&self)
    }

    /// Join types the filter UI offers for this filter.
    ///
    /// Scope filters are not combined at all, so they accept anything.
    #[must_use]
    pub fn allowed_join_types(self) -> &'static [JoinType] {
        match self {
            Self::Groups => &[JoinType::None, JoinType::Any, JoinType::All],
            Self::Groupings => &[JoinType::Any],
            Self::Roles => &[JoinType::None, JoinType::Any],
            Self::CourseId | Self::BlockInstanceId => {
                &[JoinType::None, JoinType::Any, JoinType::All]
            }
        }
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterName {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "courseid" => Ok(Self::CourseId),
            "blockinstanceid" => Ok(Self::BlockInstanceId),
            "groups" => Ok(Self::Groups),
            "groupings" => Ok(Self::Groupings),
            "roles" => Ok(Self::Roles),
            other => Err(FilterError::UnknownFilter(other.to_owned())),
        }
    }
}

//
// ─── VALUES ────────────────────────────────────────────────────────────────────
//

/// A single scalar filter value as transmitted by the filter UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl FilterValue {
    /// Integer view of the value. Numeric strings are accepted because the
    /// dynamic table posts form values as text.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Text(value.to_string()), Self::Int)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

//
// ─── FILTER SPEC ───────────────────────────────────────────────────────────────
//

/// One named filter: a join type governing how its own values combine, and
/// the ordered values themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    name: FilterName,
    join_type: JoinType,
    values: Vec<FilterValue>,
}

impl FilterSpec {
    #[must_use]
    pub fn new(
        name: FilterName,
        join_type: JoinType,
        values: impl IntoIterator<Item = impl Into<FilterValue>>,
    ) -> Self {
        Self {
            name,
            join_type,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// A single-value filter with the default join type, used for the scope
    /// filters `courseid` and `blockinstanceid`.
    #[must_use]
    pub fn scalar(name: FilterName, value: u64) -> Self {
        Self::new(name, JoinType::FILTER_DEFAULT, [value])
    }

    #[must_use]
    pub fn name(&self) -> FilterName {
        self.name
    }

    #[must_use]
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    #[must_use]
    pub fn values(&self) -> &[FilterValue] {
        &self.values
    }

    /// A filter without values contributes nothing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.values.is_empty()
    }

    /// The first value, for filters that carry a single scalar.
    #[must_use]
    pub fn current(&self) -> Option<&FilterValue> {
        self.values.first()
    }

    /// All values as integers.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::NotAnInteger` naming the first offending value.
    pub fn int_values(&self) -> Result<Vec<i64>, FilterError> {
        self.values
            .iter()
            .map(|v| {
                v.as_int().ok_or_else(|| FilterError::NotAnInteger {
                    filter: self.name,
                    raw: v.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_strings() {
        for name in FilterName::REQUIRED.iter().chain(FilterName::OPTIONAL.iter()) {
            assert_eq!(name.as_str().parse::<FilterName>().unwrap(), *name);
        }
        assert_eq!(
            "status".parse::<FilterName>().unwrap_err(),
            FilterError::UnknownFilter("status".into())
        );
    }

    #[test]
    fn numeric_text_counts_as_integer() {
        let spec = FilterSpec::new(
            FilterName::Groups,
            JoinType::Any,
            [FilterValue::Text(" 12".into()), FilterValue::Int(4)],
        );
        assert_eq!(spec.int_values().unwrap(), vec![12, 4]);
    }

    #[test]
    fn text_value_is_not_an_integer() {
        let spec = FilterSpec::new(FilterName::Roles, JoinType::Any, ["teacher"]);
        assert_eq!(
            spec.int_values().unwrap_err(),
            FilterError::NotAnInteger {
                filter: FilterName::Roles,
                raw: "teacher".into()
            }
        );
    }

    #[test]
    fn empty_filter_is_inactive() {
        let spec = FilterSpec::new(FilterName::Groups, JoinType::All, Vec::<i64>::new());
        assert!(!spec.is_active());
        assert!(spec.current().is_none());
    }
}
