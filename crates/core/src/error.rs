use thiserror::Error;

use crate::filter::{FilterName, JoinType};

/// Programmer errors raised while turning filters into SQL.
///
/// None of these are reachable from well-formed UI input; they signal that a
/// caller assembled an illegal filter set or that fragment composition broke
/// an invariant. They are never coerced into a different semantics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("unanticipated {filter} join type: {join_type}")]
    UnsupportedJoinType {
        filter: FilterName,
        join_type: JoinType,
    },

    #[error("{filter} filter expects integer values, got {raw:?}")]
    InvalidValue { filter: FilterName, raw: String },

    #[error("duplicate SQL parameter name: {0}")]
    DuplicateParameter(String),

    #[error("SQL references unbound parameter: {0}")]
    UnboundParameter(String),
}

/// Errors raised while decoding or validating a filter set against the
/// overview schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterError {
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("missing required filter: {0}")]
    MissingRequired(FilterName),

    #[error("filter {0} requires exactly one value")]
    ExpectedSingleValue(FilterName),

    #[error("filter {filter} expects integer values, got {raw:?}")]
    NotAnInteger { filter: FilterName, raw: String },

    #[error("filter {filter} value out of range: {value}")]
    OutOfRange { filter: FilterName, value: i64 },

    #[error("invalid join type value: {0}")]
    InvalidJoinType(i64),

    #[error("filter key {key} does not match filter name {name}")]
    NameMismatch { key: String, name: String },

    #[error("malformed filter set: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Filter(#[from] FilterError),
}
