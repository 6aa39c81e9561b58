use crate::sql::ParamMap;

/// Joins, a boolean predicate and the parameters they bind, produced for one
/// filter (or one host primitive call).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledPredicate {
    pub joins: Vec<String>,
    pub wheres: String,
    pub params: ParamMap,
}

impl CompiledPredicate {
    #[must_use]
    pub fn new(joins: Vec<String>, wheres: impl Into<String>, params: ParamMap) -> Self {
        Self {
            joins,
            wheres: wheres.into(),
            params,
        }
    }
}

/// The merged result for a whole filter set: extra joins, one predicate and
/// every parameter, ready to be spliced into the base query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilters {
    pub joins: String,
    pub wheres: String,
    pub params: ParamMap,
    /// Number of filters that contributed a predicate.
    pub active: usize,
}

impl CompiledFilters {
    /// The tautology used when no filter is active.
    pub const MATCH_ALL: &'static str = "1=1";

    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.active == 0
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self {
            joins: String::new(),
            wheres: Self::MATCH_ALL.to_owned(),
            params: ParamMap::new(),
            active: 0,
        }
    }
}
