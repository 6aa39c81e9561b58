use std::collections::BTreeMap;

use crate::error::FilterError;
use crate::filter::{FilterName, FilterSpec, JoinType};
use crate::model::{BlockInstanceId, CourseId};

/// The filters of one overview request plus the join type combining them.
///
/// Built once per page load or refresh request and never mutated while the
/// query is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSet {
    join_type: JoinType,
    filters: BTreeMap<FilterName, FilterSpec>,
}

impl FilterSet {
    #[must_use]
    pub fn new(join_type: JoinType) -> Self {
        Self {
            join_type,
            filters: BTreeMap::new(),
        }
    }

    /// The set every overview page starts from: only the two scope filters.
    #[must_use]
    pub fn for_block(course_id: CourseId, block_instance_id: BlockInstanceId) -> Self {
        Self::new(JoinType::SET_DEFAULT)
            .with_filter(FilterSpec::scalar(FilterName::CourseId, course_id.value()))
            .with_filter(FilterSpec::scalar(
                FilterName::BlockInstanceId,
                block_instance_id.value(),
            ))
    }

    /// Adds or replaces the filter with the same name.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.add_filter(filter);
        self
    }

    pub fn add_filter(&mut self, filter: FilterSpec) {
        self.filters.insert(filter.name(), filter);
    }

    #[must_use]
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn set_join_type(&mut self, join_type: JoinType) {
        self.join_type = join_type;
    }

    #[must_use]
    pub fn has_filter(&self, name: FilterName) -> bool {
        self.filters.contains_key(&name)
    }

    #[must_use]
    pub fn filter(&self, name: FilterName) -> Option<&FilterSpec> {
        self.filters.get(&name)
    }

    pub fn filters(&self) -> impl Iterator<Item = &FilterSpec> {
        self.filters.values()
    }

    /// Checks the set against the overview schema: both scope filters present
    /// with exactly one non-negative integer, every value an integer.
    ///
    /// # Errors
    ///
    /// Returns the first `FilterError` found.
    pub fn validate(&self) -> Result<(), FilterError> {
        for required in FilterName::REQUIRED {
            let spec = self
                .filters
                .get(&required)
                .ok_or(FilterError::MissingRequired(required))?;
            let values = spec.int_values()?;
            match values.as_slice() {
                [v] if *v >= 0 => {}
                [v] => {
                    return Err(FilterError::OutOfRange {
                        filter: required,
                        value: *v,
                    });
                }
                _ => return Err(FilterError::ExpectedSingleValue(required)),
            }
        }
        for spec in self.filters.values() {
            spec.int_values()?;
        }
        Ok(())
    }

    /// The course the overview is scoped to.
    ///
    /// # Errors
    ///
    /// Returns a `FilterError` if the `courseid` filter is absent or invalid.
    pub fn course_id(&self) -> Result<CourseId, FilterError> {
        self.scope_value(FilterName::CourseId).map(CourseId::new)
    }

    /// The block instance whose cached percentages are attached.
    ///
    /// # Errors
    ///
    /// Returns a `FilterError` if the `blockinstanceid` filter is absent or
    /// invalid.
    pub fn block_instance_id(&self) -> Result<BlockInstanceId, FilterError> {
        self.scope_value(FilterName::BlockInstanceId)
            .map(BlockInstanceId::new)
    }

    fn scope_value(&self, name: FilterName) -> Result<u64, FilterError> {
        let spec = self
            .filters
            .get(&name)
            .ok_or(FilterError::MissingRequired(name))?;
        let raw = spec
            .current()
            .ok_or(FilterError::ExpectedSingleValue(name))?;
        let value = raw.as_int().ok_or_else(|| FilterError::NotAnInteger {
            filter: name,
            raw: raw.to_string(),
        })?;
        u64::try_from(value).map_err(|_| FilterError::OutOfRange {
            filter: name,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FilterSet {
        FilterSet::for_block(CourseId::new(2), BlockInstanceId::new(9))
    }

    #[test]
    fn scope_filters_resolve_to_ids() {
        let set = base();
        set.validate().unwrap();
        assert_eq!(set.course_id().unwrap(), CourseId::new(2));
        assert_eq!(set.block_instance_id().unwrap(), BlockInstanceId::new(9));
        assert_eq!(set.join_type(), JoinType::All);
    }

    #[test]
    fn missing_block_instance_is_rejected() {
        let set = FilterSet::new(JoinType::All)
            .with_filter(FilterSpec::scalar(FilterName::CourseId, 2));
        assert_eq!(
            set.validate().unwrap_err(),
            FilterError::MissingRequired(FilterName::BlockInstanceId)
        );
    }

    #[test]
    fn scope_filter_with_two_values_is_rejected() {
        let set = base().with_filter(FilterSpec::new(
            FilterName::CourseId,
            JoinType::Any,
            [2_i64, 3],
        ));
        assert_eq!(
            set.validate().unwrap_err(),
            FilterError::ExpectedSingleValue(FilterName::CourseId)
        );
    }

    #[test]
    fn optional_filter_values_must_be_integers() {
        let set = base().with_filter(FilterSpec::new(FilterName::Roles, JoinType::Any, ["x"]));
        assert!(matches!(
            set.validate().unwrap_err(),
            FilterError::NotAnInteger {
                filter: FilterName::Roles,
                ..
            }
        ));
    }

    #[test]
    fn adding_a_filter_twice_replaces_it() {
        let mut set = base();
        set.add_filter(FilterSpec::new(FilterName::Groups, JoinType::Any, [1_i64]));
        set.add_filter(FilterSpec::new(FilterName::Groups, JoinType::All, [2_i64]));
        let groups = set.filter(FilterName::Groups).unwrap();
        assert_eq!(groups.join_type(), JoinType::All);
        assert_eq!(set.filters().count(), 3);
    }
}
