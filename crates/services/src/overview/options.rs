use serde::Serialize;

use progress_core::filter::{FilterName, JoinType};

/// A selectable value of a filter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub value: u64,
    pub title: String,
}

/// A filter type offered to the viewer, with the join types it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterType {
    pub name: FilterName,
    pub title: &'static str,
    pub join_types: Vec<JoinType>,
    pub options: Vec<FilterOption>,
}

impl FilterType {
    /// `None` when there is nothing to choose from, so the type is omitted.
    pub(crate) fn offered(name: FilterName, options: Vec<FilterOption>) -> Option<Self> {
        if options.is_empty() {
            return None;
        }
        Some(Self {
            name,
            title: title_of(name),
            join_types: name.allowed_join_types().to_vec(),
            options,
        })
    }
}

fn title_of(name: FilterName) -> &'static str {
    match name {
        FilterName::Roles => "Roles",
        FilterName::Groups => "Groups",
        FilterName::Groupings => "Groupings",
        FilterName::CourseId => "Course",
        FilterName::BlockInstanceId => "Block",
    }
}
