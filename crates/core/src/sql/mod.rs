//! SQL fragment composition for the overview table.

pub mod compiler;
mod fragment;
pub mod membership;
pub mod overview;
mod params;

pub use compiler::{CompileContext, FilterQueryCompiler};
pub use fragment::{CompiledFilters, CompiledPredicate};
pub use membership::{GroupSelector, GroupingIndex, GroupingResolver};
pub use overview::{
    Initials, OverviewQuery, PageRequest, RenderedQuery, SortColumn, SortDirection, SortOrder,
};
pub use params::{ParamMap, ParamNamer, SqlParam, in_or_equal, merge_params, to_positional};
