mod join_type;
mod set;
mod spec;
pub mod wire;

pub use join_type::JoinType;
pub use set::FilterSet;
pub use spec::{FilterName, FilterSpec, FilterValue};
