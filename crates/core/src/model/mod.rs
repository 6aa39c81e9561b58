mod ids;
pub mod progress;
mod settings;

pub use ids::{
    BlockInstanceId, ContextId, CourseId, GroupId, GroupingId, ParseIdError, RoleId, UserId,
};
pub use progress::{CellState, ProgressCell, ProgressEntry, ProgressRefresh, percentage};
pub use settings::OverviewSettings;
