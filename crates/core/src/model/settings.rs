use chrono::Duration;

use crate::model::progress::ProgressRefresh;
use crate::sql::PageRequest;

/// Site-level configuration of the overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewSettings {
    /// List suspended and expired enrolments too.
    pub show_inactive: bool,
    /// Show the "last in course" column.
    pub show_last_access: bool,
    pub per_page: u32,
    pub refresh: ProgressRefresh,
    /// Cached percentages older than this are recomputed on refresh. Zero
    /// recomputes every row.
    pub stale_after: Duration,
}

impl Default for OverviewSettings {
    fn default() -> Self {
        Self {
            show_inactive: false,
            show_last_access: true,
            per_page: PageRequest::DEFAULT_PER_PAGE,
            refresh: ProgressRefresh::default(),
            stale_after: Duration::minutes(15),
        }
    }
}
