use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use progress_core::filter::FilterSet;
use progress_core::model::progress::{
    format_age, format_bar, format_last_access, format_percentage,
};
use progress_core::model::{ProgressCell, UserId};
use progress_core::sql::{Initials, PageRequest, SortOrder};

/// Who is looking at the overview. Capabilities arrive as plain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    /// May see every group of the course, not only their own.
    pub access_all_groups: bool,
}

impl Viewer {
    #[must_use]
    pub fn new(user_id: UserId, access_all_groups: bool) -> Self {
        Self {
            user_id,
            access_all_groups,
        }
    }
}

/// One page load: the filter set plus the table state.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRequest {
    pub filters: FilterSet,
    pub initials: Initials,
    pub sort: SortOrder,
    pub page: PageRequest,
}

impl OverviewRequest {
    #[must_use]
    pub fn new(filters: FilterSet) -> Self {
        Self {
            filters,
            initials: Initials::default(),
            sort: SortOrder::default(),
            page: PageRequest::default(),
        }
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub fn with_initials(mut self, initials: Initials) -> Self {
        self.initials = initials;
        self
    }
}

/// A learner row ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub user_id: UserId,
    pub fullname: String,
    pub email: String,
    pub last_access: Option<DateTime<Utc>>,
    pub percentage: Option<f64>,
    /// Seconds since the cached percentage was computed; `None` when the
    /// value was computed live for this page.
    pub cache_age_secs: Option<i64>,
    pub stale: bool,
    /// Progress bar cells in tracking order; empty when the block tracks no
    /// visible activity.
    pub cells: Vec<ProgressCell>,
}

impl OverviewRow {
    #[must_use]
    pub fn progress_label(&self) -> String {
        format_percentage(self.percentage)
    }

    #[must_use]
    pub fn progress_bar(&self) -> String {
        format_bar(&self.cells)
    }

    #[must_use]
    pub fn last_access_label(&self) -> String {
        format_last_access(self.last_access)
    }

    /// Shown next to the percentage when it comes from an older cache row.
    #[must_use]
    pub fn cache_age_label(&self) -> Option<String> {
        self.cache_age_secs
            .filter(|secs| *secs > 0)
            .map(|secs| format_age(Duration::seconds(secs)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewPage {
    pub rows: Vec<OverviewRow>,
    /// Matching users across all pages.
    pub total: u64,
    #[serde(skip)]
    pub page: PageRequest,
    /// False when the block tracks no visible activity; the table is then
    /// meaningless and callers show a notice instead.
    pub has_activities: bool,
}

impl OverviewPage {
    #[must_use]
    pub fn page_count(&self) -> u64 {
        if !self.page.is_paged() {
            return 1;
        }
        self.total.div_ceil(u64::from(self.page.per_page)).max(1)
    }

    /// Rows and totals as JSON for scripted consumers.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::CellState;

    fn row(percentage: Option<f64>, cache_age_secs: Option<i64>) -> OverviewRow {
        OverviewRow {
            user_id: UserId::new(1),
            fullname: "Ada Lovelace".into(),
            email: "ada@example.invalid".into(),
            last_access: None,
            percentage,
            cache_age_secs,
            stale: false,
            cells: Vec::new(),
        }
    }

    #[test]
    fn labels_follow_display_rules() {
        let r = row(Some(42.0), Some(3_700));
        assert_eq!(r.progress_label(), "42%");
        assert_eq!(r.last_access_label(), "Never");
        assert_eq!(r.cache_age_label().as_deref(), Some("1 hour 1 min"));

        let live = row(None, None);
        assert_eq!(live.progress_label(), "indeterminate");
        assert_eq!(live.cache_age_label(), None);
        assert_eq!(row(None, Some(0)).cache_age_label(), None);
        assert_eq!(live.progress_bar(), "");
    }

    #[test]
    fn progress_bar_follows_cell_order() {
        let mut r = row(Some(50.0), None);
        r.cells = [CellState::NotCompleted, CellState::Completed, CellState::FutureNotCompleted]
            .into_iter()
            .zip(1..)
            .map(|(state, cmid)| ProgressCell {
                cmid,
                name: format!("Activity {cmid}"),
                state,
            })
            .collect();
        assert_eq!(r.progress_bar(), "-#.");

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["cells"][1]["state"], "completed");
        assert_eq!(json["cells"][2]["cmid"], 3);
    }

    #[test]
    fn page_count_rounds_up() {
        let page = |total, per_page| OverviewPage {
            rows: Vec::new(),
            total,
            page: PageRequest::new(0, per_page),
            has_activities: true,
        };
        assert_eq!(page(41, 20).page_count(), 3);
        assert_eq!(page(40, 20).page_count(), 2);
        assert_eq!(page(0, 20).page_count(), 1);
        assert_eq!(page(41, 0).page_count(), 1);
    }

    #[test]
    fn json_carries_rows_and_total() {
        let page = OverviewPage {
            rows: vec![row(Some(50.0), None)],
            total: 1,
            page: PageRequest::default(),
            has_activities: true,
        };
        let json: serde_json::Value = serde_json::from_str(&page.to_json().unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["rows"][0]["user_id"], 1);
        assert_eq!(json["rows"][0]["percentage"], 50.0);
        assert!(json.get("page").is_none());
    }
}
