use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::model::ids::{BlockInstanceId, UserId};

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Completion percentage of `completed` out of `total` tracked activities,
/// rounded to a whole number. `None` when nothing is tracked.
#[must_use]
pub fn percentage(completed: u32, total: u32) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let ratio = f64::from(completed.min(total)) / f64::from(total);
    Some((ratio * 100.0).round())
}

/// Cached completion percentage of one user for one block instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub user_id: UserId,
    pub block_instance_id: BlockInstanceId,
    /// `None` means indeterminate (no visible activities for the user).
    pub percentage: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl ProgressEntry {
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.computed_at
    }

    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.age(now) > stale_after
    }
}

//
// ─── PROGRESS BAR ──────────────────────────────────────────────────────────────
//

/// How one tracked activity is drawn in a learner's progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Completed,
    /// Submitted for grading but not (yet) complete.
    SubmittedNotComplete,
    /// Incomplete and either overdue or without an expected date.
    NotCompleted,
    /// Incomplete, but expected to be completed later.
    FutureNotCompleted,
}

impl CellState {
    /// Every state in bar legend order.
    pub const ALL: [Self; 4] = [
        Self::Completed,
        Self::SubmittedNotComplete,
        Self::NotCompleted,
        Self::FutureNotCompleted,
    ];

    /// Classifies an activity for one learner.
    ///
    /// `completion` is the stored completion state (`None` when the learner
    /// has no completion record); states 1 and 2 are complete.
    #[must_use]
    pub fn classify(
        completion: Option<i64>,
        submitted: bool,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if matches!(completion, Some(1 | 2)) {
            Self::Completed
        } else if submitted {
            Self::SubmittedNotComplete
        } else if expected.is_some_and(|at| at > now) {
            Self::FutureNotCompleted
        } else {
            Self::NotCompleted
        }
    }

    /// Single character used by text renderings of the bar.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Self::Completed => '#',
            Self::SubmittedNotComplete => '~',
            Self::NotCompleted => '-',
            Self::FutureNotCompleted => '.',
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SubmittedNotComplete => "submitted, not complete",
            Self::NotCompleted => "not completed",
            Self::FutureNotCompleted => "not yet due",
        }
    }
}

/// One activity cell of a learner's progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressCell {
    /// Course module id of the activity.
    pub cmid: i64,
    pub name: String,
    pub state: CellState,
}

/// The bar as text, one symbol per cell.
#[must_use]
pub fn format_bar(cells: &[ProgressCell]) -> String {
    cells.iter().map(|c| c.state.symbol()).collect()
}

//
// ─── REFRESH POLICY ────────────────────────────────────────────────────────────
//

/// When cached percentages are recomputed before a page is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressRefresh {
    /// Before every page load and export.
    Always,
    /// Only when the table is sorted by progress, since the ordering is then
    /// taken from the cache.
    #[default]
    WhenSortedByProgress,
    /// Never; rows without a cached value fall back to a live computation.
    Never,
}

impl ProgressRefresh {
    #[must_use]
    pub fn should_refresh(self, sorted_by_progress: bool) -> bool {
        match self {
            Self::Always => true,
            Self::WhenSortedByProgress => sorted_by_progress,
            Self::Never => false,
        }
    }
}

impl FromStr for ProgressRefresh {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "sort" | "when-sorted" => Ok(Self::WhenSortedByProgress),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown refresh policy: {other}")),
        }
    }
}

impl fmt::Display for ProgressRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "always",
            Self::WhenSortedByProgress => "when-sorted",
            Self::Never => "never",
        })
    }
}

//
// ─── DISPLAY ───────────────────────────────────────────────────────────────────
//

pub const INDETERMINATE: &str = "indeterminate";
pub const NEVER: &str = "Never";

/// `"42%"`, or `"indeterminate"` when no percentage exists.
#[must_use]
pub fn format_percentage(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{p:.0}%"),
        None => INDETERMINATE.to_owned(),
    }
}

/// Last course access; `None` (never accessed) renders as `"Never"`.
#[must_use]
pub fn format_last_access(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(t) => t.format("%A, %-d %B %Y, %-I:%M %p").to_string(),
        None => NEVER.to_owned(),
    }
}

/// Compact age such as `"3 days 4 hours"`, `"5 mins"` or `"12 secs"`.
#[must_use]
pub fn format_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    let units = [
        (86_400, "day", "days"),
        (3_600, "hour", "hours"),
        (60, "min", "mins"),
        (1, "sec", "secs"),
    ];
    let mut rest = secs;
    let mut parts = Vec::new();
    for (size, one, many) in units {
        let n = rest / size;
        if n > 0 {
            parts.push(format!("{n} {}", if n == 1 { one } else { many }));
            rest -= n * size;
        }
        if parts.len() == 2 {
            break;
        }
    }
    if parts.is_empty() {
        "0 secs".to_owned()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn percentage_rounds_and_handles_empty_blocks() {
        assert_eq!(percentage(0, 0), None);
        assert_eq!(percentage(1, 3), Some(33.0));
        assert_eq!(percentage(2, 3), Some(67.0));
        assert_eq!(percentage(5, 4), Some(100.0));
    }

    #[test]
    fn stale_entries_are_detected() {
        let entry = ProgressEntry {
            user_id: UserId::new(1),
            block_instance_id: BlockInstanceId::new(9),
            percentage: Some(50.0),
            computed_at: fixed_now() - Duration::hours(2),
        };
        assert!(entry.is_stale(fixed_now(), Duration::hours(1)));
        assert!(!entry.is_stale(fixed_now(), Duration::hours(3)));
    }

    #[test]
    fn refresh_policy_depends_on_sorting() {
        assert!(ProgressRefresh::Always.should_refresh(false));
        assert!(ProgressRefresh::WhenSortedByProgress.should_refresh(true));
        assert!(!ProgressRefresh::WhenSortedByProgress.should_refresh(false));
        assert!(!ProgressRefresh::Never.should_refresh(true));
        assert_eq!(
            "always".parse::<ProgressRefresh>().unwrap(),
            ProgressRefresh::Always
        );
    }

    #[test]
    fn display_helpers() {
        assert_eq!(format_percentage(Some(42.0)), "42%");
        assert_eq!(format_percentage(None), "indeterminate");
        assert_eq!(format_last_access(None), "Never");
        assert_eq!(format_age(Duration::seconds(3 * 86_400 + 4 * 3_600 + 5)), "3 days 4 hours");
        assert_eq!(format_age(Duration::seconds(61)), "1 min 1 sec");
        assert_eq!(format_age(Duration::zero()), "0 secs");
    }

    #[test]
    fn cell_state_prefers_completion_then_submission_then_due_date() {
        let now = fixed_now();
        let later = Some(now + Duration::days(2));
        let earlier = Some(now - Duration::days(2));

        assert_eq!(CellState::classify(Some(1), true, later, now), CellState::Completed);
        assert_eq!(CellState::classify(Some(2), false, None, now), CellState::Completed);
        assert_eq!(
            CellState::classify(Some(3), true, earlier, now),
            CellState::SubmittedNotComplete
        );
        assert_eq!(CellState::classify(None, false, later, now), CellState::FutureNotCompleted);
        assert_eq!(CellState::classify(Some(0), false, earlier, now), CellState::NotCompleted);
        assert_eq!(CellState::classify(Some(3), false, None, now), CellState::NotCompleted);
    }

    #[test]
    fn bar_has_one_symbol_per_cell() {
        let cells: Vec<ProgressCell> = CellState::ALL
            .into_iter()
            .enumerate()
            .map(|(i, state)| ProgressCell {
                cmid: i64::try_from(i).unwrap(),
                name: format!("Activity {i}"),
                state,
            })
            .collect();
        assert_eq!(format_bar(&cells), "#~-.");
        assert_eq!(format_bar(&[]), "");
        assert_eq!(
            serde_json::to_value(CellState::SubmittedNotComplete).unwrap(),
            "submittednotcomplete"
        );
    }
}
