use std::fmt::{self, Write};

use progress_core::model::CellState;
use services::{FilterType, OverviewPage};

const NO_ACTIVITIES: &str = "No activities are being tracked by this block.";
const BAR_HEADER: &str = "Progress bar";

/// Plain-text table of one overview page.
pub fn page_table(page: &OverviewPage, show_last_access: bool) -> String {
    let mut out = String::new();
    match write_page_table(&mut out, page, show_last_access) {
        Ok(()) => out,
        Err(fmt::Error) => String::new(),
    }
}

/// Filter types and their options, one per line.
pub fn filter_options(types: &[FilterType]) -> String {
    let mut out = String::new();
    match write_filter_options(&mut out, types) {
        Ok(()) => out,
        Err(fmt::Error) => String::new(),
    }
}

fn write_page_table(
    out: &mut impl Write,
    page: &OverviewPage,
    show_last_access: bool,
) -> fmt::Result {
    if !page.has_activities {
        return writeln!(out, "{NO_ACTIVITIES}");
    }

    let name_width = page
        .rows
        .iter()
        .map(|r| r.fullname.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());
    let bar_width = page
        .rows
        .iter()
        .map(|r| r.cells.len())
        .max()
        .unwrap_or(0)
        .max(BAR_HEADER.len());

    write!(out, "{:<name_width$}  {BAR_HEADER:<bar_width$}  {:>28}", "Name", "Progress")?;
    if show_last_access {
        write!(out, "  Last in course")?;
    }
    writeln!(out)?;

    for row in &page.rows {
        let mut progress = row.progress_label();
        if let Some(age) = row.cache_age_label() {
            progress = format!("{progress} ({age} ago)");
        }
        if row.stale {
            progress.push('*');
        }
        write!(
            out,
            "{:<name_width$}  {:<bar_width$}  {progress:>28}",
            row.fullname,
            row.progress_bar()
        )?;
        if show_last_access {
            write!(out, "  {}", row.last_access_label())?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "\n{} user(s), page {} of {}",
        page.total,
        page.page.page + 1,
        page.page_count()
    )?;
    let legend: Vec<String> = CellState::ALL
        .iter()
        .map(|state| format!("{} {}", state.symbol(), state.label()))
        .collect();
    writeln!(out, "Bar: {}", legend.join(", "))?;
    if page.rows.iter().any(|r| r.stale) {
        writeln!(out, "* cached value older than the refresh threshold")?;
    }
    Ok(())
}

fn write_filter_options(out: &mut impl Write, types: &[FilterType]) -> fmt::Result {
    if types.is_empty() {
        return writeln!(out, "No filters available.");
    }
    for t in types {
        let joins: Vec<String> = t.join_types.iter().map(ToString::to_string).collect();
        writeln!(out, "{} ({}) [{}]", t.title, t.name, joins.join(", "))?;
        for option in &t.options {
            writeln!(out, "  {:>6}  {}", option.value, option.title)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ProgressCell, UserId};
    use progress_core::sql::PageRequest;
    use services::OverviewRow;

    fn page(rows: Vec<OverviewRow>, has_activities: bool) -> OverviewPage {
        OverviewPage {
            total: rows.len() as u64,
            rows,
            page: PageRequest::default(),
            has_activities,
        }
    }

    #[test]
    fn table_lists_rows_with_cache_age() {
        let rows = vec![OverviewRow {
            user_id: UserId::new(4),
            fullname: "Grace Hopper".into(),
            email: String::new(),
            last_access: None,
            percentage: Some(80.0),
            cache_age_secs: Some(1_200),
            stale: true,
            cells: [CellState::Completed, CellState::SubmittedNotComplete, CellState::NotCompleted]
                .into_iter()
                .zip(1..)
                .map(|(state, cmid)| ProgressCell {
                    cmid,
                    name: format!("Task {cmid}"),
                    state,
                })
                .collect(),
        }];
        let text = page_table(&page(rows, true), true);
        assert!(text.contains("Grace Hopper"));
        assert!(text.contains("80% (20 mins ago)*"));
        assert!(text.contains("Grace Hopper  #~-          "));
        assert!(text.contains("Bar: # completed, ~ submitted, not complete, - not completed"));
        assert!(text.contains("Never"));
        assert!(text.contains("1 user(s), page 1 of 1"));
    }

    #[test]
    fn block_without_activities_prints_notice() {
        assert_eq!(page_table(&page(Vec::new(), false), true), format!("{NO_ACTIVITIES}\n"));
    }

    #[test]
    fn empty_options_say_so() {
        assert_eq!(filter_options(&[]), "No filters available.\n");
    }
}
