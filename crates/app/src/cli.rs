use clap::{Args, Parser, Subcommand};

use progress_core::model::{BlockInstanceId, ContextId, CourseId, ProgressRefresh, UserId};
use progress_core::sql::{PageRequest, SortColumn};

pub const ENV_DB_URL: &str = "PROGRESS_DB_URL";
pub const ENV_SHOW_INACTIVE: &str = "PROGRESS_SHOW_INACTIVE";
pub const ENV_REFRESH: &str = "PROGRESS_REFRESH";
pub const ENV_STALE_AFTER_MINS: &str = "PROGRESS_STALE_AFTER_MINS";
pub const ENV_PER_PAGE: &str = "PROGRESS_PER_PAGE";
pub const ENV_LOG: &str = "PROGRESS_LOG";

#[derive(Debug, Parser)]
#[command(name = "overview")]
#[command(version, about = "Completion progress overview of a course", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// SQLite database URL or path
    #[arg(long, global = true, env = ENV_DB_URL, default_value = "sqlite:progress.sqlite3")]
    pub db: String,

    /// Also list suspended and expired enrolments
    #[arg(long, global = true, env = ENV_SHOW_INACTIVE)]
    pub show_inactive: bool,

    /// When to recompute cached percentages: always, sort or never
    #[arg(long, global = true, env = ENV_REFRESH, default_value = "sort")]
    pub refresh: ProgressRefresh,

    /// Cached percentages older than this many minutes are recomputed
    #[arg(long, global = true, env = ENV_STALE_AFTER_MINS, default_value_t = 15)]
    pub stale_after_mins: u32,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print one page of the overview table
    Show(ShowArgs),
    /// Create a demo course with learners, groups and completions
    Seed(SeedArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    pub course: CourseId,

    #[arg(long)]
    pub block: BlockInstanceId,

    /// Filter set as JSON; its scope filters must match --course and --block
    #[arg(long)]
    pub filters: Option<String>,

    /// firstname, lastname, timeaccess or progress
    #[arg(long, default_value = "firstname")]
    pub sort: SortColumn,

    #[arg(long)]
    pub desc: bool,

    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Rows per page; 0 shows everyone
    #[arg(long, env = ENV_PER_PAGE, default_value_t = PageRequest::DEFAULT_PER_PAGE)]
    pub per_page: u32,

    /// Only first names starting with this letter
    #[arg(long)]
    pub first: Option<char>,

    /// Only last names starting with this letter
    #[arg(long)]
    pub last: Option<char>,

    /// User looking at the overview
    #[arg(long, default_value = "2")]
    pub viewer: UserId,

    /// Restrict the viewer to their own groups
    #[arg(long)]
    pub own_groups: bool,

    /// Print the filter types available to the viewer instead of rows
    #[arg(long)]
    pub options: bool,

    /// Print JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Permission context id of the new course
    #[arg(long, default_value = "100")]
    pub context: ContextId,
}
