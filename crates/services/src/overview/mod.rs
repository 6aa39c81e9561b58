mod options;
mod service;
mod view;

// Public API of the overview subsystem.
pub use crate::error::OverviewError;
pub use options::{FilterOption, FilterType};
pub use service::OverviewService;
pub use view::{OverviewPage, OverviewRequest, OverviewRow, Viewer};
