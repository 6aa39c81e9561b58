#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod overview;
pub mod seed;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, OverviewError};
pub use overview::{
    FilterOption, FilterType, OverviewPage, OverviewRequest, OverviewRow, OverviewService, Viewer,
};
pub use seed::{DemoCourse, seed_demo_course};
