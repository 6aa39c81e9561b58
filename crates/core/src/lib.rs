#![forbid(unsafe_code)]

pub mod error;
pub mod filter;
pub mod model;
pub mod sql;
pub mod time;

pub use error::{ConfigurationError, Error, FilterError};
pub use time::Clock;
