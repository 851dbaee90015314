//! Schedcast - calendar-driven post scheduling for connected social accounts
//!
//! Posts are planned on a month calendar, stored locally, and dispatched to an
//! external publishing service that delivers them to Facebook or Instagram.
//! Posts can later be moved to another day, cancelled or deleted.

pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod publish;
pub mod repository;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use calendar::{month_grid, CalendarCell, MonthGrid};
pub use config::Config;
pub use db::Database;
pub use error::{Result, SchedcastError};
pub use service::SchedcastService;
pub use types::{Connection, NewConnection, Platform, PostDraft, PostStatus, PostUpdate, ScheduledPost};
