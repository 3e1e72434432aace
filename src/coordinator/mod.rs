//! Attendance transaction coordinator
//!
//! Entry points for Item creation, attendance changes, deletion and queries.

pub mod attendance;
pub mod execution;
pub mod notification;
pub mod queries;

pub use attendance::{AttendanceCoordinator, AttendanceReport, ItemCreated};
pub use execution::OperationRunner;
pub use notification::compose_message;
