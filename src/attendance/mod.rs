//! Attendance core: per-slot status reconciliation against per-subject counters.
//!
//! `reconcile` is pure. `MutationCoordinator` wraps it with the timetable
//! gates, the rate limit and the optimistic write loop. `reset` is the
//! semester-start bulk wipe.

pub mod coordinator;
pub mod error;
pub mod model;
pub mod policy;
pub mod reconcile;
pub mod reset;
pub mod validate;

pub use coordinator::MutationCoordinator;
pub use error::Rejection;
pub use model::{AttendanceStatus, MarkRequest};
pub use policy::Policy;
pub use reset::{reset_all_users, ResetError};
