pub mod attendance;
pub mod core;
pub mod schedule;
pub mod semester;
pub mod setup;
