pub mod bucket;
pub mod conditional;
pub mod sqlite_bucket;
pub mod sweeper;
