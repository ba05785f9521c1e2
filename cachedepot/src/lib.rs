// Re-export modules needed for testing
pub mod api;
pub mod config;
pub mod error;
pub mod purge;
pub mod registry;
pub mod storage;
pub mod vacuum;
