pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
