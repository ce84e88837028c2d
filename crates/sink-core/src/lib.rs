pub mod config;
pub mod env;
pub mod error;
pub mod history;
pub mod sink;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
