// Test modules

mod cache_test;
pub mod common;
