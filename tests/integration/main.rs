//! Integration test suite entry point.

mod concurrency_tests;
mod schema_tests;
mod server_tests;
mod store_tests;
