//! Shared test utilities for the registry.

pub mod fixtures;
pub mod logging;

pub use fixtures::RegistryFixture;
pub use logging::TestLogger;
