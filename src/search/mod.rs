//! Search support for the registry.

pub mod filters;

pub use filters::{Comparator, FilterClause, ModelVersionFilter, parse_filter};
