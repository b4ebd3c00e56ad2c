//! Core math modules.

pub mod normal;
pub mod percentile;
pub mod summary;
