//! Prompt experiment math utilities.

pub mod math;

pub use math::normal::*;
pub use math::percentile::*;
pub use math::summary::*;
