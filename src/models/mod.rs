//! Data models for the dependency auditor.

mod license;
mod package;
mod report;
mod vulnerability;

pub use license::*;
pub use package::*;
pub use report::*;
pub use vulnerability::*;
