//! Command implementations for fmota

pub mod scan;
pub mod update;

pub use scan::{scan, select};
pub use update::update;
