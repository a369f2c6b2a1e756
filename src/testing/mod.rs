//! Case loading: fixture discovery, filtering, and header parsing.

pub mod discovery;
pub mod glob;

pub use discovery::{CaseLoader, LoadReport};
pub use glob::GlobFilter;
