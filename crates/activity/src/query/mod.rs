//! Query API for reports
//!
//! Read-only views over the local cache, ready for external formatting.

mod coverage;

pub use coverage::{CoverageReport, check_coverage};
