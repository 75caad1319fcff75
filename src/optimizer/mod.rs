//! Selectivity estimation
//!
//! Histograms and table statistics consumed by a cost-based planner.

pub mod histogram;
pub mod table_stats;

pub use histogram::{IntHistogram, StringHistogram};
pub use table_stats::{ColumnHistogram, TableStats};
