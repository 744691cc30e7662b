//! Configuration, memoization and session handling.

mod cache;
mod config;
mod session;

pub use cache::{CacheKey, CacheStats, MemoCache};
pub use config::AnalysisConfig;
pub use session::{Selection, Session};
